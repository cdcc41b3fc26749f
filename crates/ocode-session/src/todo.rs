// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoStatus {
    Todo,
    Doing,
    Done,
}

impl TodoStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "doing" => Some(Self::Doing),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub text: String,
    pub status: TodoStatus,
    pub created_at: f64,
    pub updated_at: f64,
}

/// Per-session todo list persisted as a single JSON file under the data dir.
#[derive(Debug)]
pub struct TodoStore {
    path: PathBuf,
}

fn now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

impl TodoStore {
    pub fn open(data_root: &Path, session_id: Option<&str>) -> anyhow::Result<Self> {
        let dir = data_root.join("todos");
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let sid = session_id.unwrap_or("default");
        Ok(Self {
            path: dir.join(format!("{sid}.json")),
        })
    }

    pub fn load(&self) -> Vec<TodoItem> {
        let Ok(text) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str(&text).unwrap_or_default()
    }

    fn save(&self, items: &[TodoItem]) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(items).context("serializing todos")?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))
    }

    pub fn add(&self, text: &str) -> anyhow::Result<Vec<TodoItem>> {
        let mut items = self.load();
        let t = now();
        items.push(TodoItem {
            id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            text: text.to_string(),
            status: TodoStatus::Todo,
            created_at: t,
            updated_at: t,
        });
        self.save(&items)?;
        Ok(items)
    }

    /// Update text and/or status of an item; errors when the id is unknown.
    pub fn update(
        &self,
        id: &str,
        text: Option<&str>,
        status: Option<TodoStatus>,
    ) -> anyhow::Result<Vec<TodoItem>> {
        let mut items = self.load();
        let item = items
            .iter_mut()
            .find(|i| i.id == id)
            .with_context(|| format!("todo id not found: {id}"))?;
        if let Some(t) = text {
            item.text = t.to_string();
        }
        if let Some(s) = status {
            item.status = s;
        }
        item.updated_at = now();
        self.save(&items)?;
        Ok(items)
    }

    pub fn remove(&self, id: &str) -> anyhow::Result<Vec<TodoItem>> {
        let mut items = self.load();
        let before = items.len();
        items.retain(|i| i.id != id);
        if items.len() == before {
            anyhow::bail!("todo id not found: {id}");
        }
        self.save(&items)?;
        Ok(items)
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        self.save(&[])
    }
}

/// Human-readable list format used by the todo tools.
pub fn format_todos(items: &[TodoItem]) -> String {
    if items.is_empty() {
        return "(empty todo list)".to_string();
    }
    items
        .iter()
        .map(|i| format!("- [{}] {}: {}", i.status.as_str(), i.id, i.text))
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
