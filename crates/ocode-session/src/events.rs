// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One structured observability record: `{ts, type, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: f64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Append-only JSONL event trail keyed by session id.
///
/// Strictly best-effort: a failed write is logged and ignored, never
/// surfaced to the turn.
#[derive(Debug)]
pub struct EventLog {
    pub session_id: String,
    pub path: PathBuf,
}

impl EventLog {
    pub fn open(data_root: &Path, session_id: &str) -> Self {
        let dir = data_root.join("events");
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(error = %e, "cannot create events dir");
        }
        Self {
            session_id: session_id.to_string(),
            path: dir.join(format!("{session_id}.jsonl")),
        }
    }

    pub fn append(&self, event_type: &str, data: Value) {
        let ev = Event {
            ts: Utc::now().timestamp_millis() as f64 / 1000.0,
            event_type: event_type.to_string(),
            data,
        };
        let Ok(line) = serde_json::to_string(&ev) else {
            return;
        };
        let res = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = res {
            warn!(error = %e, event = event_type, "event log write failed");
        }
    }

    /// Read all events, skipping unparseable lines.
    pub fn read_all(&self) -> Vec<Event> {
        let Ok(text) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
