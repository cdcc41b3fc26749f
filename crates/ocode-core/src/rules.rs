// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Rules resolver: project rule documents (`AGENTS.md` / `RULES.md`)
//! discovered from the global config dir and the project root, plus any
//! explicit extra files from the behavior config.

use std::path::{Path, PathBuf};

use ocode_config::{global_config_dir, BehaviorConfig};

#[derive(Debug, Clone)]
pub struct RuleDoc {
    /// "global" | "project" | "extra"
    pub scope: &'static str,
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct RuleBundle {
    pub docs: Vec<RuleDoc>,
    pub combined_text: String,
}

fn read_text(p: &Path) -> Option<String> {
    if p.is_file() {
        std::fs::read_to_string(p).ok()
    } else {
        None
    }
}

fn project_candidates(cwd: &Path) -> Vec<PathBuf> {
    vec![
        cwd.join("AGENTS.md"),
        cwd.join("RULES.md"),
        cwd.join(".ocode").join("AGENTS.md"),
        cwd.join(".ocode").join("RULES.md"),
    ]
}

fn global_candidates() -> Vec<PathBuf> {
    match global_config_dir() {
        Some(d) => vec![d.join("AGENTS.md"), d.join("RULES.md")],
        None => vec![],
    }
}

pub fn load_rules_bundle(cwd: &Path, behavior: Option<&BehaviorConfig>) -> RuleBundle {
    let mut docs: Vec<RuleDoc> = Vec::new();

    // First hit wins within each scope.
    for p in global_candidates() {
        if let Some(content) = read_text(&p) {
            docs.push(RuleDoc {
                scope: "global",
                path: p,
                content,
            });
            break;
        }
    }
    for p in project_candidates(cwd) {
        if let Some(content) = read_text(&p) {
            docs.push(RuleDoc {
                scope: "project",
                path: p,
                content,
            });
            break;
        }
    }
    if let Some(behavior) = behavior {
        for p in &behavior.rules_files {
            if let Some(content) = read_text(p) {
                docs.push(RuleDoc {
                    scope: "extra",
                    path: p.clone(),
                    content,
                });
            }
        }
    }

    let combined_text = combine(&docs);
    RuleBundle {
        docs,
        combined_text,
    }
}

fn combine(docs: &[RuleDoc]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for d in docs {
        let header = format!("[{}] {}", d.scope, d.path.display());
        parts.push(header.clone());
        parts.push("-".repeat(header.len()));
        parts.push(d.content.trim().to_string());
        parts.push(String::new());
    }
    parts.join("\n").trim().to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
