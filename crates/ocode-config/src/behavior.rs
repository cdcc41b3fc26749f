// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! JSON behavior config: agents, permission rules, inline commands, MCP
//! servers, and extra rules files.
//!
//! Layers merge in order global < project < explicit path. Within a layer
//! the first existing project candidate wins. A malformed file is fatal,
//! reported with the offending path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::global_config_dir;

/// A permission decision, ordered so that tests can assert monotonicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Ask,
    Deny,
}

/// One permission rule. `match` forms:
/// - `tool:<glob>` matches tool names only
/// - any other glob matches either the permission class or the tool name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRule {
    #[serde(rename = "match")]
    pub pattern: String,
    pub decision: Decision,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub max_steps: Option<u32>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub permission_overrides: BTreeMap<String, Decision>,
}

/// A reusable prompt template, either inline (behavior config) or loaded
/// from a markdown file with front matter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_steps: Option<u32>,
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpServerConfig {
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
    /// Tool-name prefix override; defaults to `mcp.<server-name>`.
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default = "default_agent_name")]
    pub default_agent: String,
    #[serde(default)]
    pub permissions: Vec<PermissionRule>,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
    #[serde(default)]
    pub commands: BTreeMap<String, CommandSpec>,
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    /// Extra rules files, relative to the project root.
    #[serde(default)]
    pub rules_files: Vec<PathBuf>,
    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

fn default_agent_name() -> String {
    "general".to_string()
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            default_agent: default_agent_name(),
            permissions: Vec::new(),
            agents: BTreeMap::new(),
            commands: BTreeMap::new(),
            mcp_servers: BTreeMap::new(),
            rules_files: Vec::new(),
            loaded_from: None,
        }
    }
}

fn project_candidates(cwd: &Path) -> Vec<PathBuf> {
    vec![cwd.join(".ocode.json"), cwd.join("ocode.json")]
}

fn global_candidates() -> Vec<PathBuf> {
    match global_config_dir() {
        Some(d) => vec![d.join("ocode.json")],
        None => vec![],
    }
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_json(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(d), Value::Object(s)) => {
            for (k, v) in s {
                merge_json(d.entry(k).or_insert(Value::Null), v);
            }
        }
        (dst, src) => *dst = src,
    }
}

fn read_layer(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading behavior config {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("parsing behavior config {}", path.display()))
}

/// Load the behavior config, merging global < project < explicit path.
pub fn load_behavior_config(
    cwd: &Path,
    explicit_path: Option<&Path>,
) -> anyhow::Result<BehaviorConfig> {
    let mut merged = Value::Object(Default::default());
    let mut loaded_from: Option<PathBuf> = None;

    for p in global_candidates() {
        if p.is_file() {
            debug!(path = %p.display(), "loading global behavior config");
            merge_json(&mut merged, read_layer(&p)?);
            loaded_from = Some(p);
        }
    }
    for p in project_candidates(cwd) {
        if p.is_file() {
            debug!(path = %p.display(), "loading project behavior config");
            merge_json(&mut merged, read_layer(&p)?);
            loaded_from = Some(p);
            break; // first project candidate wins
        }
    }
    if let Some(p) = explicit_path {
        debug!(path = %p.display(), "loading explicit behavior config");
        merge_json(&mut merged, read_layer(p)?);
        loaded_from = Some(p.to_path_buf());
    }

    let mut cfg: BehaviorConfig = if merged.as_object().is_some_and(|m| m.is_empty()) {
        BehaviorConfig::default()
    } else {
        serde_json::from_value(merged).with_context(|| {
            format!(
                "behavior config {} has invalid structure",
                loaded_from
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            )
        })?
    };

    // Resolve rules_files against the project root.
    cfg.rules_files = cfg
        .rules_files
        .into_iter()
        .map(|p| if p.is_absolute() { p } else { cwd.join(p) })
        .collect();
    cfg.loaded_from = loaded_from;
    Ok(cfg)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
