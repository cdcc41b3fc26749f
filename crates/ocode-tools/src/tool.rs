// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

/// Coarse permission category governing a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionClass {
    Read,
    Edit,
    Bash,
    Mcp,
}

impl PermissionClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Edit => "edit",
            Self::Bash => "bash",
            Self::Mcp => "mcp",
        }
    }
}

/// Everything a tool may touch outside its arguments.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Project root; all relative paths resolve against it and no tool may
    /// escape it.
    pub cwd: PathBuf,
    pub session_id: Option<String>,
    /// User data directory (todo lists and other per-session state).
    pub data_root: PathBuf,
}

/// The result of executing a tool. Failures are values, not errors — the
/// orchestrator records them as error-marked tool replies and the turn
/// continues.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            content: msg.into(),
            is_error: true,
        }
    }
}

/// Schema advertised to the model for one tool.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
}

/// Trait every builtin and bridged tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters.
    fn parameters_schema(&self) -> Value;
    fn permission_class(&self) -> PermissionClass;
    /// Execute the tool. Failures should be wrapped in [`ToolResult::err`].
    async fn execute(&self, ctx: &ToolContext, args: &Value) -> ToolResult;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
