// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::fs::{read_text, resolve_path};
use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

const DEFAULT_MAX_CHARS: usize = 40_000;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read a text file. Optionally limit to a line range."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path relative to cwd."},
                "start_line": {"type": "integer", "description": "1-based start line (inclusive)."},
                "end_line": {"type": "integer", "description": "1-based end line (inclusive)."},
                "max_chars": {"type": "integer", "default": 40000}
            },
            "required": ["path"]
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> ToolResult {
        let Some(path) = args["path"].as_str() else {
            return ToolResult::err("missing required parameter 'path'");
        };
        debug!(path, "read tool");

        let p = match resolve_path(&ctx.cwd, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if !p.is_file() {
            return ToolResult::err(format!("File not found: {path}"));
        }
        let text = match read_text(&p) {
            Ok(t) => t,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        let lines: Vec<&str> = text.lines().collect();

        let start = args["start_line"].as_u64();
        let end = args["end_line"].as_u64();
        let excerpt: Vec<&str> = if start.is_some() || end.is_some() {
            let s = (start.unwrap_or(1) as usize).max(1);
            let e = (end.unwrap_or(lines.len() as u64) as usize).min(lines.len());
            if s > lines.len() || e < s {
                Vec::new()
            } else {
                lines[s - 1..e].to_vec()
            }
        } else {
            lines
        };

        let mut out = excerpt.join("\n");
        let max_chars = args["max_chars"].as_u64().unwrap_or(DEFAULT_MAX_CHARS as u64) as usize;
        if out.len() > max_chars {
            out.truncate(floor_char_boundary(&out, max_chars));
            out.push_str("\n... (truncated)");
        }
        ToolResult::ok(out)
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolContext;

    fn ctx(dir: &std::path::Path) -> ToolContext {
        ToolContext {
            cwd: dir.to_path_buf(),
            session_id: None,
            data_root: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn reads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello\nworld\n").unwrap();
        let out = ReadFileTool
            .execute(&ctx(dir.path()), &json!({"path": "a.txt"}))
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content, "hello\nworld");
    }

    #[tokio::test]
    async fn line_range_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "l1\nl2\nl3\nl4\n").unwrap();
        let out = ReadFileTool
            .execute(
                &ctx(dir.path()),
                &json!({"path": "a.txt", "start_line": 2, "end_line": 3}),
            )
            .await;
        assert_eq!(out.content, "l2\nl3");
    }

    #[tokio::test]
    async fn range_beyond_eof_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "only\n").unwrap();
        let out = ReadFileTool
            .execute(
                &ctx(dir.path()),
                &json!({"path": "a.txt", "start_line": 1, "end_line": 99}),
            )
            .await;
        assert_eq!(out.content, "only");
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = ReadFileTool
            .execute(&ctx(dir.path()), &json!({"path": "nope.txt"}))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("File not found"));
    }

    #[tokio::test]
    async fn char_cap_truncates_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(500)).unwrap();
        let out = ReadFileTool
            .execute(
                &ctx(dir.path()),
                &json!({"path": "big.txt", "max_chars": 100}),
            )
            .await;
        assert!(out.content.ends_with("... (truncated)"));
        assert!(out.content.len() < 200);
    }

    #[tokio::test]
    async fn path_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let out = ReadFileTool
            .execute(&ctx(dir.path()), &json!({"path": "../etc/passwd"}))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("escapes working directory"));
    }
}
