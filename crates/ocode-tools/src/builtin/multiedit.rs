// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::edit_file::replace_line_range;
use crate::fs::{read_text, resolve_path};
use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

pub struct MultiEditTool;

#[async_trait]
impl Tool for MultiEditTool {
    fn name(&self) -> &str {
        "multiedit"
    }

    fn description(&self) -> &str {
        "Apply multiple line-range edits in a single call. Edits must be non-overlapping and sorted."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path relative to cwd."},
                "edits": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "start_line": {"type": "integer"},
                            "end_line": {"type": "integer"},
                            "new_text": {"type": "string"}
                        },
                        "required": ["start_line", "end_line", "new_text"]
                    }
                }
            },
            "required": ["path", "edits"]
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Edit
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> ToolResult {
        let Some(path) = args["path"].as_str() else {
            return ToolResult::err("missing required parameter 'path'");
        };
        let Some(edits) = args["edits"].as_array() else {
            return ToolResult::err("edits must be a non-empty list");
        };
        if edits.is_empty() {
            return ToolResult::err("edits must be a non-empty list");
        }
        debug!(path, count = edits.len(), "multiedit tool");

        // Validate shape and ordering before touching the file.
        let mut parsed: Vec<(usize, usize, &str)> = Vec::with_capacity(edits.len());
        for e in edits {
            let (Some(s), Some(en), Some(t)) = (
                e["start_line"].as_u64(),
                e["end_line"].as_u64(),
                e["new_text"].as_str(),
            ) else {
                return ToolResult::err("each edit requires start_line, end_line, new_text");
            };
            parsed.push((s as usize, en as usize, t));
        }
        for w in parsed.windows(2) {
            if w[1].0 < w[0].0 {
                return ToolResult::err("edits must be sorted by start_line");
            }
            if w[1].0 <= w[0].1 {
                return ToolResult::err("edits must not overlap");
            }
        }

        let p = match resolve_path(&ctx.cwd, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if !p.is_file() {
            return ToolResult::err(format!("File not found: {path}"));
        }
        let mut text = match read_text(&p) {
            Ok(t) => t,
            Err(e) => return ToolResult::err(e.to_string()),
        };

        // Apply bottom-up so earlier ranges keep their line numbers; the file
        // is only written once all edits succeeded.
        for (s, en, t) in parsed.iter().rev() {
            text = match replace_line_range(&text, *s, *en, t) {
                Ok(next) => next,
                Err(e) => return ToolResult::err(e),
            };
        }
        match std::fs::write(&p, text) {
            Ok(()) => ToolResult::ok(format!("Applied {} edits to {path}.", parsed.len())),
            Err(e) => ToolResult::err(format!("write error: {e}")),
        }
    }
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
    async fn applies_multiple_edits_bottom_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "l1\nl2\nl3\nl4\n").unwrap();
        let out = MultiEditTool
            .execute(
                &ctx(dir.path()),
                &json!({"path": "a.txt", "edits": [
                    {"start_line": 1, "end_line": 1, "new_text": "L1"},
                    {"start_line": 3, "end_line": 4, "new_text": "L34"}
                ]}),
            )
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "L1\nl2\nL34\n"
        );
    }

    #[tokio::test]
    async fn unsorted_edits_fail_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "l1\nl2\nl3\n").unwrap();
        let out = MultiEditTool
            .execute(
                &ctx(dir.path()),
                &json!({"path": "a.txt", "edits": [
                    {"start_line": 3, "end_line": 3, "new_text": "x"},
                    {"start_line": 1, "end_line": 1, "new_text": "y"}
                ]}),
            )
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("sorted"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "l1\nl2\nl3\n"
        );
    }

    #[tokio::test]
    async fn overlapping_edits_fail_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "l1\nl2\nl3\n").unwrap();
        let out = MultiEditTool
            .execute(
                &ctx(dir.path()),
                &json!({"path": "a.txt", "edits": [
                    {"start_line": 1, "end_line": 2, "new_text": "x"},
                    {"start_line": 2, "end_line": 3, "new_text": "y"}
                ]}),
            )
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("overlap"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "l1\nl2\nl3\n"
        );
    }

    #[tokio::test]
    async fn out_of_range_edit_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "l1\n").unwrap();
        let out = MultiEditTool
            .execute(
                &ctx(dir.path()),
                &json!({"path": "a.txt", "edits": [
                    {"start_line": 1, "end_line": 1, "new_text": "x"},
                    {"start_line": 9, "end_line": 9, "new_text": "y"}
                ]}),
            )
            .await;
        assert!(out.is_error);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "l1\n"
        );
    }

    #[tokio::test]
    async fn empty_edit_list_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "l1\n").unwrap();
        let out = MultiEditTool
            .execute(&ctx(dir.path()), &json!({"path": "a.txt", "edits": []}))
            .await;
        assert!(out.is_error);
    }
}
