// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::fs::{read_text, resolve_path};
use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

/// Replace the 1-based inclusive line range `start..=end` of `text`.
///
/// `start == line_count + 1` is accepted as an append at EOF. The trailing
/// newline of the original file is preserved (and its absence too).
pub(crate) fn replace_line_range(
    text: &str,
    start: usize,
    end: usize,
    new_text: &str,
) -> Result<String, String> {
    let lines: Vec<&str> = text.lines().collect();
    if start < 1 || end < start || start > lines.len() + 1 {
        return Err(format!(
            "Invalid line range {start}-{end} for file with {} lines.",
            lines.len()
        ));
    }
    let end = end.min(lines.len());

    let mut merged: Vec<&str> = Vec::with_capacity(lines.len());
    merged.extend(&lines[..start - 1]);
    merged.extend(new_text.lines());
    merged.extend(&lines[end..]);

    let mut out = merged.join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace a line range in a file. Lines are 1-based inclusive. This is deterministic and safe."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path relative to cwd."},
                "start_line": {"type": "integer", "description": "1-based start line (inclusive)."},
                "end_line": {"type": "integer", "description": "1-based end line (inclusive)."},
                "new_text": {"type": "string", "description": "Replacement text for the range."}
            },
            "required": ["path", "start_line", "end_line", "new_text"]
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Edit
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> ToolResult {
        let Some(path) = args["path"].as_str() else {
            return ToolResult::err("missing required parameter 'path'");
        };
        let (Some(start), Some(end)) = (args["start_line"].as_u64(), args["end_line"].as_u64())
        else {
            return ToolResult::err("missing required parameters 'start_line'/'end_line'");
        };
        let Some(new_text) = args["new_text"].as_str() else {
            return ToolResult::err("missing required parameter 'new_text'");
        };
        debug!(path, start, end, "edit tool");

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
        let merged = match replace_line_range(&text, start as usize, end as usize, new_text) {
            Ok(m) => m,
            Err(e) => return ToolResult::err(e),
        };
        match std::fs::write(&p, merged) {
            Ok(()) => ToolResult::ok(format!("Edited {path}: replaced lines {start}-{end}.")),
            Err(e) => ToolResult::err(format!("write error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
