// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::fs::resolve_path;
use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file with given content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path relative to cwd."},
                "content": {"type": "string", "description": "Full file content."},
                "mkdirs": {"type": "boolean", "default": true, "description": "Create parent directories if needed."}
            },
            "required": ["path", "content"]
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Edit
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> ToolResult {
        let Some(path) = args["path"].as_str() else {
            return ToolResult::err("missing required parameter 'path'");
        };
        let Some(content) = args["content"].as_str() else {
            return ToolResult::err("missing required parameter 'content'");
        };
        let mkdirs = args["mkdirs"].as_bool().unwrap_or(true);
        debug!(path, chars = content.len(), "write tool");

        let p = match resolve_path(&ctx.cwd, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if mkdirs {
            if let Some(parent) = p.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    return ToolResult::err(format!("mkdir error: {e}"));
                }
            }
        }
        match std::fs::write(&p, content) {
            Ok(()) => ToolResult::ok(format!("Wrote {path} ({} chars).", content.len())),
            Err(e) => ToolResult::err(format!("write error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
