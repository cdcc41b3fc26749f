// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::fs::resolve_path;
use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "List files/directories under a path (relative to cwd)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path relative to cwd. Default '.'"},
                "max_entries": {"type": "integer", "description": "Max entries to return", "default": 200},
                "recursive": {"type": "boolean", "description": "If true, list recursively", "default": false}
            },
            "required": []
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> ToolResult {
        let path = args["path"].as_str().unwrap_or(".");
        let max_entries = args["max_entries"].as_u64().unwrap_or(200) as usize;
        let recursive = args["recursive"].as_bool().unwrap_or(false);
        debug!(path, recursive, "list tool");

        let p = match resolve_path(&ctx.cwd, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if !p.exists() {
            return ToolResult::err(format!("Path not found: {path}"));
        }
        if !p.is_dir() {
            return ToolResult::err(format!("Not a directory: {path}"));
        }
        let root = match ctx.cwd.canonicalize() {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("cwd error: {e}")),
        };

        let mut entries: Vec<String> = Vec::new();
        if recursive {
            for entry in WalkDir::new(&p).min_depth(1).sort_by_file_name() {
                let Ok(entry) = entry else { continue };
                if let Ok(rel) = entry.path().strip_prefix(&root) {
                    entries.push(rel.display().to_string());
                }
                if entries.len() >= max_entries {
                    break;
                }
            }
        } else {
            let mut children: Vec<_> = match std::fs::read_dir(&p) {
                Ok(rd) => rd.filter_map(Result::ok).collect(),
                Err(e) => return ToolResult::err(format!("read_dir error: {e}")),
            };
            // Directories first, then files, case-insensitive by name.
            children.sort_by_key(|c| {
                (
                    !c.path().is_dir(),
                    c.file_name().to_string_lossy().to_lowercase(),
                )
            });
            for child in children {
                if let Ok(rel) = child.path().strip_prefix(&root) {
                    entries.push(rel.display().to_string());
                }
                if entries.len() >= max_entries {
                    break;
                }
            }
        }

        if entries.is_empty() {
            ToolResult::ok("(empty)")
        } else {
            ToolResult::ok(entries.join("\n"))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
