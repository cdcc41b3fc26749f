// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::fs::path_glob_to_regex;
use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (relative to cwd)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Glob pattern, e.g. 'src/**/*.rs'."},
                "max_results": {"type": "integer", "default": 200}
            },
            "required": ["pattern"]
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> ToolResult {
        let Some(pattern) = args["pattern"].as_str() else {
            return ToolResult::err("missing required parameter 'pattern'");
        };
        let max_results = args["max_results"].as_u64().unwrap_or(200) as usize;
        debug!(pattern, "glob tool");

        let Some(re) = path_glob_to_regex(pattern) else {
            return ToolResult::err(format!("invalid glob pattern: {pattern}"));
        };
        let root = match ctx.cwd.canonicalize() {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("cwd error: {e}")),
        };

        let mut matches: Vec<String> = Vec::new();
        for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
            let Ok(entry) = entry else { continue };
            let Ok(rel) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let rel = rel.display().to_string();
            if re.is_match(&rel) {
                matches.push(rel);
                if matches.len() >= max_results {
                    break;
                }
            }
        }

        if matches.is_empty() {
            ToolResult::ok("(no matches)")
        } else {
            ToolResult::ok(matches.join("\n"))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
