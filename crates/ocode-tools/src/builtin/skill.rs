// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::fs::{read_text, resolve_path};
use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

const DEFAULT_MAX_CHARS: usize = 20_000;

pub struct SkillTool;

#[async_trait]
impl Tool for SkillTool {
    fn name(&self) -> &str {
        "skill"
    }

    fn description(&self) -> &str {
        "Load a SKILL.md (or any markdown file) and return its contents so the assistant can follow it. \
         If no path is provided, defaults to ./SKILL.md under the working directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the skill markdown file (default: SKILL.md)."},
                "max_chars": {"type": "integer", "description": "Max characters to return (default 20000)."}
            }
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> ToolResult {
        let rel = args["path"].as_str().unwrap_or("SKILL.md");
        let max_chars = args["max_chars"].as_u64().unwrap_or(DEFAULT_MAX_CHARS as u64) as usize;

        let p = match resolve_path(&ctx.cwd, rel) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if !p.is_file() {
            return ToolResult::err(format!("Skill file not found: {}", p.display()));
        }
        let mut text = match read_text(&p) {
            Ok(t) => t,
            Err(e) => return ToolResult::err(format!("skill failed: {e}")),
        };
        if text.len() > max_chars {
            let mut cut = max_chars;
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("\n\n... (truncated) ...");
        }
        ToolResult::ok(text)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
