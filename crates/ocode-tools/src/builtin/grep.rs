// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::fs::{include_matches, read_text, resolve_path};
use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search for a pattern in files. Returns matching lines with line numbers."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regex (default) or literal string if regex=false."},
                "path": {"type": "string", "description": "File or directory to search (relative to cwd). Default '.'"},
                "regex": {"type": "boolean", "default": true},
                "include": {"type": "string", "description": "Optional glob filter like '*.rs'."},
                "max_matches": {"type": "integer", "default": 200}
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
        let path = args["path"].as_str().unwrap_or(".");
        let is_regex = args["regex"].as_bool().unwrap_or(true);
        let include = args["include"].as_str();
        let max_matches = args["max_matches"].as_u64().unwrap_or(200) as usize;
        debug!(pattern, path, is_regex, "grep tool");

        let target = match resolve_path(&ctx.cwd, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if !target.exists() {
            return ToolResult::err(format!("Path not found: {path}"));
        }
        let root = match ctx.cwd.canonicalize() {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("cwd error: {e}")),
        };

        let rx = if is_regex {
            match Regex::new(pattern) {
                Ok(r) => Some(r),
                Err(e) => return ToolResult::err(format!("Invalid regex: {e}")),
            }
        } else {
            None
        };

        let files: Vec<std::path::PathBuf> = if target.is_file() {
            vec![target]
        } else {
            WalkDir::new(&target)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.path().is_file())
                .map(|e| e.path().to_path_buf())
                .collect()
        };

        let mut out_lines: Vec<String> = Vec::new();
        for f in files {
            let rel = match f.strip_prefix(&root) {
                Ok(r) => r.display().to_string(),
                Err(_) => f.display().to_string(),
            };
            if let Some(inc) = include {
                if !include_matches(inc, &rel) {
                    continue;
                }
            }
            let Ok(text) = read_text(&f) else { continue };
            for (i, line) in text.lines().enumerate() {
                let hit = match &rx {
                    Some(re) => re.is_match(line),
                    None => line.contains(pattern),
                };
                if hit {
                    out_lines.push(format!("{rel}:{}: {line}", i + 1));
                    if out_lines.len() >= max_matches {
                        return ToolResult::ok(out_lines.join("\n"));
                    }
                }
            }
        }

        if out_lines.is_empty() {
            ToolResult::ok("(no matches)")
        } else {
            ToolResult::ok(out_lines.join("\n"))
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
    async fn regex_search_reports_file_line_and_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() {}\nlet x = 1;\n").unwrap();
        let out = GrepTool
            .execute(&ctx(dir.path()), &json!({"pattern": "fn \\w+"}))
            .await;
        assert!(out.content.contains("a.rs:1: fn main() {}"), "{}", out.content);
    }

    #[tokio::test]
    async fn literal_mode_does_not_interpret_regex() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "price is $5.00 (sale)\n").unwrap();
        let out = GrepTool
            .execute(
                &ctx(dir.path()),
                &json!({"pattern": "$5.00 (sale)", "regex": false}),
            )
            .await;
        assert!(out.content.contains("a.txt:1:"), "{}", out.content);
    }

    #[tokio::test]
    async fn invalid_regex_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = GrepTool
            .execute(&ctx(dir.path()), &json!({"pattern": "(unclosed"}))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("Invalid regex"));
    }

    #[tokio::test]
    async fn include_filter_limits_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "needle\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "needle\n").unwrap();
        let out = GrepTool
            .execute(
                &ctx(dir.path()),
                &json!({"pattern": "needle", "include": "*.rs"}),
            )
            .await;
        assert!(out.content.contains("a.rs"));
        assert!(!out.content.contains("b.txt"));
    }

    #[tokio::test]
    async fn match_cap_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (0..50).map(|_| "hit\n").collect();
        std::fs::write(dir.path().join("many.txt"), body).unwrap();
        let out = GrepTool
            .execute(
                &ctx(dir.path()),
                &json!({"pattern": "hit", "max_matches": 7}),
            )
            .await;
        assert_eq!(out.content.lines().count(), 7);
    }

    #[tokio::test]
    async fn no_matches_reports_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "nothing here\n").unwrap();
        let out = GrepTool
            .execute(&ctx(dir.path()), &json!({"pattern": "absent_token"}))
            .await;
        assert_eq!(out.content, "(no matches)");
    }
}
