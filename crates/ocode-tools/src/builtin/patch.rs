// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

const APPLY_TIMEOUT_SECS: u64 = 120;

/// Applies a unified diff: `git apply` first, system `patch -p0` as the
/// fallback.
pub struct PatchTool;

struct CmdOutcome {
    code: i32,
    stderr: String,
}

async fn run(program: &str, args: &[&str], cwd: &std::path::Path) -> Option<CmdOutcome> {
    let fut = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(std::process::Stdio::null())
        .output();
    match tokio::time::timeout(Duration::from_secs(APPLY_TIMEOUT_SECS), fut).await {
        Ok(Ok(out)) => Some(CmdOutcome {
            code: out.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        }),
        // Spawn failure usually means the program is not installed.
        Ok(Err(_)) | Err(_) => None,
    }
}

#[async_trait]
impl Tool for PatchTool {
    fn name(&self) -> &str {
        "patch"
    }

    fn description(&self) -> &str {
        "Apply a unified diff patch to the working directory. Uses git apply if available, else system patch."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "diff": {"type": "string", "description": "Unified diff text."}
            },
            "required": ["diff"]
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Edit
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> ToolResult {
        let Some(diff) = args["diff"].as_str() else {
            return ToolResult::err("missing required parameter 'diff'");
        };
        debug!(chars = diff.len(), "patch tool");

        let mut tmp = match tempfile::Builder::new().suffix(".patch").tempfile() {
            Ok(f) => f,
            Err(e) => return ToolResult::err(format!("temp file error: {e}")),
        };
        if let Err(e) = tmp.write_all(diff.as_bytes()) {
            return ToolResult::err(format!("temp file error: {e}"));
        }
        let patch_path = tmp.path().to_string_lossy().into_owned();

        let git = run(
            "git",
            &["apply", "--whitespace=nowarn", &patch_path],
            &ctx.cwd,
        )
        .await;
        if let Some(out) = &git {
            if out.code == 0 {
                return ToolResult::ok("Patch applied with git apply.");
            }
        }

        let patch = run("patch", &["-p0", "-i", &patch_path], &ctx.cwd).await;
        match patch {
            Some(out) if out.code == 0 => ToolResult::ok("Patch applied with patch."),
            Some(out) => {
                let git_note = match &git {
                    Some(g) => format!("(git) rc={} stderr={}", g.code, g.stderr),
                    None => "(git) unavailable".to_string(),
                };
                ToolResult::err(format!(
                    "Failed to apply patch.\n{git_note}\n(patch) rc={} stderr={}",
                    out.code, out.stderr
                ))
            }
            None if git.is_some() => {
                let g = git.unwrap();
                ToolResult::err(format!(
                    "Failed to apply patch.\n(git) rc={} stderr={}\n(patch) unavailable",
                    g.code, g.stderr
                ))
            }
            None => ToolResult::err("No patch tool available (need git or patch)."),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
