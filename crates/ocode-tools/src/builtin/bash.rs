// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Runs a command string through a real shell so built-ins like `cd`,
/// pipes, `&&`, and env expansion work.
pub struct BashTool;

/// Prefer bash; fall back to `sh` on systems without it (Alpine, BSDs).
fn shell_program() -> &'static str {
    let found = std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| dir.join("bash").is_file())
    });
    if found {
        "bash"
    } else {
        "sh"
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command in the working directory. Returns stdout/stderr and exit code."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to run."},
                "timeout": {"type": "integer", "default": 120, "description": "Timeout seconds."}
            },
            "required": ["command"]
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Bash
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> ToolResult {
        let command = args["command"].as_str().unwrap_or("").trim().to_string();
        if command.is_empty() {
            return ToolResult::err("Empty command.");
        }
        let timeout = args["timeout"].as_u64().unwrap_or(DEFAULT_TIMEOUT_SECS);
        debug!(cmd = %command, timeout, "bash tool");

        let mut cmd = Command::new(shell_program());
        cmd.arg("-lc")
            .arg(&command)
            .current_dir(&ctx.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Detach the child from the controlling terminal so interactive
        // programs fail fast instead of hanging the turn.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let output = match tokio::time::timeout(Duration::from_secs(timeout), cmd.output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return ToolResult::err(format!("failed to spawn shell: {e}")),
            Err(_) => return ToolResult::err(format!("Command timed out after {timeout}s.")),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output.status.code().unwrap_or(-1);

        let mut out = String::new();
        if !stdout.is_empty() {
            out.push_str(&format!("STDOUT:\n{stdout}\n"));
        }
        if !stderr.is_empty() {
            out.push_str(&format!("STDERR:\n{stderr}\n"));
        }
        out.push_str(&format!("EXIT_CODE: {code}"));

        ToolResult {
            content: out,
            is_error: code != 0,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
