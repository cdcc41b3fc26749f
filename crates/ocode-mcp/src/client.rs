// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A minimal JSON-RPC client for MCP-like servers over stdio.
///
/// One dedicated reader task consumes the child's stdout line by line and
/// resolves pending requests by id. Requests block the caller until the
/// reply arrives or the timeout elapses; on timeout the pending entry is
/// removed so a late reply is dropped.
pub struct McpClient {
    child: Mutex<Child>,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>,
    next_id: AtomicU64,
}

impl McpClient {
    pub fn spawn(
        command: &[String],
        cwd: Option<&str>,
        env: impl IntoIterator<Item = (String, String)>,
    ) -> anyhow::Result<Self> {
        let (program, args) = command
            .split_first()
            .context("MCP server command is empty")?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in env {
            cmd.env(k, v);
        }
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to start MCP server: {program}"))?;
        let stdin = child.stdin.take().context("MCP server has no stdin pipe")?;
        let stdout = child
            .stdout
            .take()
            .context("MCP server has no stdout pipe")?;

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let msg: Value = match serde_json::from_str(line) {
                            Ok(v) => v,
                            Err(e) => {
                                warn!(error = %e, "unparseable line from MCP server");
                                continue;
                            }
                        };
                        let Some(id) = msg.get("id").and_then(Value::as_u64) else {
                            // Notification or malformed id; nothing waits on it.
                            continue;
                        };
                        let tx = reader_pending.lock().expect("pending lock").remove(&id);
                        match tx {
                            Some(tx) => {
                                let _ = tx.send(msg);
                            }
                            None => debug!(id, "late or unknown MCP reply dropped"),
                        }
                    }
                    // EOF or broken pipe: the server is gone, callers time out.
                    Ok(None) | Err(_) => break,
                }
            }
        });

        Ok(Self {
            child: Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
        })
    }

    /// Send one JSON-RPC request and await its reply.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> anyhow::Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("pending lock").insert(id, tx);

        {
            let mut stdin = self.stdin.lock().await;
            let line = format!("{req}\n");
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.lock().expect("pending lock").remove(&id);
                bail!("MCP write failed: {e}");
            }
            let _ = stdin.flush().await;
        }

        let msg = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(msg)) => msg,
            Ok(Err(_)) => {
                self.pending.lock().expect("pending lock").remove(&id);
                bail!("MCP server closed before replying to {method}");
            }
            Err(_) => {
                self.pending.lock().expect("pending lock").remove(&id);
                bail!("MCP request timeout: {method}");
            }
        };

        if let Some(err) = msg.get("error") {
            if !err.is_null() {
                bail!("MCP error for {method}: {err}");
            }
        }
        Ok(msg.get("result").cloned().unwrap_or(Value::Null))
    }

    /// `tools/list` → remote tool descriptors. Accepts both `inputSchema`
    /// and `input_schema`/`parameters` spellings.
    pub async fn list_tools(&self) -> anyhow::Result<Vec<McpToolInfo>> {
        let res = self
            .request("tools/list", json!({}), DEFAULT_REQUEST_TIMEOUT)
            .await?;
        let arr = match &res {
            Value::Object(m) => m.get("tools").and_then(Value::as_array).cloned(),
            Value::Array(a) => Some(a.clone()),
            _ => None,
        };
        let mut tools = Vec::new();
        for t in arr.unwrap_or_default() {
            let Some(name) = t.get("name").and_then(Value::as_str) else {
                continue;
            };
            let schema = t
                .get("inputSchema")
                .or_else(|| t.get("input_schema"))
                .or_else(|| t.get("parameters"))
                .cloned()
                .unwrap_or_else(|| json!({}));
            tools.push(McpToolInfo {
                name: name.to_string(),
                description: t
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                input_schema: if schema.is_object() { schema } else { json!({}) },
            });
        }
        Ok(tools)
    }

    /// `tools/call` with normalized text content.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> anyhow::Result<String> {
        let res = self
            .request(
                "tools/call",
                json!({"name": name, "arguments": arguments}),
                DEFAULT_REQUEST_TIMEOUT,
            )
            .await?;
        Ok(normalize_content(&res))
    }

    /// Terminate the child process. No graceful protocol.
    pub fn close(&self) {
        if let Ok(mut child) = self.child.lock() {
            let _ = child.start_kill();
        }
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Normalize a `tools/call` result: a string `content` is used verbatim, a
/// list of `{type, text}` fragments is joined by newline, anything else is
/// JSON-serialized.
fn normalize_content(res: &Value) -> String {
    if let Some(content) = res.get("content") {
        if let Some(s) = content.as_str() {
            return s.to_string();
        }
        if let Some(parts) = content.as_array() {
            let texts: Vec<String> = parts
                .iter()
                .map(|part| {
                    if part.get("type").and_then(Value::as_str) == Some("text") {
                        part.get("text")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string()
                    } else {
                        part.to_string()
                    }
                })
                .collect();
            return texts.join("\n");
        }
    }
    if let Some(s) = res.as_str() {
        return s.to_string();
    }
    serde_json::to_string_pretty(res).unwrap_or_else(|_| res.to_string())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
