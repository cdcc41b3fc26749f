// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MAX_CHARS: usize = 12_000;

pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "webfetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return its text content (HTML will be converted to plain text)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "The URL to fetch."},
                "timeout": {"type": "integer", "description": "Timeout seconds (default 15)."},
                "max_chars": {"type": "integer", "description": "Max characters to return (default 12000)."},
                "headers": {
                    "type": "object",
                    "description": "Optional HTTP headers.",
                    "additionalProperties": {"type": "string"}
                }
            },
            "required": ["url"]
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Read
    }

    async fn execute(&self, _ctx: &ToolContext, args: &Value) -> ToolResult {
        let url = args["url"].as_str().unwrap_or("").trim().to_string();
        if url.is_empty() {
            return ToolResult::err("Missing required field: url");
        }
        let timeout = args["timeout"].as_u64().unwrap_or(DEFAULT_TIMEOUT_SECS);
        let max_chars = args["max_chars"].as_u64().unwrap_or(DEFAULT_MAX_CHARS as u64) as usize;
        debug!(url = %url, "webfetch tool");

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .user_agent("ocode/0.4")
            .build()
        {
            Ok(c) => c,
            Err(e) => return ToolResult::err(format!("webfetch failed: {e}")),
        };

        let mut req = client.get(&url);
        if let Some(headers) = args["headers"].as_object() {
            for (k, v) in headers {
                if let Some(v) = v.as_str() {
                    req = req.header(k.as_str(), v);
                }
            }
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("webfetch failed: {e}")),
        };
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::err(format!("webfetch failed: {e}")),
        };

        let mut text = if content_type.contains("html") || body.to_lowercase().contains("<html") {
            // html2text drops script/style blocks on its own.
            html2text::from_read(body.as_bytes(), 100)
        } else {
            body
        };

        if text.len() > max_chars {
            let half = max_chars / 2;
            let head_end = floor_char_boundary(&text, half);
            let tail_start = ceil_char_boundary(&text, text.len() - half);
            text = format!(
                "{}\n\n... (truncated) ...\n\n{}",
                &text[..head_end],
                &text[tail_start..]
            );
        }
        ToolResult::ok(text)
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
