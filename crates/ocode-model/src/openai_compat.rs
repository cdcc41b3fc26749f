// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! OpenAI-compatible chat completions client.
//!
//! One transport: POST `<base_url>/chat/completions` with bearer auth.
//! Blocking mode reads the full JSON body; streaming mode consumes SSE
//! `data: ` lines and accumulates text, reasoning text, and per-index
//! tool-call deltas.
//!
//! SSE events can be split across TCP packets, so the stream keeps a
//! persistent line buffer and only parses complete `\n`-terminated lines.

use std::collections::HashMap;

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::types::{AssistantTurn, ChatRequest, ChatTransport, TokenSink, ToolCallRequest};

const TRANSPORT_TIMEOUT_SECS: u64 = 120;

pub struct OpenAiCompatClient {
    model: String,
    chat_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// `base_url` ends before `/chat/completions`, e.g. `https://api.deepseek.com/v1`.
    pub fn new(model: impl Into<String>, base_url: &str, api_key: impl Into<String>) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            model: model.into(),
            chat_url: format!("{base}/chat/completions"),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": req.messages,
            "temperature": 0.2,
        });
        if req.stream {
            body["stream"] = json!(true);
        }
        if !req.tools.is_empty() {
            body["tools"] = json!(req.tools);
            body["tool_choice"] = json!("auto");
        }
        body
    }

    async fn send(&self, body: &Value) -> anyhow::Result<reqwest::Response> {
        let resp = self
            .client
            .post(&self.chat_url)
            .timeout(std::time::Duration::from_secs(TRANSPORT_TIMEOUT_SECS))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.chat_url))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("provider error {status}: {}", excerpt(&text, 2000));
        }
        Ok(resp)
    }

    async fn chat_blocking(&self, req: &ChatRequest) -> anyhow::Result<AssistantTurn> {
        let body = self.build_body(req);
        let resp = self.send(&body).await?;
        let obj: Value = resp.json().await.context("reading completion body")?;
        let msg = &obj["choices"][0]["message"];

        let mut turn = AssistantTurn {
            text: msg["content"].as_str().unwrap_or("").to_string(),
            reasoning_content: msg["reasoning_content"].as_str().map(str::to_string),
            tool_calls: Vec::new(),
        };
        if let Some(calls) = msg["tool_calls"].as_array() {
            for tc in calls {
                let fun = &tc["function"];
                let name = fun["name"].as_str().unwrap_or("").to_string();
                let args = parse_args_str(fun["arguments"].as_str().unwrap_or("{}"), &name);
                turn.tool_calls.push(ToolCallRequest {
                    id: tc["id"].as_str().unwrap_or("").to_string(),
                    name,
                    arguments: args,
                });
            }
        }
        Ok(turn)
    }

    async fn chat_streaming(
        &self,
        req: &ChatRequest,
        on_token: Option<TokenSink>,
    ) -> anyhow::Result<AssistantTurn> {
        let mut body = self.build_body(req);
        body["stream"] = json!(true);
        let resp = self.send(&body).await?;

        let mut text = String::new();
        let mut reasoning = String::new();
        let mut pending: HashMap<u64, PendingToolCall> = HashMap::new();

        let mut buf = String::new();
        let mut stream = resp.bytes_stream();
        'read: while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("SSE read error")?;
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(nl) = buf.find('\n') {
                let line = buf[..nl].trim_end_matches('\r').to_string();
                buf.drain(..nl + 1);
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() {
                    continue;
                }
                if data == "[DONE]" {
                    break 'read;
                }
                let ev: Value = match serde_json::from_str(data) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "skipping unparseable SSE line");
                        continue;
                    }
                };
                let delta = &ev["choices"][0]["delta"];
                if let Some(t) = delta["content"].as_str() {
                    if !t.is_empty() {
                        text.push_str(t);
                        if let Some(tx) = &on_token {
                            let _ = tx.send(t.to_string());
                        }
                    }
                }
                if let Some(r) = delta["reasoning_content"].as_str() {
                    reasoning.push_str(r);
                }
                if let Some(calls) = delta["tool_calls"].as_array() {
                    for tc in calls {
                        let index = tc["index"].as_u64().unwrap_or(0);
                        let cur = pending.entry(index).or_default();
                        if let Some(id) = tc["id"].as_str() {
                            if !id.is_empty() {
                                cur.id = id.to_string();
                            }
                        }
                        let fun = &tc["function"];
                        if let Some(name) = fun["name"].as_str() {
                            if !name.is_empty() {
                                cur.name = name.to_string();
                            }
                        }
                        if let Some(args) = fun["arguments"].as_str() {
                            cur.args_buf.push_str(args);
                        }
                    }
                }
            }
        }

        let mut turn = AssistantTurn {
            text,
            reasoning_content: if reasoning.is_empty() {
                None
            } else {
                Some(reasoning)
            },
            tool_calls: Vec::new(),
        };
        let mut sorted: Vec<(u64, PendingToolCall)> = pending.into_iter().collect();
        sorted.sort_by_key(|(idx, _)| *idx);
        for (_, ptc) in sorted {
            turn.tool_calls.push(ptc.finish());
        }
        Ok(turn)
    }
}

#[async_trait]
impl ChatTransport for OpenAiCompatClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        req: ChatRequest,
        on_token: Option<TokenSink>,
    ) -> anyhow::Result<AssistantTurn> {
        debug!(
            model = %self.model,
            message_count = req.messages.len(),
            tool_count = req.tools.len(),
            stream = req.stream,
            "sending completion request"
        );
        if req.stream {
            self.chat_streaming(&req, on_token).await
        } else {
            self.chat_blocking(&req).await
        }
    }
}

/// Accumulator for one parallel tool call, keyed by its delta index.
#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

impl PendingToolCall {
    fn finish(self) -> ToolCallRequest {
        let arguments = parse_args_str(&self.args_buf, &self.name);
        ToolCallRequest {
            id: self.id,
            name: self.name,
            arguments,
        }
    }
}

/// Parse a tool-call argument string; empty or invalid JSON becomes `{}`.
fn parse_args_str(raw: &str, tool_name: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                tool = %tool_name,
                error = %e,
                "tool call had invalid JSON arguments; substituting {{}}"
            );
            Value::Object(Default::default())
        }
    }
}

fn excerpt(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_url_appends_path_and_strips_trailing_slash() {
        let c = OpenAiCompatClient::new("m", "http://localhost:9999/v1/", "k");
        assert_eq!(c.chat_url, "http://localhost:9999/v1/chat/completions");
    }

    #[test]
    fn body_omits_tools_when_empty() {
        let c = OpenAiCompatClient::new("m", "http://x/v1", "k");
        let body = c.build_body(&ChatRequest::default());
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn body_sets_tool_choice_auto_with_tools() {
        let c = OpenAiCompatClient::new("m", "http://x/v1", "k");
        let req = ChatRequest {
            tools: vec![json!({"type": "function"})],
            ..Default::default()
        };
        let body = c.build_body(&req);
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn parse_args_empty_string_is_empty_object() {
        assert_eq!(parse_args_str("", "t"), json!({}));
        assert_eq!(parse_args_str("   ", "t"), json!({}));
    }

    #[test]
    fn parse_args_invalid_json_is_empty_object() {
        assert_eq!(parse_args_str("{\"a\": ", "t"), json!({}));
    }

    #[test]
    fn parse_args_valid_json_passes_through() {
        assert_eq!(parse_args_str(r#"{"a":1}"#, "t"), json!({"a":1}));
    }

    #[test]
    fn pending_tool_call_concatenated_args_parse() {
        let mut ptc = PendingToolCall::default();
        ptc.id = "c1".into();
        ptc.name = "grep".into();
        ptc.args_buf.push_str(r#"{"pattern":"#);
        ptc.args_buf.push_str(r#""fn main"}"#);
        let tc = ptc.finish();
        assert_eq!(tc.arguments["pattern"], "fn main");
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé");
        assert_eq!(excerpt("ab", 10), "ab");
    }
}
