// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved system-message names recognized by the prompt builder.
pub const NAME_SKILL: &str = "skill";
pub const NAME_RULES: &str = "rules";
pub const NAME_AGENT: &str = "agent";
pub const NAME_SUMMARY: &str = "summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One tool invocation requested by the assistant.
///
/// `arguments` is the parsed JSON value, not the provider's argument string.
/// The wire layer re-encodes it when talking to the API so the session file
/// stays structured and directly replayable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A single message in the conversation history.
///
/// `content` may be absent: an assistant message that only requests tools
/// carries `content: None` plus a non-empty `tool_calls` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Marks well-known system injections (skill / rules / agent / summary).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool-role only: joins this reply to the assistant request with the same id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Assistant-role only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// Reasoning text kept separate from the answer, for providers that
    /// require it echoed back on subsequent turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(text.into()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
            reasoning_content: None,
        }
    }

    /// System message carrying one of the reserved injection names.
    pub fn system_named(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::system(text)
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            ..Self::system(text)
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            ..Self::system(text)
        }
    }

    /// Assistant message that only requests tools (`content: None`).
    pub fn assistant_tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            name: None,
            tool_call_id: None,
            tool_calls: Some(calls),
            reasoning_content: None,
        }
    }

    pub fn tool_result(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            name: None,
            tool_call_id: Some(id.into()),
            tool_calls: None,
            reasoning_content: None,
        }
    }

    /// True when this assistant message carries at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// One parsed assistant turn — the adapter's output for both modes.
#[derive(Debug, Clone, Default)]
pub struct AssistantTurn {
    pub text: String,
    pub reasoning_content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// When to echo `reasoning_content` back to the provider.
///
/// `Auto` substring-matches the model identifier against known markers;
/// the other two variants exist so a provider entry can pin the behavior
/// instead of relying on the brittle substring check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReasoningMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl ReasoningMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "always" => Some(Self::Always),
            "never" => Some(Self::Never),
            _ => None,
        }
    }
}

/// Request handed to a chat transport. `messages` and `tools` are already in
/// provider wire format (the prompt builder owns that conversion).
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Value>,
    pub tools: Vec<Value>,
    pub stream: bool,
}

/// Streaming token sink. Sends execute synchronously on the SSE read path.
pub type TokenSink = tokio::sync::mpsc::UnboundedSender<String>;

/// The one seam the orchestrator talks to a model through.
///
/// Retries and fallback are the orchestrator's responsibility; a transport
/// surfaces transport and HTTP failures as plain errors with a body excerpt.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn model(&self) -> &str;
    async fn chat(&self, req: ChatRequest, on_token: Option<TokenSink>)
        -> anyhow::Result<AssistantTurn>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
