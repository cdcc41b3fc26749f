// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use ocode_model::{wire, ChatRequest, ChatTransport, Message};
use tracing::warn;

pub const SUMMARY_PROMPT: &str = "You are summarizing a coding agent conversation for future continuation.\n\
Write a concise but information-dense summary with these sections:\n\
- Goal\n- Key decisions\n- Current state (files touched, commands run, errors)\n- TODO next\n\
Keep it under 2500 characters.";

/// Ask the provider to summarize previous messages. No tools are passed so
/// the model cannot spend the call on tool use. Failures degrade to a
/// placeholder string rather than aborting the turn.
pub async fn summarize(
    provider: &dyn ChatTransport,
    messages: &[Message],
    include_reasoning: bool,
    force_reasoning: bool,
) -> String {
    let mut wire_msgs = vec![serde_json::json!({"role": "system", "content": SUMMARY_PROMPT})];
    wire_msgs.extend(wire::messages_to_wire(
        messages,
        include_reasoning,
        force_reasoning,
    ));
    let req = ChatRequest {
        messages: wire_msgs,
        tools: vec![],
        stream: false,
    };
    match provider.chat(req, None).await {
        Ok(turn) => {
            let text = turn.text.trim().to_string();
            if text.is_empty() {
                "(summary empty)".to_string()
            } else {
                text
            }
        }
        Err(e) => {
            warn!(error = %e, "summarization call failed");
            format!("(summary failed: {e})")
        }
    }
}
