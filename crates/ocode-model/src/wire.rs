// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Serialization of [`Message`]s into the OpenAI chat/completions wire shape.
//!
//! Kept separate from the HTTP client so the prompt builder can produce
//! provider-format messages without owning a network handle, and so the
//! conversion is unit-testable in isolation.

use serde_json::{json, Value};

use crate::types::{Message, Role, NAME_AGENT, NAME_RULES, NAME_SKILL, NAME_SUMMARY};

fn role_str(r: Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn is_reserved_name(name: &str) -> bool {
    matches!(name, NAME_SKILL | NAME_RULES | NAME_AGENT | NAME_SUMMARY)
}

/// Convert one message to provider format.
///
/// - system carries `name` only for the reserved injection names
/// - assistant includes `tool_calls` when present; `reasoning_content` is
///   included when `force_reasoning`, or when `include_reasoning` and the
///   message has tool calls (empty string when absent — some providers
///   reject a missing field)
/// - tool carries `tool_call_id` but never `name`
pub fn message_to_wire(m: &Message, include_reasoning: bool, force_reasoning: bool) -> Value {
    let mut d = json!({
        "role": role_str(m.role),
        "content": m.content,
    });
    if m.role == Role::System {
        if let Some(name) = &m.name {
            if is_reserved_name(name) {
                d["name"] = json!(name);
            }
        }
    }
    if let Some(id) = &m.tool_call_id {
        d["tool_call_id"] = json!(id);
    }
    if m.role == Role::Assistant {
        if let Some(calls) = &m.tool_calls {
            let wire_calls: Vec<Value> = calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            d["tool_calls"] = json!(wire_calls);
        }
        if force_reasoning || (include_reasoning && m.tool_calls.is_some()) {
            d["reasoning_content"] = json!(m.reasoning_content.as_deref().unwrap_or(""));
        }
    }
    d
}

pub fn messages_to_wire(
    msgs: &[Message],
    include_reasoning: bool,
    force_reasoning: bool,
) -> Vec<Value> {
    msgs.iter()
        .map(|m| message_to_wire(m, include_reasoning, force_reasoning))
        .collect()
}

/// Wrap a tool schema in the `{"type":"function",...}` envelope.
pub fn tool_schema_to_wire(name: &str, description: &str, parameters: &Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters,
        }
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
