// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool-call replay: re-execute recorded tool calls without any LLM call.
//!
//! Useful to reproduce side effects (file edits, bash) from a recorded run
//! and to validate determinism of tool outputs — a fresh result that
//! differs from the recorded one is flagged as a diff.

use std::collections::HashMap;

use ocode_model::{Message, Role, ToolCallRequest};
use serde_json::json;

use crate::context::AppContext;
use crate::orchestrator::execute_recorded_call;

/// One assistant tool-call block: its index in the session, the calls it
/// made, and the recorded replies keyed by call id.
#[derive(Debug, Clone)]
pub struct ToolCallGroup {
    pub assistant_index: usize,
    pub calls: Vec<ToolCallRequest>,
    pub answered: HashMap<String, String>,
}

/// Collect every assistant tool-call block with its contiguous replies.
pub fn assistant_tool_call_groups(messages: &[Message]) -> Vec<ToolCallGroup> {
    let mut out = Vec::new();
    for (i, m) in messages.iter().enumerate() {
        if m.role != Role::Assistant || !m.has_tool_calls() {
            continue;
        }
        let mut answered = HashMap::new();
        for follow in &messages[i + 1..] {
            if follow.role != Role::Tool {
                break;
            }
            if let Some(id) = &follow.tool_call_id {
                answered.insert(id.clone(), follow.content.clone().unwrap_or_default());
            }
        }
        out.push(ToolCallGroup {
            assistant_index: i,
            calls: m.tool_calls.clone().unwrap_or_default(),
            answered,
        });
    }
    out
}

/// Outcome of replaying one recorded call.
#[derive(Debug, Clone)]
pub enum ReplayStatus {
    /// Dry run: nothing was executed.
    Skipped,
    Executed {
        is_error: bool,
        /// Fresh output differs (whitespace-trimmed) from the recorded one.
        diff: bool,
    },
}

#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub block: usize,
    pub assistant_index: usize,
    pub tool: String,
    pub call_id: String,
    pub content: String,
    pub status: ReplayStatus,
}

/// Re-execute recorded tool calls block by block. Permissions apply exactly
/// as in a live turn; denials and missing tools surface in the outcome
/// content the same way they would in a tool reply.
pub async fn replay_exec(
    ctx: &AppContext,
    dry_run: bool,
    start: usize,
    limit: usize,
) -> Vec<ReplayOutcome> {
    let groups = assistant_tool_call_groups(&ctx.session.messages);
    let groups: Vec<(usize, &ToolCallGroup)> = groups
        .iter()
        .enumerate()
        .skip(start)
        .take(limit)
        .collect();

    let mut outcomes = Vec::new();
    for (block, group) in groups {
        for call in &group.calls {
            if dry_run {
                outcomes.push(ReplayOutcome {
                    block,
                    assistant_index: group.assistant_index,
                    tool: call.name.clone(),
                    call_id: call.id.clone(),
                    content: json!({"tool": call.name, "args": call.arguments}).to_string(),
                    status: ReplayStatus::Skipped,
                });
                continue;
            }
            let result = execute_recorded_call(ctx, call).await;
            let diff = group
                .answered
                .get(&call.id)
                .is_some_and(|old| old.trim() != result.content.trim());
            outcomes.push(ReplayOutcome {
                block,
                assistant_index: group.assistant_index,
                tool: call.name.clone(),
                call_id: call.id.clone(),
                content: result.content,
                status: ReplayStatus::Executed {
                    is_error: result.is_error,
                    diff,
                },
            });
        }
    }
    outcomes
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
