// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Prompt builder and compactor.
//!
//! Assembles the provider-format message list for one LLM call: injects
//! the skill / rules / agent system messages, summarizes old history when
//! the conversation grows past the threshold, applies the hard message-count
//! cap, and truncates oversized message contents head+tail.

use std::path::Path;

use ocode_model::{wire, ChatTransport, Message, Role, NAME_AGENT, NAME_RULES, NAME_SKILL, NAME_SUMMARY};
use serde_json::Value;

use crate::summarizer::summarize;

/// Policy knobs for keeping the prompt within a reasonable size.
#[derive(Debug, Clone, Copy)]
pub struct CompactionPolicy {
    /// Maximum number of messages to send to the model (after compaction).
    pub max_messages: usize,
    /// Above this count, summarize earlier content into a system summary.
    pub summarize_when_over: usize,
    /// Max characters for a single tool result kept in the prompt.
    pub max_tool_result_chars: usize,
    /// Max characters for any message content (safety against huge pastes).
    pub max_message_chars: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            max_messages: 45,
            summarize_when_over: 60,
            max_tool_result_chars: 12_000,
            max_message_chars: 20_000,
        }
    }
}

#[derive(Debug)]
pub struct PromptBuildResult {
    pub messages: Vec<Value>,
    /// When set, the caller should append this to the session so the
    /// compaction survives a restart.
    pub new_summary: Option<Message>,
}

/// Truncate long text by keeping head + tail. Errors usually sit at the
/// end of tool output, so the tail matters as much as the head.
pub fn truncate_middle(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.len() <= max_chars {
        return text.to_string();
    }
    let half = (max_chars / 2).max(1);
    let head_end = floor_char_boundary(text, half);
    let tail_start = ceil_char_boundary(text, text.len() - half);
    format!(
        "{}\n\n... (truncated) ...\n\n{}",
        &text[..head_end],
        &text[tail_start..]
    )
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

fn maybe_load_skill(cwd: &Path) -> Option<String> {
    let p = cwd.join("SKILL.md");
    if p.is_file() {
        std::fs::read_to_string(p).ok()
    } else {
        None
    }
}

fn is_named_system(m: &Message, name: &str) -> bool {
    m.role == Role::System && m.name.as_deref() == Some(name)
}

/// Build the message list sent to the LLM.
#[allow(clippy::too_many_arguments)]
pub async fn build_prompt_messages(
    cwd: &Path,
    session_messages: &[Message],
    provider: &dyn ChatTransport,
    policy: &CompactionPolicy,
    include_reasoning: bool,
    force_reasoning: bool,
    rules_text: Option<&str>,
    agent_prompt: Option<&str>,
) -> PromptBuildResult {
    let mut msgs: Vec<Message> = session_messages.to_vec();
    let mut new_summary: Option<Message> = None;

    // Skill injection happens once; a persisted skill message suppresses it.
    let has_skill = msgs.iter().any(|m| is_named_system(m, NAME_SKILL));
    if !has_skill {
        if let Some(skill) = maybe_load_skill(cwd) {
            msgs.insert(
                0,
                Message::system_named(NAME_SKILL, format!("Project SKILL.md:\n\n{skill}")),
            );
        }
    }
    if let Some(rules) = rules_text {
        if !rules.trim().is_empty() {
            msgs.insert(
                0,
                Message::system_named(NAME_RULES, format!("Rules:\n\n{}", rules.trim())),
            );
        }
    }
    if let Some(agent) = agent_prompt {
        if !agent.trim().is_empty() {
            msgs.insert(0, Message::system_named(NAME_AGENT, agent.trim()));
        }
    }

    // Summarize old history into a single summary-named system message.
    if msgs.len() >= policy.summarize_when_over {
        let split = msgs.len().saturating_sub(policy.max_messages);
        let tail = msgs[split..].to_vec();
        let head: Vec<Message> = msgs[..split]
            .iter()
            .filter(|m| !is_named_system(m, NAME_SUMMARY))
            .cloned()
            .collect();

        if head.len() >= 8 {
            let text = summarize(provider, &head, include_reasoning, force_reasoning).await;
            let summary = Message::system_named(NAME_SUMMARY, text);
            new_summary = Some(summary.clone());
            msgs = tail;
            msgs.insert(0, summary);
        }
    }

    // Hard cap: keep every system message, truncate the rest to the tail.
    // Skipped right after summarization — that path already reduced the
    // conversation to summary + recent window, and trimming further would
    // drop messages the summary does not cover.
    if new_summary.is_none() && msgs.len() > policy.max_messages {
        let system: Vec<Message> = msgs.iter().filter(|m| m.role == Role::System).cloned().collect();
        let other: Vec<Message> = msgs.into_iter().filter(|m| m.role != Role::System).collect();
        let keep = policy.max_messages.saturating_sub(system.len());
        let other = other[other.len().saturating_sub(keep)..].to_vec();
        msgs = system;
        msgs.extend(other);
    }

    // Per-message safety truncation.
    for m in &mut msgs {
        let mut limit = policy.max_message_chars;
        if m.role == Role::Tool {
            limit = limit.min(policy.max_tool_result_chars);
        }
        if let Some(content) = m.content.take() {
            m.content = Some(if content.len() > limit {
                truncate_middle(&content, limit)
            } else {
                content
            });
        }
    }

    PromptBuildResult {
        messages: wire::messages_to_wire(&msgs, include_reasoning, force_reasoning),
        new_summary,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ocode_model::{AssistantTurn, ChatRequest, TokenSink};

    struct CannedSummarizer(&'static str);

    #[async_trait]
    impl ChatTransport for CannedSummarizer {
        fn model(&self) -> &str {
            "canned"
        }
        async fn chat(
            &self,
            _req: ChatRequest,
            _on_token: Option<TokenSink>,
        ) -> anyhow::Result<AssistantTurn> {
            Ok(AssistantTurn {
                text: self.0.to_string(),
                ..Default::default()
            })
        }
    }

    fn policy() -> CompactionPolicy {
        CompactionPolicy::default()
    }

    fn chat(n: usize) -> Vec<Message> {
        let mut out = vec![Message::system("base")];
        for i in 0..n {
            out.push(Message::user(format!("u{i}")));
            out.push(Message::assistant(format!("a{i}")));
        }
        out
    }

    #[tokio::test]
    async fn injections_are_ordered_agent_rules_skill() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("SKILL.md"), "build with cargo").unwrap();
        let msgs = vec![Message::system("base"), Message::user("hi")];
        let res = build_prompt_messages(
            dir.path(),
            &msgs,
            &CannedSummarizer(""),
            &policy(),
            false,
            false,
            Some("rule text"),
            Some("agent text"),
        )
        .await;
        assert_eq!(res.messages[0]["name"], "agent");
        assert_eq!(res.messages[1]["name"], "rules");
        assert_eq!(res.messages[2]["name"], "skill");
        assert_eq!(res.messages[3]["content"], "base");
    }

    #[tokio::test]
    async fn skill_not_reinjected_when_already_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("SKILL.md"), "skill body").unwrap();
        let msgs = vec![
            Message::system_named(NAME_SKILL, "persisted skill"),
            Message::user("hi"),
        ];
        let res = build_prompt_messages(
            dir.path(),
            &msgs,
            &CannedSummarizer(""),
            &policy(),
            false,
            false,
            None,
            None,
        )
        .await;
        let skill_count = res
            .messages
            .iter()
            .filter(|m| m["name"] == "skill")
            .count();
        assert_eq!(skill_count, 1);
    }

    #[tokio::test]
    async fn no_injection_when_sources_absent() {
        let dir = tempfile::tempdir().unwrap();
        let msgs = vec![Message::system("base"), Message::user("hi")];
        let res = build_prompt_messages(
            dir.path(),
            &msgs,
            &CannedSummarizer(""),
            &policy(),
            false,
            false,
            None,
            None,
        )
        .await;
        assert_eq!(res.messages.len(), 2);
    }

    #[tokio::test]
    async fn long_conversation_gets_summarized() {
        let dir = tempfile::tempdir().unwrap();
        let msgs = chat(40); // 81 messages >= 60
        let res = build_prompt_messages(
            dir.path(),
            &msgs,
            &CannedSummarizer("SUMMARY TEXT"),
            &policy(),
            false,
            false,
            None,
            None,
        )
        .await;
        let summary = res.new_summary.expect("summary produced");
        assert_eq!(summary.name.as_deref(), Some("summary"));
        assert_eq!(summary.content.as_deref(), Some("SUMMARY TEXT"));
        assert_eq!(res.messages[0]["name"], "summary");
        // summary + the last max_messages window
        assert_eq!(res.messages.len(), policy().max_messages + 1);
    }

    #[tokio::test]
    async fn compaction_preserves_recent_tail_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let msgs = chat(40);
        let tail_expect: Vec<String> = msgs[msgs.len() - policy().max_messages..]
            .iter()
            .map(|m| m.content.clone().unwrap())
            .collect();
        let res = build_prompt_messages(
            dir.path(),
            &msgs,
            &CannedSummarizer("s"),
            &policy(),
            false,
            false,
            None,
            None,
        )
        .await;
        let got: Vec<String> = res.messages[1..]
            .iter()
            .map(|m| m["content"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(got, tail_expect);
    }

    #[tokio::test]
    async fn hard_cap_keeps_system_messages() {
        let dir = tempfile::tempdir().unwrap();
        // 55 messages: over max_messages (45) but under summarize_when_over (60)
        let msgs = chat(27);
        assert_eq!(msgs.len(), 55);
        let res = build_prompt_messages(
            dir.path(),
            &msgs,
            &CannedSummarizer(""),
            &policy(),
            false,
            false,
            None,
            None,
        )
        .await;
        assert!(res.new_summary.is_none());
        assert_eq!(res.messages.len(), policy().max_messages);
        assert_eq!(res.messages[0]["role"], "system");
        // most recent message survives
        assert_eq!(
            res.messages.last().unwrap()["content"],
            "a26"
        );
    }

    #[tokio::test]
    async fn tool_results_get_the_tighter_cap() {
        let dir = tempfile::tempdir().unwrap();
        let small = CompactionPolicy {
            max_tool_result_chars: 50,
            max_message_chars: 1000,
            ..policy()
        };
        let msgs = vec![
            Message::system("s"),
            Message::assistant_tool_calls(vec![ocode_model::ToolCallRequest {
                id: "t1".into(),
                name: "read".into(),
                arguments: serde_json::json!({}),
            }]),
            Message::tool_result("t1", "y".repeat(500)),
        ];
        let res = build_prompt_messages(
            dir.path(),
            &msgs,
            &CannedSummarizer(""),
            &small,
            false,
            false,
            None,
            None,
        )
        .await;
        let tool_content = res.messages[2]["content"].as_str().unwrap();
        assert!(tool_content.contains("... (truncated) ..."));
        assert!(tool_content.len() < 200);
    }

    #[test]
    fn truncate_middle_keeps_head_and_tail() {
        let text = format!("{}{}", "A".repeat(100), "Z".repeat(100));
        let out = truncate_middle(&text, 40);
        assert!(out.starts_with("AAAA"));
        assert!(out.ends_with("ZZZZ"));
        assert!(out.contains("... (truncated) ..."));
    }

    #[test]
    fn truncate_middle_noop_under_limit() {
        assert_eq!(truncate_middle("short", 100), "short");
    }
}
