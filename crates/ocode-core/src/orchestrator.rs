// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The turn orchestrator: the loop that binds session, prompt builder,
//! LLM adapter, permission gate, and tool registry into one agent turn.
//!
//! Step machine:
//! `SanitizeLoaded → (ResumePending?) → AppendUser? → BuildPrompt → CallLLM
//! → PersistAssistant → (FinalOrTools) → ExecuteTools → BuildPrompt …`
//! Terminal states: final assistant text, max-steps notice, fatal protocol
//! violation. Whatever the exit, the session on disk satisfies the message
//! invariants: every append is validated before it happens, and a loaded
//! session is repaired (orphan tool messages dropped) before any new write.

use std::collections::HashSet;
use std::io::Write as _;
use std::time::{Duration, Instant};

use anyhow::bail;
use ocode_model::{wire, AssistantTurn, ChatRequest, Message, ReasoningMode, Role, ToolCallRequest};
use ocode_tools::{ToolContext, ToolResult};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::compact::{build_prompt_messages, truncate_middle};
use crate::context::AppContext;

/// Base system prompt persisted as the first message of a fresh session.
pub const SYSTEM_PROMPT: &str = "You are ocode, a local coding agent.\n\
Rules:\n\
- Use the provided tools to inspect files and run commands when needed.\n\
- Prefer: list/glob/grep/read before editing files.\n\
- When editing files, use deterministic line-range edits (edit/multiedit) or patch.\n\
- Do not fabricate file contents or command outputs: use tools.\n\
- Keep tool arguments minimal and correct.";

/// REPL sentinel: resume pending tool calls without a new user message.
pub const CONTINUE_SENTINEL: &str = "/continue";

/// Model identifiers containing this marker need their reasoning text
/// echoed back on subsequent requests (when not pinned via provider config).
const REASONING_MODEL_MARKER: &str = "deepseek-reasoner";

const LLM_ATTEMPTS: u32 = 3;

fn reasoning_flags(model: &str, mode: ReasoningMode) -> (bool, bool) {
    match mode {
        ReasoningMode::Always => (true, true),
        ReasoningMode::Never => (false, false),
        ReasoningMode::Auto => {
            let hit = model.contains(REASONING_MODEL_MARKER);
            (hit, hit)
        }
    }
}

/// 1st / 2nd / 3rd / 4th … used in trace output.
fn ordinal(n: u32) -> String {
    let suffix = match (n % 100, n % 10) {
        (11..=13, _) => "th",
        (_, 1) => "st",
        (_, 2) => "nd",
        (_, 3) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

fn args_preview(args: &Value) -> String {
    let s = serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string());
    if s.len() > 2000 {
        let mut cut = 2000;
        while cut > 0 && !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}\n... (truncated)", &s[..cut])
    } else {
        s
    }
}

fn prompt_char_count(messages: &[Value]) -> usize {
    let mut total = 0;
    for m in messages {
        if let Some(c) = m["content"].as_str() {
            total += c.len();
        }
        if let Some(r) = m["reasoning_content"].as_str() {
            total += r.len();
        }
        if let Some(tc) = m.get("tool_calls") {
            total += tc.to_string().len();
        }
    }
    total
}

// ─── SanitizeLoaded ──────────────────────────────────────────────────────────

/// Drop tool-role messages that are orphaned (no preceding assistant whose
/// open tool calls cover their id) or lack a tool-call id. Idempotent.
pub fn sanitize_messages(messages: &[Message]) -> (Vec<Message>, usize) {
    let mut retained: Vec<Message> = Vec::with_capacity(messages.len());
    let mut open_calls: HashSet<String> = HashSet::new();
    let mut dropped = 0;
    for m in messages {
        match m.role {
            Role::Tool => {
                let valid = m
                    .tool_call_id
                    .as_deref()
                    .is_some_and(|id| !id.is_empty() && open_calls.remove(id));
                if valid {
                    retained.push(m.clone());
                } else {
                    dropped += 1;
                }
            }
            Role::Assistant => {
                open_calls = m
                    .tool_calls
                    .as_ref()
                    .map(|calls| calls.iter().map(|c| c.id.clone()).collect())
                    .unwrap_or_default();
                retained.push(m.clone());
            }
            _ => {
                open_calls.clear();
                retained.push(m.clone());
            }
        }
    }
    (retained, dropped)
}

fn sanitize_loaded(ctx: &mut AppContext) -> anyhow::Result<()> {
    let (retained, dropped) = sanitize_messages(&ctx.session.messages);
    if dropped > 0 {
        warn!(dropped, session = %ctx.session.session_id, "dropped invalid tool messages on load");
        ctx.session.rewrite(retained)?;
        ctx.events
            .append("session.cleaned_invalid_tool_messages", json!({"dropped": dropped}));
    }
    Ok(())
}

// ─── ResumePending ───────────────────────────────────────────────────────────

async fn resume_pending(ctx: &mut AppContext) -> anyhow::Result<()> {
    // Scan backward: a user message means nothing is pending; the nearest
    // assistant with tool calls is the resume candidate.
    let mut candidate = None;
    for (i, m) in ctx.session.messages.iter().enumerate().rev() {
        match m.role {
            Role::User => return Ok(()),
            Role::Assistant if m.has_tool_calls() => {
                candidate = Some(i);
                break;
            }
            _ => continue,
        }
    }
    let Some(idx) = candidate else { return Ok(()) };

    // Resume is only safe when nothing but tool replies followed the
    // assistant; anything else means the conversation has moved on.
    let after = &ctx.session.messages[idx + 1..];
    if after.iter().any(|m| m.role != Role::Tool) {
        ctx.events.append(
            "resume.aborted_non_tool_after_assistant",
            json!({"assistant_index": idx}),
        );
        return Ok(());
    }

    let answered: HashSet<String> = after
        .iter()
        .filter_map(|m| m.tool_call_id.clone())
        .collect();
    let pending: Vec<ToolCallRequest> = ctx.session.messages[idx]
        .tool_calls
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|c| !answered.contains(&c.id))
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    ctx.events.append(
        "resume.pending_tools",
        json!({"count": pending.len(), "ids": pending.iter().map(|c| c.id.clone()).collect::<Vec<_>>()}),
    );
    for call in pending {
        let reply = execute_tool_call(ctx, &call).await;
        append_tool_reply(ctx, &call.id, reply.content.clone())?;
        ctx.events.append(
            "resume.tool_result",
            json!({"tool": call.name, "id": call.id, "is_error": reply.is_error}),
        );
    }
    Ok(())
}

// ─── ExecuteTools ────────────────────────────────────────────────────────────

/// Resolve, permission-check, and run one tool call. Missing tools, denials,
/// and tool failures all produce a reply so the protocol stays satisfied.
async fn execute_tool_call(ctx: &AppContext, call: &ToolCallRequest) -> ToolResult {
    let Some(tool) = ctx.tools.get(&call.name) else {
        ctx.events
            .append("tool.missing", json!({"tool": call.name, "id": call.id}));
        return ToolResult::ok(format!("Tool {} not found.", call.name));
    };

    let preview = args_preview(&call.arguments);
    if !ctx
        .permissions
        .check(tool.permission_class(), &call.name, &preview)
    {
        ctx.events
            .append("tool.denied", json!({"tool": call.name, "id": call.id}));
        return ToolResult::ok(format!(
            "Tool {} was denied by user permissions.",
            call.name
        ));
    }

    ctx.events.append(
        "tool.call",
        json!({"tool": call.name, "id": call.id, "args": call.arguments}),
    );
    if ctx.trace {
        info!(tool = %call.name, id = %call.id, "executing tool");
    }

    let tool_ctx = ToolContext {
        cwd: ctx.cwd.clone(),
        session_id: Some(ctx.session.session_id.clone()),
        data_root: ctx.data_root.clone(),
    };
    let args = call.arguments.clone();
    let name = call.name.clone();
    let started = Instant::now();
    // Spawned so a panicking tool becomes an error reply instead of
    // unwinding through the turn.
    let result = match tokio::spawn(async move { tool.execute(&tool_ctx, &args).await }).await {
        Ok(res) => res,
        Err(e) => ToolResult::err(format!("Tool {name} exception: {e}")),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let mut result = result;
    let cap = ctx.policy.max_tool_result_chars;
    if result.content.len() > cap {
        result.content = truncate_middle(&result.content, cap);
    }
    ctx.events.append(
        "tool.result",
        json!({
            "tool": call.name,
            "id": call.id,
            "is_error": result.is_error,
            "chars": result.content.len(),
            "elapsed_ms": elapsed_ms,
        }),
    );
    result
}

/// Execute one recorded tool call outside the turn loop. Replay shares the
/// live path so permissions and events behave identically.
pub async fn execute_recorded_call(ctx: &AppContext, call: &ToolCallRequest) -> ToolResult {
    execute_tool_call(ctx, call).await
}

/// Append a tool reply after asserting it answers an open call of the
/// nearest assistant. A failure here is a bug in the orchestrator, never
/// swallowed.
fn append_tool_reply(ctx: &mut AppContext, call_id: &str, content: String) -> anyhow::Result<()> {
    let mut found = false;
    for m in ctx.session.messages.iter().rev() {
        match m.role {
            Role::Tool => continue,
            Role::Assistant if m.has_tool_calls() => {
                found = m
                    .tool_calls
                    .as_ref()
                    .is_some_and(|calls| calls.iter().any(|c| c.id == call_id));
                break;
            }
            _ => break,
        }
    }
    if !found {
        bail!(
            "protocol violation: tool reply {call_id} has no open assistant tool call; \
             refusing to corrupt the session"
        );
    }
    ctx.session.append(Message::tool_result(call_id, content))
}

// ─── CallLLM ─────────────────────────────────────────────────────────────────

fn is_fatal_http(err: &anyhow::Error) -> bool {
    // The adapter formats HTTP failures as "provider error <status>: ...".
    err.to_string().contains("provider error 4")
}

async fn call_llm_with_retry(
    ctx: &AppContext,
    messages: Vec<Value>,
    tools: Vec<Value>,
) -> anyhow::Result<AssistantTurn> {
    let mut last_err = None;
    for attempt in 0..LLM_ATTEMPTS {
        let on_token = if ctx.stream {
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
            tokio::spawn(async move {
                while let Some(tok) = rx.recv().await {
                    print!("{tok}");
                    let _ = std::io::stdout().flush();
                }
            });
            Some(tx)
        } else {
            None
        };
        let req = ChatRequest {
            messages: messages.clone(),
            tools: tools.clone(),
            stream: ctx.stream,
        };
        match ctx.provider.chat(req, on_token).await {
            Ok(turn) => return Ok(turn),
            Err(e) => {
                ctx.events
                    .append("llm.error", json!({"attempt": attempt, "error": e.to_string()}));
                let fatal = is_fatal_http(&e);
                last_err = Some(e);
                if fatal || attempt + 1 == LLM_ATTEMPTS {
                    break;
                }
                let backoff = Duration::from_secs_f64(0.5 * f64::powi(2.0, attempt as i32));
                tokio::time::sleep(backoff).await;
            }
        }
    }
    Err(last_err.expect("at least one attempt"))
}

// ─── Turn loop ───────────────────────────────────────────────────────────────

fn synthesize_id(session_id: &str, step: u32, index: usize) -> String {
    let rand = &Uuid::new_v4().simple().to_string()[..8];
    format!("tc_{session_id}_{step}_{index}_{rand}")
}

fn last_assistant_text(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .find_map(|m| m.content.clone().filter(|c| !c.trim().is_empty()))
}

/// Run one agent turn: optional resume of pending tool calls, optional user
/// prompt, then the model ↔ tool loop until a final text or the step budget
/// runs out. Returns the assistant's final text or a diagnostic string; the
/// persisted session satisfies the message invariants on every return path.
pub async fn run_turn(
    ctx: &mut AppContext,
    user_prompt: Option<&str>,
    max_steps: u32,
    resume: bool,
) -> anyhow::Result<String> {
    sanitize_loaded(ctx)?;
    if resume {
        resume_pending(ctx).await?;
    }

    if ctx.session.messages.is_empty() {
        ctx.session.append(Message::system(SYSTEM_PROMPT))?;
    }
    let prompt = user_prompt.filter(|p| p.trim() != CONTINUE_SENTINEL);
    if let Some(p) = prompt {
        ctx.session.append(Message::user(p))?;
    }

    let (include_reasoning, force_reasoning) =
        reasoning_flags(ctx.provider.model(), ctx.reasoning);
    let tools_wire: Vec<Value> = ctx
        .tools
        .schemas()
        .iter()
        .map(|s| wire::tool_schema_to_wire(&s.name, &s.description, &s.parameters))
        .collect();

    for step in 1..=max_steps {
        let provider = ctx.provider.clone();
        let built = build_prompt_messages(
            &ctx.cwd,
            &ctx.session.messages,
            provider.as_ref(),
            &ctx.policy,
            include_reasoning,
            force_reasoning,
            Some(&ctx.rules_text),
            Some(&ctx.agent.system_prompt),
        )
        .await;
        if let Some(summary) = built.new_summary {
            ctx.session.append(summary)?;
        }

        if ctx.trace {
            info!(
                step,
                messages = built.messages.len(),
                "{} model call",
                ordinal(step)
            );
        }
        ctx.events.append(
            "llm.request",
            json!({
                "step": step,
                "message_count": built.messages.len(),
                "prompt_chars": prompt_char_count(&built.messages),
            }),
        );

        let started = Instant::now();
        let turn = match call_llm_with_retry(ctx, built.messages, tools_wire.clone()).await {
            Ok(t) => t,
            Err(e) => {
                let text = format!("[error] LLM request failed: {e}");
                ctx.session.append(Message::assistant(text.clone()))?;
                return Ok(text);
            }
        };
        ctx.events.append(
            "llm.response",
            json!({
                "chars": turn.text.len(),
                "tool_calls": turn.tool_calls.len(),
                "elapsed_ms": started.elapsed().as_millis() as u64,
            }),
        );

        if turn.tool_calls.is_empty() {
            let mut msg = Message::assistant(turn.text.clone());
            if include_reasoning || force_reasoning {
                msg.reasoning_content = turn.reasoning_content.clone();
            }
            ctx.session.append(msg)?;
            if turn.text.trim().is_empty() {
                // Reasoning-only turn: nothing to return yet, ask again.
                ctx.events.append("llm.empty_response", json!({"step": step}));
                continue;
            }
            return Ok(turn.text);
        }

        // PersistAssistant: tool calls present. Missing ids are synthesized
        // so the tool replies always have a join key.
        let mut calls = turn.tool_calls.clone();
        for (i, c) in calls.iter_mut().enumerate() {
            if c.id.is_empty() {
                c.id = synthesize_id(&ctx.session.session_id, step, i);
            }
        }
        let mut amsg = Message::assistant_tool_calls(calls.clone());
        if include_reasoning || force_reasoning {
            amsg.reasoning_content = turn.reasoning_content.clone();
        }
        ctx.session.append(amsg)?;

        // ExecuteTools: sequentially, in the order given by the model.
        for call in &calls {
            let reply = execute_tool_call(ctx, call).await;
            append_tool_reply(ctx, &call.id, reply.content)?;
        }
    }

    Ok(last_assistant_text(&ctx.session.messages)
        .unwrap_or_else(|| "(reached max steps)".to_string()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use ocode_config::Decision;
    use ocode_model::{ChatTransport, TokenSink};
    use ocode_session::{EventLog, SessionStore};
    use ocode_tools::builtin::register_builtin_tools;
    use ocode_tools::{
        ApprovalPrompt, PermissionClass, PermissionConfig, PermissionGate, ToolRegistry,
    };
    use serde_json::json;

    use super::*;
    use crate::compact::CompactionPolicy;
    use crate::context::AppContext;

    // ── Fixtures ─────────────────────────────────────────────────────────────

    /// Scripted transport: pops one pre-programmed outcome per call.
    struct ScriptedModel {
        script: Mutex<VecDeque<anyhow::Result<AssistantTurn>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedModel {
        fn new(script: Vec<anyhow::Result<AssistantTurn>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedModel {
        fn model(&self) -> &str {
            "scripted-model"
        }
        async fn chat(
            &self,
            _req: ChatRequest,
            _on_token: Option<TokenSink>,
        ) -> anyhow::Result<AssistantTurn> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(AssistantTurn::default()))
        }
    }

    fn text_turn(text: &str) -> anyhow::Result<AssistantTurn> {
        Ok(AssistantTurn {
            text: text.to_string(),
            ..Default::default()
        })
    }

    fn tool_turn(calls: Vec<(&str, &str, Value)>) -> anyhow::Result<AssistantTurn> {
        Ok(AssistantTurn {
            tool_calls: calls
                .into_iter()
                .map(|(id, name, arguments)| ToolCallRequest {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments,
                })
                .collect(),
            ..Default::default()
        })
    }

    struct NeverPrompt;
    impl ApprovalPrompt for NeverPrompt {
        fn confirm(&self, _: &str, _: &str) -> bool {
            panic!("interactive prompt reached in a test");
        }
    }

    fn make_ctx(dir: &Path, model: Arc<ScriptedModel>) -> AppContext {
        let cwd = dir.join("project");
        std::fs::create_dir_all(&cwd).unwrap();
        let data_root = dir.join("data");
        std::fs::create_dir_all(&data_root).unwrap();
        let mut tools = ToolRegistry::new();
        register_builtin_tools(&mut tools);
        let session = SessionStore::open(&data_root, Some("test-session")).unwrap();
        let events = EventLog::open(&data_root, "test-session");
        AppContext {
            cwd,
            provider: model,
            tools,
            permissions: PermissionGate::with_prompt(
                PermissionConfig::default(),
                true,
                Box::new(NeverPrompt),
            ),
            session,
            events,
            agent: crate::agents::AgentRegistry::from_defaults(None).get("general"),
            rules_text: String::new(),
            policy: CompactionPolicy::default(),
            reasoning: ReasoningMode::Never,
            data_root,
            trace: false,
            stream: false,
            behavior: Default::default(),
            mcp_clients: Vec::new(),
        }
    }

    /// The §3 message invariants, checked against the in-memory session.
    fn check_invariants(messages: &[Message]) {
        let mut open: HashSet<String> = HashSet::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        assert_eq!(messages[0].role, Role::System, "first message is system");
        for m in messages {
            match m.role {
                Role::Tool => {
                    let id = m.tool_call_id.as_deref().expect("tool msg has id");
                    assert!(!id.is_empty(), "tool_call_id non-empty");
                    assert!(open.remove(id), "tool reply {id} answers an open call");
                }
                Role::Assistant => {
                    open.clear();
                    if let Some(calls) = &m.tool_calls {
                        if !calls.is_empty() {
                            assert!(
                                m.content.as_deref().unwrap_or("").is_empty(),
                                "assistant with tool calls has empty content"
                            );
                        }
                        for c in calls {
                            assert!(seen_ids.insert(c.id.clone()), "duplicate id {}", c.id);
                            open.insert(c.id.clone());
                        }
                    }
                }
                _ => open.clear(),
            }
        }
    }

    fn event_types(ctx: &AppContext) -> Vec<String> {
        ctx.events.read_all().into_iter().map(|e| e.event_type).collect()
    }

    // ── Final text, no tools ─────────────────────────────────────────────────

    #[tokio::test]
    async fn plain_answer_is_returned_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![text_turn("the answer")]);
        let mut ctx = make_ctx(dir.path(), model);
        let out = run_turn(&mut ctx, Some("question"), 10, false).await.unwrap();
        assert_eq!(out, "the answer");
        let roles: Vec<Role> = ctx.session.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        check_invariants(&ctx.session.messages);
    }

    // ── Write/read round trip ────────────────────────────────────────────────

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![
            tool_turn(vec![(
                "t1",
                "write",
                json!({"path": "a.txt", "content": "hello\nworld\n"}),
            )]),
            tool_turn(vec![("t2", "read", json!({"path": "a.txt"}))]),
            text_turn("done"),
        ]);
        let mut ctx = make_ctx(dir.path(), model);
        let out = run_turn(
            &mut ctx,
            Some("create a.txt containing hello\\nworld\\n and read it back."),
            10,
            false,
        )
        .await
        .unwrap();
        assert_eq!(out, "done");
        assert_eq!(
            std::fs::read_to_string(ctx.cwd.join("a.txt")).unwrap(),
            "hello\nworld\n"
        );
        // the read reply carries the exact file content
        let read_reply = ctx
            .session
            .messages
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some("t2"))
            .unwrap();
        assert_eq!(read_reply.content.as_deref(), Some("hello\nworld"));
        check_invariants(&ctx.session.messages);
    }

    // ── Denied bash ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn denied_bash_gets_a_denial_reply_and_the_turn_continues() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![
            tool_turn(vec![("t1", "bash", json!({"command": "rm -rf /"}))]),
            text_turn("understood"),
        ]);
        let mut ctx = make_ctx(dir.path(), model.clone());
        ctx.permissions = PermissionGate::with_prompt(
            {
                let mut cfg = PermissionConfig::default();
                cfg.set_default(PermissionClass::Bash, Decision::Deny);
                cfg
            },
            true,
            Box::new(NeverPrompt),
        );
        let out = run_turn(&mut ctx, Some("clean up"), 10, false).await.unwrap();
        assert_eq!(out, "understood");
        let reply = ctx
            .session
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(
            reply.content.as_deref(),
            Some("Tool bash was denied by user permissions.")
        );
        assert!(event_types(&ctx).contains(&"tool.denied".to_string()));
        check_invariants(&ctx.session.messages);
    }

    // ── Missing tool ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn hallucinated_tool_name_gets_not_found_reply() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![
            tool_turn(vec![("t1", "quantum_sort", json!({}))]),
            text_turn("ok"),
        ]);
        let mut ctx = make_ctx(dir.path(), model);
        run_turn(&mut ctx, Some("sort it"), 10, false).await.unwrap();
        let reply = ctx
            .session
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(reply.content.as_deref(), Some("Tool quantum_sort not found."));
        assert!(event_types(&ctx).contains(&"tool.missing".to_string()));
        check_invariants(&ctx.session.messages);
    }

    // ── Synthetic ids ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn missing_tool_call_ids_are_synthesized() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![
            tool_turn(vec![("", "list", json!({}))]),
            text_turn("ok"),
        ]);
        let mut ctx = make_ctx(dir.path(), model);
        run_turn(&mut ctx, Some("list"), 10, false).await.unwrap();
        let assistant = ctx
            .session
            .messages
            .iter()
            .find(|m| m.has_tool_calls())
            .unwrap();
        let id = &assistant.tool_calls.as_ref().unwrap()[0].id;
        assert!(id.starts_with("tc_test-session_1_0_"), "{id}");
        check_invariants(&ctx.session.messages);
    }

    // ── Empty response loop ──────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_reply_loops_and_emits_event() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![text_turn(""), text_turn("finally")]);
        let mut ctx = make_ctx(dir.path(), model.clone());
        let out = run_turn(&mut ctx, Some("hi"), 10, false).await.unwrap();
        assert_eq!(out, "finally");
        assert_eq!(model.call_count(), 2);
        assert!(event_types(&ctx).contains(&"llm.empty_response".to_string()));
    }

    // ── Retry and failure surfacing ──────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![
            Err(anyhow::anyhow!("connection reset")),
            Err(anyhow::anyhow!("connection reset")),
            text_turn("recovered"),
        ]);
        let mut ctx = make_ctx(dir.path(), model.clone());
        let out = run_turn(&mut ctx, Some("hi"), 10, false).await.unwrap();
        assert_eq!(out, "recovered");
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_becomes_assistant_error_message() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![
            Err(anyhow::anyhow!("boom")),
            Err(anyhow::anyhow!("boom")),
            Err(anyhow::anyhow!("boom")),
        ]);
        let mut ctx = make_ctx(dir.path(), model.clone());
        let out = run_turn(&mut ctx, Some("hi"), 10, false).await.unwrap();
        assert!(out.starts_with("[error] LLM request failed"), "{out}");
        assert_eq!(model.call_count(), 3);
        let last = ctx.session.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.content.as_deref().unwrap().starts_with("[error]"));
        check_invariants(&ctx.session.messages);
    }

    #[tokio::test]
    async fn http_4xx_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![
            Err(anyhow::anyhow!("provider error 401 Unauthorized: bad key")),
            text_turn("never reached"),
        ]);
        let mut ctx = make_ctx(dir.path(), model.clone());
        let out = run_turn(&mut ctx, Some("hi"), 10, false).await.unwrap();
        assert!(out.starts_with("[error]"), "{out}");
        assert_eq!(model.call_count(), 1);
    }

    // ── Max steps ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn step_budget_exhaustion_returns_notice() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![
            tool_turn(vec![("t1", "list", json!({}))]),
            tool_turn(vec![("t2", "list", json!({}))]),
            tool_turn(vec![("t3", "list", json!({}))]),
        ]);
        let mut ctx = make_ctx(dir.path(), model.clone());
        let out = run_turn(&mut ctx, Some("loop forever"), 2, false).await.unwrap();
        assert_eq!(out, "(reached max steps)");
        assert_eq!(model.call_count(), 2);
        check_invariants(&ctx.session.messages);
    }

    // ── Resume ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn pending_tool_call_is_resumed_before_llm() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![text_turn("resumed fine")]);
        let mut ctx = make_ctx(dir.path(), model);
        std::fs::write(ctx.cwd.join("a.txt"), "persisted content\n").unwrap();
        ctx.session.append(Message::system(SYSTEM_PROMPT)).unwrap();
        ctx.session.append(Message::user("do X")).unwrap();
        ctx.session
            .append(Message::assistant_tool_calls(vec![ToolCallRequest {
                id: "t1".into(),
                name: "read".into(),
                arguments: json!({"path": "a.txt"}),
            }]))
            .unwrap();

        let out = run_turn(&mut ctx, None, 10, true).await.unwrap();
        assert_eq!(out, "resumed fine");
        // the resumed reply sits right after the assistant
        let reply = &ctx.session.messages[3];
        assert_eq!(reply.role, Role::Tool);
        assert_eq!(reply.tool_call_id.as_deref(), Some("t1"));
        assert_eq!(reply.content.as_deref(), Some("persisted content"));
        let types = event_types(&ctx);
        assert!(types.contains(&"resume.pending_tools".to_string()));
        assert!(types.contains(&"resume.tool_result".to_string()));
        check_invariants(&ctx.session.messages);
    }

    #[tokio::test]
    async fn resume_skips_already_answered_calls() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![text_turn("ok")]);
        let mut ctx = make_ctx(dir.path(), model);
        std::fs::write(ctx.cwd.join("a.txt"), "x").unwrap();
        ctx.session.append(Message::system(SYSTEM_PROMPT)).unwrap();
        ctx.session.append(Message::user("go")).unwrap();
        ctx.session
            .append(Message::assistant_tool_calls(vec![
                ToolCallRequest {
                    id: "t1".into(),
                    name: "read".into(),
                    arguments: json!({"path": "a.txt"}),
                },
                ToolCallRequest {
                    id: "t2".into(),
                    name: "list".into(),
                    arguments: json!({}),
                },
            ]))
            .unwrap();
        ctx.session
            .append(Message::tool_result("t1", "already answered"))
            .unwrap();

        run_turn(&mut ctx, None, 10, true).await.unwrap();
        let t1_replies = ctx
            .session
            .messages
            .iter()
            .filter(|m| m.tool_call_id.as_deref() == Some("t1"))
            .count();
        assert_eq!(t1_replies, 1, "answered call is not re-executed");
        assert!(ctx
            .session
            .messages
            .iter()
            .any(|m| m.tool_call_id.as_deref() == Some("t2")));
        check_invariants(&ctx.session.messages);
    }

    #[tokio::test]
    async fn resume_aborts_when_non_tool_follows_assistant() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![text_turn("ok")]);
        let mut ctx = make_ctx(dir.path(), model);
        ctx.session.append(Message::system(SYSTEM_PROMPT)).unwrap();
        ctx.session
            .append(Message::assistant_tool_calls(vec![ToolCallRequest {
                id: "t1".into(),
                name: "list".into(),
                arguments: json!({}),
            }]))
            .unwrap();
        ctx.session
            .append(Message::system_named("summary", "a summary"))
            .unwrap();
        let before = ctx.session.messages.len();

        run_turn(&mut ctx, Some("next"), 10, true).await.unwrap();
        let types = event_types(&ctx);
        assert!(types.contains(&"resume.aborted_non_tool_after_assistant".to_string()));
        // resume safety: no messages were appended during the resume phase
        assert_eq!(ctx.session.messages[before - 1].name.as_deref(), Some("summary"));
        assert!(!ctx
            .session
            .messages
            .iter()
            .any(|m| m.tool_call_id.as_deref() == Some("t1")));
    }

    #[tokio::test]
    async fn no_resume_after_user_message() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![text_turn("ok")]);
        let mut ctx = make_ctx(dir.path(), model);
        ctx.session.append(Message::system(SYSTEM_PROMPT)).unwrap();
        ctx.session.append(Message::user("fresh prompt")).unwrap();
        run_turn(&mut ctx, None, 10, true).await.unwrap();
        assert!(!event_types(&ctx).contains(&"resume.pending_tools".to_string()));
    }

    // ── Sanitize ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn orphan_tool_message_is_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![text_turn("ok")]);
        let mut ctx = make_ctx(dir.path(), model);
        ctx.session.append(Message::system(SYSTEM_PROMPT)).unwrap();
        ctx.session.append(Message::assistant("hi")).unwrap();
        ctx.session
            .append(Message::tool_result("x", "orphan"))
            .unwrap();

        run_turn(&mut ctx, Some("next"), 10, false).await.unwrap();
        assert!(!ctx
            .session
            .messages
            .iter()
            .any(|m| m.content.as_deref() == Some("orphan")));
        assert!(event_types(&ctx)
            .contains(&"session.cleaned_invalid_tool_messages".to_string()));
        check_invariants(&ctx.session.messages);

        // the repair reached the disk too
        let reloaded = SessionStore::open(&ctx.data_root, Some("test-session")).unwrap();
        assert!(!reloaded
            .messages
            .iter()
            .any(|m| m.content.as_deref() == Some("orphan")));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let msgs = vec![
            Message::system("s"),
            Message::assistant("hi"),
            Message::tool_result("x", "orphan"),
            Message::assistant_tool_calls(vec![ToolCallRequest {
                id: "t1".into(),
                name: "read".into(),
                arguments: json!({}),
            }]),
            Message::tool_result("t1", "fine"),
            Message::tool_result("", "no id"),
        ];
        let (once, dropped) = sanitize_messages(&msgs);
        assert_eq!(dropped, 2);
        let (twice, dropped_again) = sanitize_messages(&once);
        assert_eq!(dropped_again, 0);
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn sanitize_drops_duplicate_replies_to_one_call() {
        let msgs = vec![
            Message::system("s"),
            Message::assistant_tool_calls(vec![ToolCallRequest {
                id: "t1".into(),
                name: "read".into(),
                arguments: json!({}),
            }]),
            Message::tool_result("t1", "first"),
            Message::tool_result("t1", "duplicate"),
        ];
        let (kept, dropped) = sanitize_messages(&msgs);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 3);
    }

    // ── /continue sentinel ───────────────────────────────────────────────────

    #[tokio::test]
    async fn continue_sentinel_appends_no_user_message() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![text_turn("went on")]);
        let mut ctx = make_ctx(dir.path(), model);
        ctx.session.append(Message::system(SYSTEM_PROMPT)).unwrap();
        ctx.session.append(Message::user("original ask")).unwrap();
        run_turn(&mut ctx, Some("/continue"), 10, true).await.unwrap();
        let users = ctx
            .session
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count();
        assert_eq!(users, 1);
    }

    // ── Sequential execution order ───────────────────────────────────────────

    #[tokio::test]
    async fn tool_replies_follow_call_order() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![
            tool_turn(vec![
                ("t1", "write", json!({"path": "one.txt", "content": "1"})),
                ("t2", "write", json!({"path": "two.txt", "content": "2"})),
            ]),
            text_turn("both written"),
        ]);
        let mut ctx = make_ctx(dir.path(), model);
        run_turn(&mut ctx, Some("write both"), 10, false).await.unwrap();
        let tool_ids: Vec<&str> = ctx
            .session
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.tool_call_id.as_deref().unwrap())
            .collect();
        assert_eq!(tool_ids, vec!["t1", "t2"]);
        check_invariants(&ctx.session.messages);
    }

    // ── Oversized tool output is capped ──────────────────────────────────────

    #[tokio::test]
    async fn oversized_tool_output_is_truncated_head_and_tail() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new(vec![
            tool_turn(vec![("t1", "read", json!({"path": "big.txt"}))]),
            text_turn("ok"),
        ]);
        let mut ctx = make_ctx(dir.path(), model);
        ctx.policy.max_tool_result_chars = 100;
        let body = format!("{}{}", "H".repeat(5000), "T".repeat(5000));
        std::fs::write(ctx.cwd.join("big.txt"), body).unwrap();
        run_turn(&mut ctx, Some("read it"), 10, false).await.unwrap();
        let reply = ctx
            .session
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        let content = reply.content.as_deref().unwrap();
        assert!(content.contains("... (truncated) ..."));
        assert!(content.starts_with('H'));
        assert!(content.ends_with('T'));
        assert!(content.len() < 200);
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    #[test]
    fn ordinal_suffixes() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(13), "13th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(112), "112th");
    }

    #[test]
    fn reasoning_flags_follow_mode_and_marker() {
        assert_eq!(
            reasoning_flags("deepseek-reasoner", ReasoningMode::Auto),
            (true, true)
        );
        assert_eq!(reasoning_flags("gpt-4o", ReasoningMode::Auto), (false, false));
        assert_eq!(
            reasoning_flags("gpt-4o", ReasoningMode::Always),
            (true, true)
        );
        assert_eq!(
            reasoning_flags("deepseek-reasoner", ReasoningMode::Never),
            (false, false)
        );
    }

    #[test]
    fn args_preview_truncates_large_arguments() {
        let big = json!({"blob": "x".repeat(5000)});
        let preview = args_preview(&big);
        assert!(preview.ends_with("... (truncated)"));
        assert!(preview.len() < 2100);
    }
}
