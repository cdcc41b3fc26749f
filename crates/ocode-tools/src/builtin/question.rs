// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::io::Write;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

/// Asks the interactive user a free-form or choice-list question. Blocks
/// the turn until input arrives — that is the contract, not a bug.
pub struct QuestionTool;

fn ask_on_terminal(question: &str, choices: &[String], default: Option<&str>) -> std::io::Result<String> {
    let mut err = std::io::stderr();
    if choices.is_empty() {
        write!(err, "\n{question} ")?;
    } else {
        writeln!(err, "\nQuestion: {question}")?;
        for (i, c) in choices.iter().enumerate() {
            writeln!(err, "  {}. {c}", i + 1)?;
        }
        write!(err, "Your answer (number or text): ")?;
    }
    err.flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let ans = line.trim().to_string();
    if ans.is_empty() {
        if let Some(d) = default {
            return Ok(d.to_string());
        }
    }
    Ok(ans)
}

#[async_trait]
impl Tool for QuestionTool {
    fn name(&self) -> &str {
        "question"
    }

    fn description(&self) -> &str {
        "Ask the user a clarifying question during REPL/tool execution. \
         Useful when the assistant needs a choice or a missing parameter."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {"type": "string", "description": "Question to ask the user."},
                "choices": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional list of choices. User will pick by number or text."
                },
                "default": {"type": "string", "description": "Default answer (optional)."}
            },
            "required": ["question"]
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Read
    }

    async fn execute(&self, _ctx: &ToolContext, args: &Value) -> ToolResult {
        let question = args["question"].as_str().unwrap_or("").trim().to_string();
        if question.is_empty() {
            return ToolResult::err("Missing required field: question");
        }
        let choices: Vec<String> = args["choices"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let default = args["default"].as_str().map(str::to_string);

        let choices_for_blocking = choices.clone();
        let raw = tokio::task::spawn_blocking(move || {
            ask_on_terminal(&question, &choices_for_blocking, default.as_deref())
        })
        .await;
        let raw = match raw {
            Ok(Ok(a)) => a,
            Ok(Err(e)) => return ToolResult::err(format!("question failed: {e}")),
            Err(e) => return ToolResult::err(format!("question failed: {e}")),
        };

        if choices.is_empty() {
            return ToolResult::ok(json!({"answer": raw}).to_string());
        }
        let picked = resolve_choice(&raw, &choices);
        ToolResult::ok(json!({"answer": picked, "raw": raw, "choices": choices}).to_string())
    }
}

/// A numeric answer picks the 1-based choice; anything else passes through.
fn resolve_choice(answer: &str, choices: &[String]) -> String {
    if let Ok(idx) = answer.parse::<usize>() {
        if idx >= 1 && idx <= choices.len() {
            return choices[idx - 1].clone();
        }
    }
    answer.to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
