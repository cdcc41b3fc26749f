// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use ocode_session::{format_todos, TodoStatus, TodoStore};
use serde_json::{json, Value};

use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

fn open_store(ctx: &ToolContext) -> Result<TodoStore, ToolResult> {
    TodoStore::open(&ctx.data_root, ctx.session_id.as_deref())
        .map_err(|e| ToolResult::err(format!("todo store error: {e}")))
}

pub struct TodoReadTool;

#[async_trait]
impl Tool for TodoReadTool {
    fn name(&self) -> &str {
        "todoread"
    }

    fn description(&self) -> &str {
        "Read the current todo list for this session."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Read
    }

    async fn execute(&self, ctx: &ToolContext, _args: &Value) -> ToolResult {
        let store = match open_store(ctx) {
            Ok(s) => s,
            Err(e) => return e,
        };
        ToolResult::ok(format_todos(&store.load()))
    }
}

pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todowrite"
    }

    fn description(&self) -> &str {
        "Update the todo list for this session. Supports add/update/remove/clear. Use todoread to view current items."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "update", "remove", "clear"],
                    "description": "Operation to perform."
                },
                "text": {"type": "string", "description": "Todo text (for add/update)."},
                "id": {"type": "string", "description": "Todo id (for update/remove)."},
                "status": {
                    "type": "string",
                    "enum": ["todo", "doing", "done"],
                    "description": "New status (for update)."
                }
            },
            "required": ["action"]
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Edit
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> ToolResult {
        let action = args["action"].as_str().unwrap_or("").trim().to_lowercase();
        let store = match open_store(ctx) {
            Ok(s) => s,
            Err(e) => return e,
        };

        match action.as_str() {
            "clear" => match store.clear() {
                Ok(()) => ToolResult::ok("Cleared todo list.\n(empty todo list)"),
                Err(e) => ToolResult::err(e.to_string()),
            },
            "add" => {
                let text = args["text"].as_str().unwrap_or("").trim().to_string();
                if text.is_empty() {
                    return ToolResult::err("todowrite add requires: text");
                }
                match store.add(&text) {
                    Ok(items) => ToolResult::ok(format!("Added todo.\n{}", format_todos(&items))),
                    Err(e) => ToolResult::err(e.to_string()),
                }
            }
            "update" | "remove" => {
                let id = args["id"].as_str().unwrap_or("").trim().to_string();
                if id.is_empty() {
                    return ToolResult::err(format!("todowrite {action} requires: id"));
                }
                if action == "remove" {
                    return match store.remove(&id) {
                        Ok(items) => {
                            ToolResult::ok(format!("Removed todo {id}.\n{}", format_todos(&items)))
                        }
                        Err(_) => ToolResult::err(format!("Todo id not found: {id}")),
                    };
                }
                let status = match args["status"].as_str() {
                    Some(s) => match TodoStatus::parse(s) {
                        Some(st) => Some(st),
                        None => return ToolResult::err(format!("Invalid status: {s}")),
                    },
                    None => None,
                };
                match store.update(&id, args["text"].as_str(), status) {
                    Ok(items) => {
                        ToolResult::ok(format!("Updated todo {id}.\n{}", format_todos(&items)))
                    }
                    Err(_) => ToolResult::err(format!("Todo id not found: {id}")),
                }
            }
            other => ToolResult::err(format!("Invalid action: {other}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
