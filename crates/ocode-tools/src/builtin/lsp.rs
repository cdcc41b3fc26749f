// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Lightweight local code navigation.
//!
//! Local-first and dependency-light: symbol discovery is a line scan with
//! per-language definition patterns, references are word-boundary matches,
//! hover returns the definition line plus the doc comment block above it.
//! `diagnostics` shells out to `python3 -m py_compile` for Python files;
//! other languages report no diagnostics.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::fs::{read_text, resolve_path};
use crate::tool::{PermissionClass, Tool, ToolContext, ToolResult};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;

#[derive(Debug, Clone)]
struct SymbolDef {
    name: String,
    kind: &'static str,
    /// 1-based.
    line: usize,
    /// 0-based column of the symbol name.
    column: usize,
}

/// Per-language definition patterns. Each regex has the symbol name as its
/// first capture group.
fn definition_patterns(ext: &str) -> Vec<(&'static str, Regex)> {
    let make = |kind: &'static str, pat: &str| (kind, Regex::new(pat).expect("static regex"));
    match ext {
        "rs" => vec![
            make("function", r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+(\w+)"),
            make("struct", r"^\s*(?:pub(?:\([^)]*\))?\s+)?struct\s+(\w+)"),
            make("enum", r"^\s*(?:pub(?:\([^)]*\))?\s+)?enum\s+(\w+)"),
            make("trait", r"^\s*(?:pub(?:\([^)]*\))?\s+)?trait\s+(\w+)"),
            make("module", r"^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+(\w+)"),
            make("const", r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const|static)\s+(\w+)"),
            make("type", r"^\s*(?:pub(?:\([^)]*\))?\s+)?type\s+(\w+)"),
        ],
        "py" => vec![
            make("function", r"^\s*(?:async\s+)?def\s+(\w+)"),
            make("class", r"^\s*class\s+(\w+)"),
        ],
        "js" | "ts" | "jsx" | "tsx" => vec![
            make("function", r"^\s*(?:export\s+)?(?:async\s+)?function\s+(\w+)"),
            make("class", r"^\s*(?:export\s+)?class\s+(\w+)"),
            make("const", r"^\s*(?:export\s+)?(?:const|let|var)\s+(\w+)"),
        ],
        "go" => vec![
            make("function", r"^\s*func\s+(?:\([^)]*\)\s+)?(\w+)"),
            make("type", r"^\s*type\s+(\w+)"),
        ],
        _ => vec![make("symbol", r"^\s*(?:def|class|fn|func|function)\s+(\w+)")],
    }
}

fn scan_symbols(text: &str, ext: &str) -> Vec<SymbolDef> {
    let patterns = definition_patterns(ext);
    let mut out = Vec::new();
    for (i, line) in text.lines().enumerate() {
        for (kind, re) in &patterns {
            if let Some(caps) = re.captures(line) {
                let m = caps.get(1).expect("capture group 1");
                out.push(SymbolDef {
                    name: m.as_str().to_string(),
                    kind,
                    line: i + 1,
                    column: m.start(),
                });
                break;
            }
        }
    }
    out
}

/// Identifier under the given 1-based line / 0-based column.
fn identifier_at(text: &str, line: usize, column: usize) -> Option<String> {
    let l = text.lines().nth(line.checked_sub(1)?)?;
    let bytes: Vec<char> = l.chars().collect();
    if bytes.is_empty() {
        return None;
    }
    let col = column.min(bytes.len().saturating_sub(1));
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    if !is_word(bytes[col]) {
        return None;
    }
    let mut start = col;
    while start > 0 && is_word(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = col;
    while end + 1 < bytes.len() && is_word(bytes[end + 1]) {
        end += 1;
    }
    Some(bytes[start..=end].iter().collect())
}

/// Doc-comment block immediately above `line` (1-based).
fn doc_block_above(text: &str, line: usize, ext: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let comment_prefixes: &[&str] = match ext {
        "py" => &["#"],
        "rs" => &["///", "//!", "//"],
        _ => &["//", "#"],
    };
    let mut docs: Vec<&str> = Vec::new();
    let mut i = line.saturating_sub(1);
    while i > 0 {
        let candidate = lines[i - 1].trim_start();
        if comment_prefixes.iter().any(|p| candidate.starts_with(p)) {
            docs.push(lines[i - 1].trim());
            i -= 1;
        } else {
            break;
        }
    }
    docs.reverse();
    docs.join("\n")
}

pub struct LspTool;

#[async_trait]
impl Tool for LspTool {
    fn name(&self) -> &str {
        "lsp"
    }

    fn description(&self) -> &str {
        "Lightweight local code navigation for supported languages. \
         Actions: definition, references, hover, symbols, diagnostics."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["definition", "references", "hover", "symbols", "diagnostics"],
                    "description": "Navigation action."
                },
                "path": {"type": "string", "description": "File path (relative to cwd)."},
                "line": {"type": "integer", "description": "1-based line number."},
                "column": {"type": "integer", "description": "0-based column offset."},
                "query": {"type": "string", "description": "Optional symbol substring filter for symbols action."},
                "limit": {"type": "integer", "description": "Max results (default 50)."}
            },
            "required": ["action", "path"]
        })
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> ToolResult {
        let action = args["action"].as_str().unwrap_or("").trim().to_lowercase();
        let path_str = args["path"].as_str().unwrap_or("").trim().to_string();
        if action.is_empty() || path_str.is_empty() {
            return ToolResult::err("Missing required args: action, path");
        }
        debug!(action = %action, path = %path_str, "lsp tool");

        let path = match resolve_path(&ctx.cwd, &path_str) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(format!("Invalid path: {e}")),
        };
        if !path.exists() {
            return ToolResult::err(format!("File not found: {path_str}"));
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let text = match read_text(&path) {
            Ok(t) => t,
            Err(e) => return ToolResult::err(e.to_string()),
        };

        let line = args["line"].as_u64().unwrap_or(1) as usize;
        let column = args["column"].as_u64().unwrap_or(0) as usize;
        let limit = (args["limit"].as_u64().unwrap_or(DEFAULT_LIMIT as u64) as usize)
            .clamp(1, MAX_LIMIT);
        let query = args["query"].as_str().unwrap_or("").trim().to_lowercase();

        match action.as_str() {
            "symbols" => {
                let results: Vec<Value> = scan_symbols(&text, &ext)
                    .into_iter()
                    .filter(|s| query.is_empty() || s.name.to_lowercase().contains(&query))
                    .take(limit)
                    .map(|s| {
                        json!({
                            "name": s.name,
                            "type": s.kind,
                            "line": s.line,
                            "column": s.column,
                            "module_path": path.display().to_string(),
                        })
                    })
                    .collect();
                ToolResult::ok(json!({"ok": true, "results": results}).to_string())
            }
            "definition" => {
                let Some(ident) = identifier_at(&text, line, column) else {
                    return ToolResult::ok(json!({"ok": true, "results": []}).to_string());
                };
                let results: Vec<Value> = scan_symbols(&text, &ext)
                    .into_iter()
                    .filter(|s| s.name == ident)
                    .take(limit)
                    .map(|s| {
                        json!({
                            "name": s.name,
                            "type": s.kind,
                            "module_path": path.display().to_string(),
                            "line": s.line,
                            "column": s.column,
                        })
                    })
                    .collect();
                ToolResult::ok(json!({"ok": true, "results": results}).to_string())
            }
            "references" => {
                let Some(ident) = identifier_at(&text, line, column) else {
                    return ToolResult::ok(json!({"ok": true, "results": []}).to_string());
                };
                let defs: std::collections::HashSet<usize> = scan_symbols(&text, &ext)
                    .into_iter()
                    .filter(|s| s.name == ident)
                    .map(|s| s.line)
                    .collect();
                let word = Regex::new(&format!(r"\b{}\b", regex::escape(&ident)))
                    .expect("escaped ident regex");
                let mut results: Vec<Value> = Vec::new();
                for (i, l) in text.lines().enumerate() {
                    for m in word.find_iter(l) {
                        results.push(json!({
                            "name": ident,
                            "module_path": path.display().to_string(),
                            "line": i + 1,
                            "column": m.start(),
                            "is_definition": defs.contains(&(i + 1)),
                        }));
                        if results.len() >= limit {
                            break;
                        }
                    }
                    if results.len() >= limit {
                        break;
                    }
                }
                ToolResult::ok(json!({"ok": true, "results": results}).to_string())
            }
            "hover" => {
                let Some(ident) = identifier_at(&text, line, column) else {
                    return ToolResult::ok(json!({"ok": true, "hover": ""}).to_string());
                };
                let Some(def) = scan_symbols(&text, &ext).into_iter().find(|s| s.name == ident)
                else {
                    return ToolResult::ok(json!({"ok": true, "hover": ""}).to_string());
                };
                let signature = text.lines().nth(def.line - 1).unwrap_or("").trim();
                let docs = doc_block_above(&text, def.line, &ext);
                let hover = if docs.is_empty() {
                    signature.to_string()
                } else {
                    format!("{docs}\n{signature}")
                };
                ToolResult::ok(
                    json!({
                        "ok": true,
                        "name": def.name,
                        "type": def.kind,
                        "module_path": path.display().to_string(),
                        "line": def.line,
                        "column": def.column,
                        "hover": hover,
                    })
                    .to_string(),
                )
            }
            "diagnostics" => {
                let mut diags: Vec<Value> = Vec::new();
                if ext == "py" {
                    let fut = Command::new("python3")
                        .args(["-m", "py_compile"])
                        .arg(&path)
                        .current_dir(&ctx.cwd)
                        .output();
                    match tokio::time::timeout(Duration::from_secs(20), fut).await {
                        Ok(Ok(out)) if !out.status.success() => {
                            let msg = String::from_utf8_lossy(&out.stderr);
                            let msg = msg.trim();
                            if !msg.is_empty() {
                                let mut cut = msg.len().min(4000);
                                while cut > 0 && !msg.is_char_boundary(cut) {
                                    cut -= 1;
                                }
                                diags.push(json!({
                                    "severity": "error",
                                    "source": "py_compile",
                                    "message": &msg[..cut],
                                }));
                            }
                        }
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => diags.push(json!({
                            "severity": "warning",
                            "source": "py_compile",
                            "message": format!("py_compile failed: {e}"),
                        })),
                        Err(_) => diags.push(json!({
                            "severity": "warning",
                            "source": "py_compile",
                            "message": "py_compile timed out",
                        })),
                    }
                }
                ToolResult::ok(json!({"ok": true, "diagnostics": diags}).to_string())
            }
            other => ToolResult::err(format!("Unknown action: {other}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
