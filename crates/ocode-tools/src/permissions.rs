// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Permission engine and interactive gate.
//!
//! Rules are evaluated in order, last matching rule wins. A `tool:<glob>`
//! rule matches tool names only; any other glob matches either the
//! permission class or the tool name. With no matching rule the defaults
//! map decides (read=allow, edit=ask, bash=ask, mcp=ask).

use std::collections::HashMap;
use std::io::Write;

use ocode_config::{Decision, PermissionRule};
use regex::Regex;
use tracing::debug;

use crate::tool::PermissionClass;

/// Convert a simple glob to a [`Regex`]. Only `*` (match anything) and `?`
/// (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

fn glob_match(pattern: &str, text: &str) -> bool {
    glob_to_regex(pattern).is_some_and(|re| re.is_match(text))
}

/// Ordered rules plus the class-keyed defaults map.
#[derive(Debug, Clone)]
pub struct PermissionConfig {
    defaults: HashMap<String, Decision>,
    rules: Vec<PermissionRule>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        let defaults = [
            ("read", Decision::Allow),
            ("edit", Decision::Ask),
            ("bash", Decision::Ask),
            ("mcp", Decision::Ask),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            defaults,
            rules: Vec::new(),
        }
    }
}

impl PermissionConfig {
    pub fn set_default(&mut self, class: PermissionClass, decision: Decision) {
        self.defaults.insert(class.as_str().to_string(), decision);
    }

    /// Behavior-config rules are appended after any existing ones; within
    /// the list, later rules win.
    pub fn apply_rules(&mut self, rules: impl IntoIterator<Item = PermissionRule>) {
        self.rules.extend(rules);
    }

    /// Agent-profile overrides replace defaults wholesale.
    pub fn apply_overrides<'a>(
        &mut self,
        overrides: impl IntoIterator<Item = (&'a String, &'a Decision)>,
    ) {
        for (k, v) in overrides {
            self.defaults.insert(k.clone(), *v);
        }
    }

    fn match_rules(&self, class: &str, tool_name: &str) -> Option<Decision> {
        let mut decision = None;
        for rule in &self.rules {
            if let Some(pat) = rule.pattern.strip_prefix("tool:") {
                if glob_match(pat, tool_name) {
                    decision = Some(rule.decision);
                }
            } else if glob_match(&rule.pattern, class) || glob_match(&rule.pattern, tool_name) {
                decision = Some(rule.decision);
            }
        }
        decision
    }

    pub fn decide(&self, class: PermissionClass, tool_name: &str) -> Decision {
        let class = class.as_str();
        if let Some(d) = self.match_rules(class, tool_name) {
            return d;
        }
        self.defaults
            .get(class)
            .or_else(|| self.defaults.get(tool_name))
            .copied()
            .unwrap_or(Decision::Ask)
    }
}

/// How an `ask` decision reaches the user. A trait so tests and headless
/// runs can answer without a terminal.
pub trait ApprovalPrompt: Send + Sync {
    fn confirm(&self, tool_name: &str, args_preview: &str) -> bool;
}

/// Interactive prompt on stdin/stderr.
pub struct StdinPrompt;

impl ApprovalPrompt for StdinPrompt {
    fn confirm(&self, tool_name: &str, args_preview: &str) -> bool {
        eprintln!("\nTool requires approval: {tool_name}\n{args_preview}");
        eprint!("Approve? [y/N] ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// Wraps [`PermissionConfig::decide`] with the user-facing ask step.
pub struct PermissionGate {
    pub config: PermissionConfig,
    pub auto_approve: bool,
    prompt: Box<dyn ApprovalPrompt>,
}

impl PermissionGate {
    pub fn new(config: PermissionConfig, auto_approve: bool) -> Self {
        Self {
            config,
            auto_approve,
            prompt: Box::new(StdinPrompt),
        }
    }

    pub fn with_prompt(
        config: PermissionConfig,
        auto_approve: bool,
        prompt: Box<dyn ApprovalPrompt>,
    ) -> Self {
        Self {
            config,
            auto_approve,
            prompt,
        }
    }

    /// Final allow/deny for one tool call.
    pub fn check(&self, class: PermissionClass, tool_name: &str, args_preview: &str) -> bool {
        match self.config.decide(class, tool_name) {
            Decision::Allow => true,
            Decision::Deny => {
                debug!(tool = tool_name, class = class.as_str(), "tool denied");
                false
            }
            Decision::Ask => self.auto_approve || self.prompt.confirm(tool_name, args_preview),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
