// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Named behavior profiles. Five builtins cover the common working modes;
//! config-defined agents merge over them by name.

use std::collections::BTreeMap;

use ocode_config::{BehaviorConfig, Decision};

#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub max_steps: Option<u32>,
    pub model: Option<String>,
    pub permission_overrides: BTreeMap<String, Decision>,
}

const BASE_PROMPT: &str =
    "You are a local coding agent. Use tools to read files and run commands; don't fabricate outputs.";

fn profile(
    name: &str,
    description: &str,
    prompt_suffix: &str,
    overrides: &[(&str, Decision)],
) -> AgentProfile {
    let system_prompt = if prompt_suffix.is_empty() {
        BASE_PROMPT.to_string()
    } else {
        format!("{BASE_PROMPT}\n\n{prompt_suffix}")
    };
    AgentProfile {
        name: name.to_string(),
        description: description.to_string(),
        system_prompt,
        max_steps: None,
        model: None,
        permission_overrides: overrides
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect(),
    }
}

fn builtin_agents() -> Vec<AgentProfile> {
    vec![
        profile("general", "General assistant (balanced).", "", &[]),
        profile(
            "plan",
            "Read-only planning: produce a step-by-step plan without editing or running commands.",
            "Mode: PLAN ONLY. Do not call edit/write/patch/bash. If needed, ask the user for \
             confirmation to switch to build/run.",
            &[("edit", Decision::Deny), ("bash", Decision::Deny)],
        ),
        profile(
            "explore",
            "Read-only exploration: inspect repository, locate relevant code, summarize findings.",
            "Mode: EXPLORE. Prefer list/glob/grep/read. Do not edit files or run bash unless \
             explicitly allowed.",
            &[("edit", Decision::Deny), ("bash", Decision::Deny)],
        ),
        profile(
            "build",
            "Implement changes (edit/patch allowed) but avoid running shell commands unless necessary.",
            "Mode: BUILD. You may edit files when necessary. Prefer deterministic edits \
             (edit/multiedit/patch). Use bash only when explicitly required.",
            &[("edit", Decision::Allow), ("bash", Decision::Ask)],
        ),
        profile(
            "run",
            "Execute tests/build steps (bash allowed) and implement fixes.",
            "Mode: RUN. You may use bash to run tests and commands. Be safe: show the exact \
             command; avoid destructive actions.",
            &[("edit", Decision::Allow), ("bash", Decision::Allow)],
        ),
    ]
}

#[derive(Debug)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentProfile>,
    pub default_agent: String,
}

impl AgentRegistry {
    pub fn from_defaults(behavior: Option<&BehaviorConfig>) -> Self {
        let mut agents: BTreeMap<String, AgentProfile> = builtin_agents()
            .into_iter()
            .map(|a| (a.name.clone(), a))
            .collect();
        let mut default_agent = "general".to_string();

        if let Some(behavior) = behavior {
            if !behavior.default_agent.trim().is_empty() {
                default_agent = behavior.default_agent.trim().to_string();
            }
            for (name, ac) in &behavior.agents {
                agents.insert(
                    name.clone(),
                    AgentProfile {
                        name: name.clone(),
                        description: if ac.description.is_empty() {
                            format!("Custom agent: {name}")
                        } else {
                            ac.description.clone()
                        },
                        system_prompt: ac.system_prompt.clone(),
                        max_steps: ac.max_steps,
                        model: ac.model.clone(),
                        permission_overrides: ac.permission_overrides.clone(),
                    },
                );
            }
        }

        Self {
            agents,
            default_agent,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// Unknown names fall back to the default agent, then to `general`.
    pub fn get(&self, name: &str) -> AgentProfile {
        if let Some(a) = self.agents.get(name) {
            return a.clone();
        }
        self.agents
            .get(&self.default_agent)
            .or_else(|| self.agents.get("general"))
            .cloned()
            .expect("builtin agents always include general")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_builtins_exist() {
        let reg = AgentRegistry::from_defaults(None);
        for name in ["general", "plan", "explore", "build", "run"] {
            assert!(reg.names().contains(&name.to_string()), "missing {name}");
        }
    }

    #[test]
    fn plan_and_explore_deny_side_effects() {
        let reg = AgentRegistry::from_defaults(None);
        for name in ["plan", "explore"] {
            let a = reg.get(name);
            assert_eq!(a.permission_overrides["edit"], Decision::Deny);
            assert_eq!(a.permission_overrides["bash"], Decision::Deny);
        }
    }

    #[test]
    fn run_allows_bash() {
        let reg = AgentRegistry::from_defaults(None);
        assert_eq!(
            reg.get("run").permission_overrides["bash"],
            Decision::Allow
        );
    }

    #[test]
    fn unknown_name_falls_back_to_default() {
        let reg = AgentRegistry::from_defaults(None);
        assert_eq!(reg.get("nonexistent").name, "general");
    }

    #[test]
    fn config_agents_merge_over_builtins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ocode.json"),
            r#"{
              "default_agent": "reviewer",
              "agents": {
                "reviewer": {"description": "review only", "system_prompt": "Review code.",
                             "max_steps": 9, "permission_overrides": {"edit": "deny"}},
                "general": {"description": "overridden", "system_prompt": "custom base"}
              }
            }"#,
        )
        .unwrap();
        let behavior = ocode_config::load_behavior_config(dir.path(), None).unwrap();
        let reg = AgentRegistry::from_defaults(Some(&behavior));

        let reviewer = reg.get("reviewer");
        assert_eq!(reviewer.max_steps, Some(9));
        assert_eq!(reviewer.permission_overrides["edit"], Decision::Deny);
        // config entry replaces the builtin of the same name
        assert_eq!(reg.get("general").system_prompt, "custom base");
        // default agent comes from config
        assert_eq!(reg.get("zzz").name, "reviewer");
    }
}
