// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Application context: everything one turn needs, wired explicitly.
//! There is no global state — per-turn overrides are applied to a local
//! copy of the agent profile.

use std::path::PathBuf;
use std::sync::Arc;

use ocode_config::{user_data_dir, BehaviorConfig, Decision, ProviderConfig};
use ocode_mcp::McpClient;
use ocode_model::{ChatTransport, OpenAiCompatClient, ReasoningMode};
use ocode_session::{EventLog, SessionStore};
use ocode_tools::builtin::register_builtin_tools;
use ocode_tools::{PermissionClass, PermissionConfig, PermissionGate, ToolRegistry};
use tracing::warn;

use crate::agents::{AgentProfile, AgentRegistry};
use crate::compact::CompactionPolicy;
use crate::rules::load_rules_bundle;

pub struct ContextOptions {
    pub cwd: PathBuf,
    pub session_id: Option<String>,
    pub provider: ProviderConfig,
    /// Explicit model override (e.g. a command template's front matter);
    /// wins over the agent profile's model, which wins over the provider's.
    pub model_override: Option<String>,
    pub auto_approve: bool,
    pub deny_bash: bool,
    pub allow_edit: bool,
    pub agent_name: Option<String>,
    pub behavior_config: Option<PathBuf>,
    pub trace: bool,
    pub stream: bool,
    /// Override of the user data directory (tests).
    pub data_root: Option<PathBuf>,
}

pub struct AppContext {
    pub cwd: PathBuf,
    pub provider: Arc<dyn ChatTransport>,
    pub tools: ToolRegistry,
    pub permissions: PermissionGate,
    pub session: SessionStore,
    pub events: EventLog,
    pub agent: AgentProfile,
    pub rules_text: String,
    pub policy: CompactionPolicy,
    pub reasoning: ReasoningMode,
    pub data_root: PathBuf,
    pub trace: bool,
    pub stream: bool,
    pub behavior: BehaviorConfig,
    pub(crate) mcp_clients: Vec<Arc<McpClient>>,
}

impl AppContext {
    pub async fn initialize(opts: ContextOptions) -> anyhow::Result<Self> {
        let data_root = opts.data_root.unwrap_or_else(user_data_dir);

        let mut tools = ToolRegistry::new();
        register_builtin_tools(&mut tools);

        let behavior =
            ocode_config::load_behavior_config(&opts.cwd, opts.behavior_config.as_deref())?;
        let agent_registry = AgentRegistry::from_defaults(Some(&behavior));
        let agent = agent_registry.get(
            opts.agent_name
                .as_deref()
                .unwrap_or(&agent_registry.default_agent),
        );
        let rules = load_rules_bundle(&opts.cwd, Some(&behavior));

        let model = opts
            .model_override
            .clone()
            .or_else(|| agent.model.clone())
            .unwrap_or_else(|| opts.provider.model.clone());
        let provider: Arc<dyn ChatTransport> = Arc::new(OpenAiCompatClient::new(
            model,
            &opts.provider.base_url,
            opts.provider.api_key.clone(),
        ));
        let reasoning = opts
            .provider
            .reasoning
            .as_deref()
            .and_then(ReasoningMode::parse)
            .unwrap_or_default();

        // MCP servers are optional: a failing server disables its tools but
        // never blocks the turn.
        let mut mcp_clients = Vec::new();
        if !behavior.mcp_servers.is_empty() {
            let servers = behavior
                .mcp_servers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()));
            match ocode_mcp::register_mcp_servers(&mut tools, servers).await {
                Ok(clients) => mcp_clients = clients,
                Err(e) => warn!(error = %e, "MCP bridge startup failed; continuing without"),
            }
        }

        // Layering: defaults < behavior rules < agent overrides < CLI flags.
        // The blanket --yes convenience-set goes first so that an explicit
        // --no-bash / --allow-edit always wins over it.
        let mut perm_cfg = PermissionConfig::default();
        perm_cfg.apply_rules(behavior.permissions.iter().cloned());
        perm_cfg.apply_overrides(agent.permission_overrides.iter());
        if opts.auto_approve {
            perm_cfg.set_default(PermissionClass::Edit, Decision::Allow);
            perm_cfg.set_default(PermissionClass::Bash, Decision::Allow);
        }
        if opts.deny_bash {
            perm_cfg.set_default(PermissionClass::Bash, Decision::Deny);
        }
        if opts.allow_edit {
            perm_cfg.set_default(PermissionClass::Edit, Decision::Allow);
        }
        let permissions = PermissionGate::new(perm_cfg, opts.auto_approve);

        let session = SessionStore::open(&data_root, opts.session_id.as_deref())?;
        let events = EventLog::open(&data_root, &session.session_id);

        Ok(Self {
            cwd: opts.cwd,
            provider,
            tools,
            permissions,
            session,
            events,
            agent,
            rules_text: rules.combined_text,
            policy: CompactionPolicy::default(),
            reasoning,
            data_root,
            trace: opts.trace,
            stream: opts.stream,
            behavior,
            mcp_clients,
        })
    }

    /// Tear down MCP child processes. Best-effort, no graceful protocol.
    pub fn close(&mut self) {
        for c in &self.mcp_clients {
            c.close();
        }
        self.mcp_clients.clear();
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.close();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
