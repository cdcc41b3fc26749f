// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Configuration for ocode: the YAML provider registry and the JSON
//! behavior config (agents, permissions, commands, MCP servers, rules).
//!
//! Provider config errors are fatal at startup and name the offending file
//! and field; behavior config layers are deep-merged global < project <
//! explicit path.

mod behavior;
mod providers;

pub use behavior::{
    load_behavior_config, AgentConfig, BehaviorConfig, CommandSpec, Decision, McpServerConfig,
    PermissionRule,
};
pub use providers::{load_provider_registry, ProviderConfig, ProviderRegistry};

/// Application name used for user config/data directory paths.
pub const APP_NAME: &str = "ocode";

/// Global configuration directory (`~/.config/ocode` on Linux).
pub fn global_config_dir() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// User data directory (`~/.local/share/ocode` on Linux).
pub fn user_data_dir() -> std::path::PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}
