// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agent core: the turn orchestrator and its collaborators — prompt
//! builder/compactor, agent registry, rules resolver, command loader,
//! application context, and tool-call replay.

pub mod agents;
pub mod commands;
pub mod compact;
pub mod context;
pub mod orchestrator;
pub mod replay;
pub mod rules;
pub mod summarizer;

pub use agents::{AgentProfile, AgentRegistry};
pub use compact::CompactionPolicy;
pub use context::{AppContext, ContextOptions};
pub use orchestrator::run_turn;
