// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Flags shared by every command that builds a full application context.
#[derive(Args, Debug, Clone)]
pub struct TurnArgs {
    /// Provider name registered in the YAML config.
    #[arg(long)]
    pub provider: String,

    /// YAML config path.
    #[arg(long, default_value = "ocode.yaml")]
    pub config: PathBuf,

    /// Working directory (project root). Defaults to current directory.
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Session id to append to (default creates new).
    #[arg(long)]
    pub session: Option<String>,

    /// Auto-approve tools that require confirmation (edit/bash).
    #[arg(long)]
    pub yes: bool,

    /// Deny the bash tool.
    #[arg(long)]
    pub no_bash: bool,

    /// Auto-allow edit tools (write/edit/patch).
    #[arg(long)]
    pub allow_edit: bool,

    /// Optional behavior JSON (ocode.json) path.
    #[arg(long)]
    pub behavior_config: Option<PathBuf>,

    /// Print LLM input/output and tool traces.
    #[arg(long)]
    pub trace: bool,

    /// Stream tokens while generating.
    #[arg(long)]
    pub stream: bool,

    /// Resume pending tool calls before running (the default).
    #[arg(long, conflicts_with = "no_resume")]
    pub resume: bool,

    /// Do not resume pending tool calls.
    #[arg(long)]
    pub no_resume: bool,
}

impl TurnArgs {
    /// Resume defaults on; `--no-resume` switches it off.
    pub fn resume_enabled(&self) -> bool {
        !self.no_resume
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "ocode",
    about = "A local, terminal-driven coding agent",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single agent turn from a prompt.
    Run {
        #[command(flatten)]
        turn: TurnArgs,
        /// User prompt to run once.
        #[arg(long, short = 'p')]
        prompt: String,
        /// Max tool/LLM iterations.
        #[arg(long, default_value_t = 25)]
        max_steps: u32,
        /// Agent profile (general/plan/explore/build/run or custom).
        #[arg(long, default_value = "general")]
        agent: String,
    },

    /// Interactive loop. `/continue` resumes pending tool calls without a
    /// new user message; `exit` or `quit` leaves.
    Repl {
        #[command(flatten)]
        turn: TurnArgs,
        /// Max tool/LLM iterations per message.
        #[arg(long, default_value_t = 100)]
        max_steps: u32,
        #[arg(long, default_value = "general")]
        agent: String,
    },

    /// Run a named prompt template.
    Cmd {
        /// Command name (from commands/ or behavior config).
        name: String,
        #[command(flatten)]
        turn: TurnArgs,
        #[arg(long, default_value_t = 50)]
        max_steps: u32,
        /// Override agent profile for this command.
        #[arg(long)]
        agent: Option<String>,
        /// Template args as key=value; used in {{key}} placeholders.
        #[arg(long = "arg", short = 'A')]
        args: Vec<String>,
    },

    /// Resume pending tool calls and continue a session without adding a
    /// new user message. Useful for crash recovery.
    ContinueRun {
        #[command(flatten)]
        turn: TurnArgs,
        #[arg(long, default_value_t = 50)]
        max_steps: u32,
        #[arg(long, default_value = "general")]
        agent: String,
    },

    /// Print persisted messages from a saved session.
    Replay {
        #[arg(long)]
        session: String,
        /// Show last N messages.
        #[arg(long, default_value_t = 50)]
        tail: usize,
        /// Include system messages.
        #[arg(long)]
        show_system: bool,
    },

    /// Re-execute recorded tool calls for a session (no LLM calls);
    /// flags tool-result diffs against the recorded outputs.
    ReplayExec {
        #[command(flatten)]
        turn: TurnArgs,
        /// Do not execute tools; only show what would run.
        #[arg(long)]
        dry_run: bool,
        /// Start from assistant tool-call block index (0-based).
        #[arg(long, default_value_t = 0)]
        start: usize,
        /// Max assistant tool-call blocks to process.
        #[arg(long, default_value_t = usize::MAX)]
        limit: usize,
    },

    /// Show recent structured events recorded for a session.
    Events {
        #[arg(long)]
        session: String,
        /// Show last N events.
        #[arg(long, default_value_t = 200)]
        tail: usize,
    },

    /// Show a compact observability summary for a session.
    Stats {
        #[arg(long)]
        session: String,
    },

    /// List available commands discovered from commands/ directories and
    /// behavior config.
    Commands {
        #[arg(long)]
        cwd: Option<PathBuf>,
        #[arg(long)]
        behavior_config: Option<PathBuf>,
    },

    /// List configured MCP servers and discovered MCP tools.
    Mcp {
        #[arg(long)]
        cwd: Option<PathBuf>,
        #[arg(long)]
        behavior_config: Option<PathBuf>,
    },
}

/// Parse `key=value` template arguments; entries without `=` are ignored.
pub fn parse_template_args(args: &[String]) -> std::collections::BTreeMap<String, String> {
    let mut out = std::collections::BTreeMap::new();
    for it in args {
        if let Some((k, v)) = it.split_once('=') {
            out.insert(k.trim().to_string(), v.to_string());
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
