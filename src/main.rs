// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{parse_template_args, Cli, Commands, TurnArgs};
use ocode_config::{load_provider_registry, user_data_dir, ProviderConfig};
use ocode_core::commands::{discover_commands, load_command, render_command_prompt};
use ocode_core::replay::{replay_exec, ReplayStatus};
use ocode_core::{run_turn, AppContext, ContextOptions};
use ocode_model::{ChatTransport, Role};
use ocode_session::{EventLog, SessionStore};

fn resolve_cwd(cwd: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let cwd = cwd.unwrap_or(std::env::current_dir()?);
    if cwd.exists() && !cwd.is_dir() {
        anyhow::bail!("--cwd must be a directory, got file: {}", cwd.display());
    }
    if !cwd.exists() {
        std::fs::create_dir_all(&cwd)
            .with_context(|| format!("creating {}", cwd.display()))?;
    }
    cwd.canonicalize()
        .with_context(|| format!("resolving {}", cwd.display()))
}

fn load_provider(turn: &TurnArgs) -> anyhow::Result<ProviderConfig> {
    let reg = load_provider_registry(&turn.config)?;
    Ok(reg.get(&turn.provider)?.clone())
}

async fn build_context(
    turn: &TurnArgs,
    agent: Option<&str>,
    provider: ProviderConfig,
    model_override: Option<String>,
) -> anyhow::Result<AppContext> {
    let cwd = resolve_cwd(turn.cwd.clone())?;
    let ctx = AppContext::initialize(ContextOptions {
        cwd,
        session_id: turn.session.clone(),
        provider,
        model_override,
        auto_approve: turn.yes,
        deny_bash: turn.no_bash,
        allow_edit: turn.allow_edit || turn.yes,
        agent_name: agent.map(str::to_string),
        behavior_config: turn.behavior_config.clone(),
        trace: turn.trace,
        stream: turn.stream,
        data_root: None,
    })
    .await?;
    Ok(ctx)
}

fn print_header(ctx: &AppContext, provider: &ProviderConfig) {
    println!("ocode");
    println!("  cwd:      {}", ctx.cwd.display());
    println!("  session:  {}", ctx.session.session_id);
    println!("  provider: {}", provider.name);
    println!("  model:    {}", ctx.provider.model());
    println!("  agent:    {}", ctx.agent.name);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("OCODE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            turn,
            prompt,
            max_steps,
            agent,
        } => {
            let provider = load_provider(&turn)?;
            let mut ctx = build_context(&turn, Some(&agent), provider.clone(), None).await?;
            print_header(&ctx, &provider);
            println!("\nYou: {prompt}\n");
            let max_steps = ctx.agent.max_steps.unwrap_or(max_steps);
            let answer = run_turn(&mut ctx, Some(&prompt), max_steps, turn.resume_enabled()).await;
            ctx.close();
            println!("\nAssistant:\n{}", answer?);
        }

        Commands::Repl {
            turn,
            max_steps,
            agent,
        } => {
            let provider = load_provider(&turn)?;
            let mut ctx = build_context(&turn, Some(&agent), provider.clone(), None).await?;
            print_header(&ctx, &provider);
            let max_steps = ctx.agent.max_steps.unwrap_or(max_steps);
            loop {
                print!("You: ");
                std::io::stdout().flush().ok();
                let mut line = String::new();
                if std::io::stdin().read_line(&mut line)? == 0 {
                    break;
                }
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
                    break;
                }
                let answer = run_turn(&mut ctx, Some(input), max_steps, turn.resume_enabled()).await?;
                println!("\nAssistant:\n{answer}\n");
            }
            ctx.close();
        }

        Commands::Cmd {
            name,
            turn,
            max_steps,
            agent,
            args,
        } => {
            let provider = load_provider(&turn)?;
            let cwd = resolve_cwd(turn.cwd.clone())?;
            let behavior =
                ocode_config::load_behavior_config(&cwd, turn.behavior_config.as_deref())?;
            let spec = load_command(&cwd, &name, &behavior.commands)?;
            let prompt = render_command_prompt(&spec, &parse_template_args(&args));

            // Front-matter overrides: agent, model, max_steps.
            let chosen_agent = agent
                .or(spec.agent.clone())
                .unwrap_or(behavior.default_agent.clone());
            let mut ctx =
                build_context(&turn, Some(&chosen_agent), provider.clone(), spec.model.clone())
                    .await?;
            let chosen_max_steps = spec
                .max_steps
                .or(ctx.agent.max_steps)
                .unwrap_or(max_steps);
            print_header(&ctx, &provider);
            println!("  command:  {name}");
            let answer = run_turn(&mut ctx, Some(&prompt), chosen_max_steps, turn.resume_enabled()).await;
            ctx.close();
            println!("\nAssistant:\n{}", answer?);
        }

        Commands::ContinueRun {
            turn,
            max_steps,
            agent,
        } => {
            anyhow::ensure!(turn.session.is_some(), "--session is required");
            let provider = load_provider(&turn)?;
            let mut ctx = build_context(&turn, Some(&agent), provider.clone(), None).await?;
            print_header(&ctx, &provider);
            let max_steps = ctx.agent.max_steps.unwrap_or(max_steps);
            let answer = run_turn(&mut ctx, None, max_steps, true).await;
            ctx.close();
            println!("\nAssistant:\n{}", answer?);
        }

        Commands::Replay {
            session,
            tail,
            show_system,
        } => {
            let store = SessionStore::open(&user_data_dir(), Some(&session))?;
            println!("session: {}", store.session_id);
            println!("file:    {}", store.path.display());
            let msgs: Vec<_> = store
                .messages
                .iter()
                .filter(|m| show_system || m.role != Role::System)
                .collect();
            let skip = msgs.len().saturating_sub(tail);
            for m in &msgs[skip..] {
                let title = match (m.role, m.tool_call_id.as_deref()) {
                    (Role::Tool, Some(id)) => format!("tool ({id})"),
                    (role, _) => format!("{role:?}").to_lowercase(),
                };
                println!("--- {title} ---");
                if let Some(calls) = &m.tool_calls {
                    for c in calls {
                        println!("[tool_call {} {} {}]", c.id, c.name, c.arguments);
                    }
                }
                println!("{}", m.content.as_deref().unwrap_or(""));
            }
        }

        Commands::ReplayExec {
            turn,
            dry_run,
            start,
            limit,
        } => {
            anyhow::ensure!(turn.session.is_some(), "--session is required");
            let provider = load_provider(&turn)?;
            let mut ctx = build_context(&turn, None, provider, None).await?;
            println!("session: {}", ctx.session.session_id);
            println!("dry_run: {dry_run}");
            let outcomes = replay_exec(&ctx, dry_run, start, limit).await;
            for o in &outcomes {
                match &o.status {
                    ReplayStatus::Skipped => {
                        println!("[block {}] would run {} ({})", o.block, o.tool, o.call_id);
                        println!("{}", o.content);
                    }
                    ReplayStatus::Executed { is_error, diff } => {
                        let mut title =
                            format!("[block {}] {} ({})", o.block, o.tool, o.call_id);
                        title.push_str(if *is_error { " error" } else { " ok" });
                        if *diff {
                            title.push_str(" [DIFF]");
                        }
                        println!("{title}");
                        let preview: String = o.content.chars().take(4000).collect();
                        println!("{preview}");
                    }
                }
            }
            ctx.close();
        }

        Commands::Events { session, tail } => {
            let log = EventLog::open(&user_data_dir(), &session);
            let events = log.read_all();
            println!("session: {session}");
            println!("file:    {}", log.path.display());
            println!("events:  {}", events.len());
            let skip = events.len().saturating_sub(tail);
            for e in &events[skip..] {
                println!("{:.3}  {}  {}", e.ts, e.event_type, e.data);
            }
        }

        Commands::Stats { session } => {
            let log = EventLog::open(&user_data_dir(), &session);
            let events = log.read_all();
            let count = |t: &str| events.iter().filter(|e| e.event_type == t).count();
            let avg_ms = |t: &str| {
                let vals: Vec<f64> = events
                    .iter()
                    .filter(|e| e.event_type == t)
                    .filter_map(|e| e.data["elapsed_ms"].as_f64())
                    .collect();
                if vals.is_empty() {
                    None
                } else {
                    Some(vals.iter().sum::<f64>() / vals.len() as f64)
                }
            };
            println!("session: {session}");
            println!(
                "llm_requests: {}  llm_responses: {}  llm_errors: {}",
                count("llm.request"),
                count("llm.response"),
                count("llm.error"),
            );
            if let Some(ms) = avg_ms("llm.response") {
                println!("llm_avg_latency_ms: {ms:.1}");
            }
            println!(
                "tool_calls: {}  tool_results: {}  tool_denied: {}",
                count("tool.call"),
                count("tool.result"),
                count("tool.denied"),
            );
            if let Some(ms) = avg_ms("tool.result") {
                println!("tool_avg_latency_ms: {ms:.1}");
            }
            let mut freq: HashMap<String, usize> = HashMap::new();
            for e in events.iter().filter(|e| e.event_type == "tool.call") {
                if let Some(tool) = e.data["tool"].as_str() {
                    *freq.entry(tool.to_string()).or_default() += 1;
                }
            }
            let mut top: Vec<_> = freq.into_iter().collect();
            top.sort_by(|a, b| b.1.cmp(&a.1));
            if !top.is_empty() {
                println!("top_tools:");
                for (name, n) in top.into_iter().take(12) {
                    println!("  - {name}: {n}");
                }
            }
        }

        Commands::Commands {
            cwd,
            behavior_config,
        } => {
            let cwd = resolve_cwd(cwd)?;
            let behavior = ocode_config::load_behavior_config(&cwd, behavior_config.as_deref())?;
            let cmds = discover_commands(&cwd, &behavior.commands);
            if cmds.is_empty() {
                println!("No commands found.");
                return Ok(());
            }
            for (name, spec) in &cmds {
                let extra = spec
                    .agent
                    .as_deref()
                    .map(|a| format!(" (agent={a})"))
                    .unwrap_or_default();
                println!("- {name}{extra} {}", spec.description);
            }
        }

        Commands::Mcp {
            cwd,
            behavior_config,
        } => {
            let cwd = resolve_cwd(cwd)?;
            let behavior = ocode_config::load_behavior_config(&cwd, behavior_config.as_deref())?;
            if behavior.mcp_servers.is_empty() {
                println!("No MCP servers configured. Add mcp_servers to ocode.json.");
                return Ok(());
            }
            for (name, sc) in &behavior.mcp_servers {
                println!(
                    "{name} -> {:?} (prefix={})",
                    sc.command,
                    sc.prefix.clone().unwrap_or(format!("mcp.{name}"))
                );
            }
            let mut registry = ocode_tools::ToolRegistry::new();
            let servers = behavior
                .mcp_servers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()));
            let clients = ocode_mcp::register_mcp_servers(&mut registry, servers).await?;
            let names = registry.names();
            if names.is_empty() {
                println!("No MCP tools discovered.");
            } else {
                println!("\nDiscovered MCP tools:");
                for schema in registry.schemas() {
                    println!("- {}: {}", schema.name, schema.description);
                }
            }
            for c in clients {
                c.close();
            }
        }
    }
    Ok(())
}
