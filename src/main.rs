// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `helm` — drive a local shell through an LLM assistant.
//!
//! Loads configuration, spawns a local PTY, wires up an [`Agent`] via
//! [`helm_bootstrap::AgentBuilder`], and runs one task to completion while
//! printing the agent's observable event stream to stdout. Confirmations for
//! risky commands are resolved with an interactive y/n prompt on stderr.

mod cli;

use std::io::{IsTerminal, Read, Write};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use helm_core::{AgentEvent, StepKind};
use helm_term::LocalDriver;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = helm_config::load(cli.config.as_deref())
        .context("loading configuration")?;
    if cli.strict {
        config.agent.strict_mode = true;
    }

    if cli.show_config {
        let yaml = serde_yaml::to_string(&config).context("serializing effective config")?;
        println!("{yaml}");
        return Ok(());
    }

    if !config.agent.enabled {
        anyhow::bail!("agent.enabled is false in the effective configuration");
    }

    let task = read_task(cli.task)?;

    let (cols, rows) = (120, 40);
    let terminal = LocalDriver::spawn(cols, rows).context("spawning local shell")?;
    let initial_cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "/".to_string());

    let (agent, mut events) = helm_bootstrap::AgentBuilder::new(Arc::new(config))
        .build(terminal, "local", initial_cwd)
        .context("building agent")?;
    let agent = Arc::new(agent);

    let drain = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                handle_event(&agent, event).await;
            }
        })
    };

    let result = agent.run(Some(task)).await;
    drop(agent);
    let _ = drain.await;

    match result {
        Ok(final_text) => {
            println!("{final_text}");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn init_tracing(verbose: bool) {
    if !verbose {
        return;
    }
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn read_task(task: Option<String>) -> anyhow::Result<String> {
    if let Some(task) = task {
        return Ok(task);
    }
    if std::io::stdin().is_terminal() {
        anyhow::bail!("no task given and stdin is a terminal; pass a task argument or pipe one in");
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf).context("reading task from stdin")?;
    Ok(buf.trim().to_string())
}

async fn handle_event(agent: &helm_core::Agent, event: AgentEvent) {
    match event {
        AgentEvent::OnStep { step, .. } => print_step(&step),
        AgentEvent::OnNeedConfirm { confirmation, .. } => {
            let approved = prompt_confirmation(&confirmation);
            agent.resolve_confirmation(approved, None).await;
        }
        AgentEvent::OnComplete { .. } => {}
        AgentEvent::OnError { error, .. } => {
            eprintln!("error: {error}");
        }
    }
}

fn print_step(step: &helm_core::AgentStep) {
    match step.kind {
        StepKind::Thinking => eprintln!("[thinking] {}", step.content),
        StepKind::Message => print!("{}", step.content),
        StepKind::ToolCall => {
            if let Some(name) = &step.tool_name {
                eprintln!("\n[tool] {name} {}", step.content);
            }
        }
        StepKind::ToolResult => {
            if let Some(result) = &step.tool_result {
                eprintln!("[result] {result}");
            }
        }
        StepKind::Confirm | StepKind::UserSupplement => eprintln!("[note] {}", step.content),
        StepKind::Error => eprintln!("[error] {}", step.content),
    }
    let _ = std::io::stdout().flush();
}

fn prompt_confirmation(confirmation: &helm_core::PendingConfirmationInfo) -> bool {
    eprint!(
        "\nconfirm {} ({:?})? [y/N] ",
        confirmation.tool_name, confirmation.risk_level
    );
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}
