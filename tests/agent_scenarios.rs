// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end scenarios for the agent run loop (SPEC_FULL.md §8 S1-S3, S6),
//! driven against a [`helm_term::TerminalDriver`] stub and a scripted model
//! provider so no real shell or network call is involved.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tokio::sync::{broadcast, Mutex};

use helm_config::AgentConfig;
use helm_core::{Agent, AgentEvent, AgentRuntimeContext, Session};
use helm_model::{Message, ScriptedMockProvider};
use helm_term::{
    ControlKey, ExecuteOutcome, HostProfile, LocalProcessStatus, RemoteProcesses, TerminalDriver,
    TerminalKind, TerminalState,
};
use helm_tools::ToolContext;

struct NullDriver {
    tx: broadcast::Sender<Bytes>,
}

#[async_trait]
impl TerminalDriver for NullDriver {
    fn kind(&self) -> TerminalKind {
        TerminalKind::Local
    }
    async fn write(&self, _data: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn resize(&self, _cols: u16, _rows: u16) -> anyhow::Result<()> {
        Ok(())
    }
    fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }
    async fn execute_in_terminal(&self, _command: &str, _timeout: Duration) -> ExecuteOutcome {
        ExecuteOutcome { output: String::new(), duration: Duration::ZERO, timed_out: false }
    }
    async fn get_cwd(&self) -> Option<String> {
        None
    }
    async fn get_terminal_status(&self) -> LocalProcessStatus {
        LocalProcessStatus::default()
    }
    async fn get_remote_processes(&self) -> Option<RemoteProcesses> {
        None
    }
    async fn send_control(&self, _key: ControlKey) -> anyhow::Result<()> {
        Ok(())
    }
    async fn dispose(&self) {}
}

fn null_driver() -> Arc<dyn TerminalDriver> {
    let (tx, _rx) = broadcast::channel(16);
    Arc::new(NullDriver { tx })
}

fn test_ctx() -> ToolContext {
    ToolContext::new(
        null_driver(),
        Arc::new(Mutex::new(TerminalState::new("local", TerminalKind::Local, "/tmp"))),
        Duration::from_secs(30),
        Arc::new(Mutex::new(HostProfile::new("test@host"))),
    )
}

fn tools() -> Arc<helm_tools::ToolRegistry> {
    Arc::new(helm_bootstrap::build_tool_registry())
}

fn new_agent(
    provider: ScriptedMockProvider,
    config: AgentConfig,
) -> (Agent, tokio::sync::mpsc::UnboundedReceiver<AgentEvent>) {
    Agent::new(
        "a1",
        Session::new("s1", 32_000),
        tools(),
        test_ctx(),
        Arc::new(provider),
        config,
        AgentRuntimeContext::new(),
    )
}

/// S1: a task resolved purely through tool calls and text, with every
/// command classified safe — no confirmation is ever posted.
#[tokio::test]
async fn s1_disk_check_completes_without_confirmation() {
    let provider = ScriptedMockProvider::new(vec![
        vec![
            helm_model::ResponseEvent::ToolCall {
                index: 0,
                id: "call-1".into(),
                name: "execute_command".into(),
                arguments: json!({"command": "df -h"}).to_string(),
            },
            helm_model::ResponseEvent::Done,
        ],
        vec![
            helm_model::ResponseEvent::ToolCall {
                index: 0,
                id: "call-2".into(),
                name: "execute_command".into(),
                arguments: json!({"command": "du -sh /var | sort -rh | head -10"}).to_string(),
            },
            helm_model::ResponseEvent::Done,
        ],
        vec![
            helm_model::ResponseEvent::TextDelta("disk usage looks fine".into()),
            helm_model::ResponseEvent::Done,
        ],
    ]);
    let (agent, mut rx) = new_agent(provider, AgentConfig::default());

    let result = agent.run(Some("check disk usage".to_string())).await.unwrap();
    assert_eq!(result, "disk usage looks fine");

    let mut saw_confirm = false;
    let mut saw_tool_calls = 0;
    while let Ok(ev) = rx.try_recv() {
        match ev {
            AgentEvent::OnNeedConfirm { .. } => saw_confirm = true,
            AgentEvent::OnStep { step, .. } if step.kind == helm_core::StepKind::ToolCall => saw_tool_calls += 1,
            _ => {}
        }
    }
    assert!(!saw_confirm, "safe commands must never require confirmation");
    assert_eq!(saw_tool_calls, 2);
}

/// S2: a moderate command is auto-fixed and auto-executed under the default
/// config, but requires exactly one confirmation when
/// `auto_execute_moderate` is disabled.
#[tokio::test]
async fn s2_install_autofixed_without_confirmation_by_default() {
    let provider = ScriptedMockProvider::tool_then_text(
        "call-1",
        "execute_command",
        json!({"command": "apt install htop"}).to_string(),
        "htop installed",
    );
    let (agent, mut rx) = new_agent(provider, AgentConfig::default());

    let result = agent.run(Some("install htop".to_string())).await.unwrap();
    assert_eq!(result, "htop installed");

    let mut saw_confirm = false;
    while let Ok(ev) = rx.try_recv() {
        if matches!(ev, AgentEvent::OnNeedConfirm { .. }) {
            saw_confirm = true;
        }
    }
    assert!(!saw_confirm);
}

#[tokio::test]
async fn s2_install_requires_confirmation_when_auto_execute_moderate_disabled() {
    let provider = ScriptedMockProvider::tool_then_text(
        "call-1",
        "execute_command",
        json!({"command": "apt install htop"}).to_string(),
        "htop installed",
    );
    let config = AgentConfig { auto_execute_moderate: false, ..AgentConfig::default() };
    let (agent, mut rx) = new_agent(provider, config);
    let agent = Arc::new(agent);
    let run_agent = agent.clone();
    let handle = tokio::spawn(async move { run_agent.run(Some("install htop".to_string())).await });

    let mut confirmations = 0;
    while let Some(ev) = rx.recv().await {
        if let AgentEvent::OnNeedConfirm { .. } = ev {
            confirmations += 1;
            agent.resolve_confirmation(true, None).await;
        }
        if confirmations > 0 {
            break;
        }
    }
    let result = handle.await.unwrap().unwrap();
    assert_eq!(result, "htop installed");
    assert_eq!(confirmations, 1, "exactly one on_need_confirm expected");
}

/// S3: a dangerous command is rejected by the user; the run continues and
/// ends with assistant text only, never panicking or aborting outright.
#[tokio::test]
async fn s3_dangerous_command_rejected_ends_with_assistant_text() {
    let provider = ScriptedMockProvider::tool_then_text(
        "call-1",
        "execute_command",
        json!({"command": "rm -rf /var/log/app/*"}).to_string(),
        "understood, leaving the logs alone",
    );
    let (agent, mut rx) = new_agent(provider, AgentConfig::default());
    let agent = Arc::new(agent);
    let run_agent = agent.clone();
    let handle = tokio::spawn(async move { run_agent.run(None).await });

    let mut rejected_result: Option<String> = None;
    while let Some(ev) = rx.recv().await {
        match ev {
            AgentEvent::OnNeedConfirm { confirmation, .. } => {
                assert_eq!(confirmation.risk_level, Some(helm_tools::RiskLevel::Dangerous));
                agent.resolve_confirmation(false, None).await;
            }
            AgentEvent::OnStep { step, .. } if step.kind == helm_core::StepKind::ToolResult => {
                rejected_result = step.tool_result.clone();
            }
            AgentEvent::OnComplete { .. } => break,
            _ => {}
        }
    }

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result, "understood, leaving the logs alone");
    assert!(rejected_result.unwrap_or_default().to_lowercase().contains("reject"));
}

/// S6: a long run (60 turns) well over the compression budget is squeezed
/// back under budget, preserving the system message verbatim, the last
/// three turn-groups verbatim, and inserting exactly one synthetic summary.
#[test]
fn s6_long_session_compresses_under_budget() {
    let mut session = Session::new("s1", 32_000);
    session.push(Message::system("you are a terminal assistant"));
    for i in 0..60 {
        session.push(Message::user(format!("turn {i}: {}", "x".repeat(850))));
        session.push(Message::assistant(format!("completed: step {i} done {}", "y".repeat(850))));
    }
    assert!(session.over_compression_budget());
    let budget = session.compression_budget();
    assert_eq!(budget, 25_600);

    let compressed = helm_core::compact_session(&session.messages, budget);
    session.replace_messages(compressed);

    assert!(
        session.token_count <= budget,
        "compaction must bring the session back under its budget, got {}",
        session.token_count
    );
    assert_eq!(session.messages[0].as_text().unwrap(), "you are a terminal assistant");

    let summaries = session
        .messages
        .iter()
        .filter(|m| m.as_text().unwrap_or("").contains("Summary of earlier progress"))
        .count();
    assert_eq!(summaries, 1, "exactly one synthetic summary message expected");

    let texts: Vec<&str> = session.messages.iter().filter_map(Message::as_text).collect();
    assert!(texts.iter().any(|t| t.contains("turn 59")));
    assert!(texts.iter().any(|t| t.contains("turn 58")));
    assert!(texts.iter().any(|t| t.contains("turn 57")));
}
