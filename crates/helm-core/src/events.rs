// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Observable events and the append-only step log (SPEC_FULL.md §3
//! `AgentStep`, §6 "Observable events").

use chrono::{DateTime, Utc};
use helm_tools::RiskLevel;
use serde_json::Value;

/// The kind of an [`AgentStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Thinking,
    Message,
    ToolCall,
    ToolResult,
    Confirm,
    UserSupplement,
    Error,
}

/// An append-only log record (SPEC_FULL.md §3 `AgentStep`, invariant I1):
/// once appended, a step's `id` never changes, though a `Message` step's
/// `content` may be extended in place while `is_streaming` is `true`.
#[derive(Debug, Clone)]
pub struct AgentStep {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: StepKind,
    pub content: String,
    pub tool_name: Option<String>,
    pub tool_args: Option<Value>,
    pub tool_result: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub is_streaming: Option<bool>,
}

impl AgentStep {
    pub fn new(id: impl Into<String>, kind: StepKind, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            kind,
            content: content.into(),
            tool_name: None,
            tool_args: None,
            tool_result: None,
            risk_level: None,
            is_streaming: None,
        }
    }

    pub fn with_tool(mut self, name: impl Into<String>, args: Value) -> Self {
        self.tool_name = Some(name.into());
        self.tool_args = Some(args);
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = Some(risk);
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.tool_result = Some(result.into());
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.is_streaming = Some(streaming);
        self
    }
}

/// A snapshot of a pending confirmation, for delivery to the hosting process.
///
/// This mirrors `PendingConfirmation` (SPEC_FULL.md §3) minus the resolver
/// channel, which is not meaningfully observable outside the agent loop.
#[derive(Debug, Clone)]
pub struct PendingConfirmationInfo {
    pub tool_call_id: String,
    pub tool_name: String,
    pub tool_args: Value,
    pub risk_level: Option<RiskLevel>,
}

/// Observable events emitted to the hosting process (SPEC_FULL.md §6).
///
/// Delivered over a `tokio::sync::mpsc` channel per run, one hosting-process
/// subscriber per run, matching on variant.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Every append / streaming update to the step log.
    OnStep { agent_id: String, step: AgentStep },
    /// A pending confirmation has been posted and is awaiting resolution.
    OnNeedConfirm { agent_id: String, confirmation: PendingConfirmationInfo },
    /// Normal termination.
    OnComplete { agent_id: String, final_text: String },
    /// Abnormal termination other than user abort.
    OnError { agent_id: String, error: String },
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_step_builder_sets_fields() {
        let step = AgentStep::new("s1", StepKind::ToolCall, "running")
            .with_tool("execute_command", json!({"command": "ls"}))
            .with_risk(RiskLevel::Safe)
            .with_result("ok")
            .streaming(false);
        assert_eq!(step.tool_name.as_deref(), Some("execute_command"));
        assert_eq!(step.risk_level, Some(RiskLevel::Safe));
        assert_eq!(step.tool_result.as_deref(), Some("ok"));
        assert_eq!(step.is_streaming, Some(false));
    }

    #[test]
    fn agent_step_defaults_are_none() {
        let step = AgentStep::new("s1", StepKind::Message, "hi");
        assert!(step.tool_name.is_none());
        assert!(step.risk_level.is_none());
        assert!(step.is_streaming.is_none());
    }

    #[test]
    fn on_complete_carries_final_text() {
        let ev = AgentEvent::OnComplete { agent_id: "a1".into(), final_text: "done".into() };
        match ev {
            AgentEvent::OnComplete { final_text, .. } => assert_eq!(final_text, "done"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn on_need_confirm_carries_risk_level() {
        let ev = AgentEvent::OnNeedConfirm {
            agent_id: "a1".into(),
            confirmation: PendingConfirmationInfo {
                tool_call_id: "c1".into(),
                tool_name: "execute_command".into(),
                tool_args: json!({}),
                risk_level: Some(RiskLevel::Dangerous),
            },
        };
        match ev {
            AgentEvent::OnNeedConfirm { confirmation, .. } => {
                assert_eq!(confirmation.risk_level, Some(RiskLevel::Dangerous));
            }
            _ => panic!("wrong variant"),
        }
    }
}
