// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `execute_command` (C2/C6): the agent's one way to run a shell command,
//! gated by the risk classifier (C1).

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::sleep;

use helm_term::TerminalState;

use crate::builtin::send_control_key::parse_key;
use crate::classifier::{classify, is_privileged, CommandHandling, RiskLevel};
use crate::context::ToolContext;
use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

pub struct ExecuteCommandTool;

fn risk_label(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Safe => "safe",
        RiskLevel::Moderate => "moderate",
        RiskLevel::Dangerous => "dangerous",
        RiskLevel::Blocked => "blocked",
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Run a shell command in the driven terminal session and return its output. \
         Commands are risk-classified before running; destructive patterns are refused \
         and a few common mistakes (missing `-y`, unbounded `ping`, interactive pagers) \
         are rewritten automatically."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "the shell command to run" }
            },
            "required": ["command"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::HeadTail
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let Some(command) = call.args.get("command").and_then(Value::as_str) else {
            return ToolOutput::err(&call.id, "missing required argument: command");
        };

        let (risk, handling) = classify(command);

        if let CommandHandling::Block { reason, hint } = &handling {
            return ToolOutput::err(&call.id, format!("blocked: {reason}\nhint: {hint}"));
        }

        let effective_command = match &handling {
            CommandHandling::AutoFix { rewritten } => rewritten.clone(),
            _ => command.to_string(),
        };

        if is_privileged(&effective_command) {
            tracing::info!(command = %effective_command, "command requests elevated privileges");
        }

        if let CommandHandling::FireAndForget { hint } = &handling {
            return match ctx.terminal.write(&format!("{effective_command}\n")).await {
                Ok(()) => {
                    let mut state = ctx.state.lock().await;
                    state.last_command = Some(effective_command.clone());
                    state.is_idle = false;
                    ToolOutput::ok(
                        &call.id,
                        format!(
                            "[{}] started in the background (does not terminate on its own): {effective_command}\n{hint}",
                            risk_label(risk)
                        ),
                    )
                }
                Err(e) => ToolOutput::err(&call.id, format!("failed to write to terminal: {e}")),
            };
        }

        let timeout = match &handling {
            CommandHandling::TimedExecution { duration, .. } => *duration,
            _ => ctx.command_timeout,
        };

        {
            let mut state = ctx.state.lock().await;
            state.start_command_execution(&effective_command);
        }

        let predicted_cwd = {
            let state = ctx.state.lock().await;
            state.predict_cwd_change(&effective_command)
        };

        let outcome = ctx.terminal.execute_in_terminal(&effective_command, timeout).await;

        if let CommandHandling::TimedExecution { stop_key, .. } = &handling {
            match parse_key(stop_key) {
                Some(key) => {
                    if let Err(e) = ctx.terminal.send_control(key).await {
                        tracing::warn!(stop_key, error = %e, "failed to send stop key after timed execution window");
                    }
                }
                None => tracing::warn!(stop_key, "timed execution stop key does not map to a known control key"),
            }
        }

        {
            let mut state = ctx.state.lock().await;
            state.append_output(&outcome.output);
            state.complete_command_execution(None);
        }

        if let Some(predicted) = predicted_cwd {
            sleep(TerminalState::cwd_prediction_delay()).await;
            let real_cwd = ctx.terminal.get_cwd().await;
            let mut state = ctx.state.lock().await;
            state.set_cwd(real_cwd.unwrap_or(predicted));
        }

        let mut prefix = format!("[{}]", risk_label(risk));
        if let CommandHandling::AutoFix { rewritten } = &handling {
            prefix = format!("{prefix} rewritten to: {rewritten}");
        }
        if outcome.timed_out {
            prefix = format!("{prefix} [timed out after {:?}]", timeout);
        }

        ToolOutput::ok(&call.id, format!("{prefix}\n{}", outcome.output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_labels_are_lowercase() {
        assert_eq!(risk_label(RiskLevel::Safe), "safe");
        assert_eq!(risk_label(RiskLevel::Blocked), "blocked");
    }
}
