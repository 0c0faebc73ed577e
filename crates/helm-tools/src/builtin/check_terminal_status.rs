// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `check_terminal_status` (C5): is the terminal idle, busy, stuck, or
//! waiting on the user — computed without running anything.

use async_trait::async_trait;
use serde_json::{json, Value};

use helm_term::{classify_process, synthesize, EnvironmentContext, OverallStatus};

use crate::context::ToolContext;
use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct CheckTerminalStatusTool;

fn status_label(status: OverallStatus) -> &'static str {
    match status {
        OverallStatus::Idle => "idle",
        OverallStatus::Busy => "busy",
        OverallStatus::Stuck => "stuck",
        OverallStatus::WaitingInput => "waiting_input",
    }
}

#[async_trait]
impl Tool for CheckTerminalStatusTool {
    fn name(&self) -> &str {
        "check_terminal_status"
    }

    fn description(&self) -> &str {
        "Report whether the terminal is idle, busy, possibly stuck, or waiting for \
         user input, with a suggestion for what to do next."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let kind = ctx.terminal.kind();
        let local = ctx.terminal.get_terminal_status().await;
        let remote = ctx.terminal.get_remote_processes().await;

        let (command, tail) = {
            let state = ctx.state.lock().await;
            match &state.current_execution {
                Some(exec) => (Some(exec.command.clone()), exec.output.clone()),
                None => (None, String::new()),
            }
        };

        let rates = {
            let mut tracker = ctx.rate_tracker.lock().await;
            tracker.record(tail.lines().count(), tail.len());
            tracker.rates()
        };

        let process = classify_process(kind, command.as_deref(), Some(&local), remote.as_ref(), rates);
        let input_wait = {
            let mut cache = ctx.input_wait_cache.lock().await;
            cache.get_or_compute(&tail)
        };

        let awareness = synthesize(process, input_wait, EnvironmentContext::default());

        ToolOutput::ok(
            &call.id,
            format!("status: {}\n{}", status_label(awareness.status), awareness.suggestion),
        )
    }
}
