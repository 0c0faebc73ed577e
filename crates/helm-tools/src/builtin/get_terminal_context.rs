// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `get_terminal_context`: recent terminal output, for re-orienting after a
//! gap (a reflection pause, a long fire-and-forget command) without
//! re-running anything.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

const DEFAULT_LINES: usize = 50;
const MAX_LINES: usize = 500;

pub struct GetTerminalContextTool;

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[async_trait]
impl Tool for GetTerminalContextTool {
    fn name(&self) -> &str {
        "get_terminal_context"
    }

    fn description(&self) -> &str {
        "Return the tail of the terminal's recent output (current or most recently \
         completed command) without running anything new."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "lines": {
                    "type": "integer",
                    "description": "how many trailing lines to return (default 50, max 500)"
                }
            }
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::HeadTail
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let lines = call
            .args
            .get("lines")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).min(MAX_LINES))
            .unwrap_or(DEFAULT_LINES);

        let state = ctx.state.lock().await;
        let output = if let Some(exec) = &state.current_execution {
            format!("running: {}\n{}", exec.command, exec.output)
        } else if let Some(exec) = state.execution_history.back() {
            format!("last command: {}\n{}", exec.command, exec.output)
        } else {
            String::new()
        };

        ToolOutput::ok(&call.id, tail_lines(&output, lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_lines_keeps_trailing_n() {
        let text = (0..10).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        assert_eq!(tail_lines(&text, 3), "7\n8\n9");
    }

    #[test]
    fn tail_lines_shorter_than_n_returns_all() {
        assert_eq!(tail_lines("a\nb", 10), "a\nb");
    }
}
