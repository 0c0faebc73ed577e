// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `send_control_key`: send a single control character or short keystroke to
//! the driven terminal — the agent's way to interrupt, confirm, or page.

use async_trait::async_trait;
use serde_json::{json, Value};

use helm_term::ControlKey;

use crate::context::ToolContext;
use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct SendControlKeyTool;

pub(crate) fn parse_key(name: &str) -> Option<ControlKey> {
    match name {
        "ctrl+c" | "ctrl_c" | "sigint" => Some(ControlKey::CtrlC),
        "ctrl+d" | "ctrl_d" | "eof" => Some(ControlKey::CtrlD),
        "ctrl+z" | "ctrl_z" | "sigtstp" => Some(ControlKey::CtrlZ),
        "q" => Some(ControlKey::Q),
        "space" => Some(ControlKey::Space),
        "enter" | "return" => Some(ControlKey::Enter),
        _ => None,
    }
}

#[async_trait]
impl Tool for SendControlKeyTool {
    fn name(&self) -> &str {
        "send_control_key"
    }

    fn description(&self) -> &str {
        "Send a control key to the terminal: ctrl+c, ctrl+d, ctrl+z, q, space, or enter. \
         Use this to interrupt a fire-and-forget command, dismiss a pager, or answer a \
         yes/no prompt."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "enum": ["ctrl+c", "ctrl+d", "ctrl+z", "q", "space", "enter"]
                }
            },
            "required": ["key"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let Some(key_name) = call.args.get("key").and_then(Value::as_str) else {
            return ToolOutput::err(&call.id, "missing required argument: key");
        };
        let Some(key) = parse_key(key_name) else {
            return ToolOutput::err(&call.id, format!("unknown control key: {key_name}"));
        };

        match ctx.terminal.send_control(key).await {
            Ok(()) => ToolOutput::ok(&call.id, format!("sent {key_name}")),
            Err(e) => ToolOutput::err(&call.id, format!("failed to send {key_name}: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys() {
        assert_eq!(parse_key("ctrl+c"), Some(ControlKey::CtrlC));
        assert_eq!(parse_key("enter"), Some(ControlKey::Enter));
    }

    #[test]
    fn rejects_unknown_key() {
        assert_eq!(parse_key("ctrl+alt+del"), None);
    }
}
