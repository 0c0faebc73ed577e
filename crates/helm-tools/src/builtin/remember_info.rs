// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `remember_info` (§4.2/§4.6): append a durable path fact to the host
//! profile. Rejects facts that look dynamic (ports, PIDs, percentages) since
//! those are stale the moment they are written.

use async_trait::async_trait;
use serde_json::{json, Value};

use helm_term::looks_dynamic;

use crate::context::ToolContext;
use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct RememberInfoTool;

#[async_trait]
impl Tool for RememberInfoTool {
    fn name(&self) -> &str {
        "remember_info"
    }

    fn description(&self) -> &str {
        "Remember a stable fact about this host for later in the conversation — \
         where a project, config, or log file lives. Only facts that include a \
         path are accepted; dynamic details (ports, PIDs, percentages) are refused \
         since they are stale as soon as they are written down."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "note": {
                    "type": "string",
                    "description": "a short fact including a path, e.g. 'nginx config lives at /etc/nginx/nginx.conf'"
                }
            },
            "required": ["note"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let Some(note) = call.args.get("note").and_then(Value::as_str) else {
            return ToolOutput::err(&call.id, "missing required argument: note");
        };

        if !note.contains('/') && !note.contains('\\') {
            return ToolOutput::err(&call.id, "refused: note does not mention a path");
        }
        if looks_dynamic(note) {
            return ToolOutput::err(&call.id, "refused: note looks like dynamic, non-durable information");
        }

        let mut profile = ctx.host_profile.lock().await;
        profile.remember(note.to_string());
        ToolOutput::ok(&call.id, format!("remembered: {note}"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::builtin::test_support::null_driver;
    use helm_term::{HostProfile, TerminalKind, TerminalState};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    fn ctx() -> ToolContext {
        ToolContext::new(
            null_driver(),
            Arc::new(Mutex::new(TerminalState::new("t", TerminalKind::Local, "/tmp"))),
            Duration::from_secs(30),
            Arc::new(Mutex::new(HostProfile::new("t"))),
        )
    }

    fn call(note: &str) -> ToolCall {
        ToolCall { id: "r1".into(), name: "remember_info".into(), args: json!({"note": note}) }
    }

    #[tokio::test]
    async fn remembers_path_fact() {
        let c = ctx();
        let out = RememberInfoTool.execute(&call("app source is at /srv/app/src"), &c).await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(c.host_profile.lock().await.notes.len(), 1);
    }

    #[tokio::test]
    async fn rejects_note_without_path() {
        let out = RememberInfoTool.execute(&call("the server is healthy"), &ctx()).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn rejects_dynamic_info() {
        let out = RememberInfoTool.execute(&call("server listening on port 8080 at /srv/app"), &ctx()).await;
        assert!(out.is_error);
    }
}
