// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::context::ToolContext;
use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a file to the local filesystem, overwriting it if it already exists. \
         Creates parent directories automatically. Set append=true to add to the end \
         of an existing file instead."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute or relative path to the file" },
                "content": { "type": "string", "description": "Content to write" },
                "append": {
                    "type": "boolean",
                    "description": "If true, append instead of overwriting (default false)"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        // write_file is always moderate: the confirmation decision is made by
        // the C6 executor (SPEC_FULL.md §4.6), this default is just a fallback
        // for callers that only consult the static policy.
        ApprovalPolicy::Ask
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(Value::as_str) else {
            return ToolOutput::err(&call.id, "missing required argument: path");
        };
        let Some(content) = call.args.get("content").and_then(Value::as_str) else {
            return ToolOutput::err(&call.id, "missing required argument: content");
        };
        let append = call.args.get("append").and_then(Value::as_bool).unwrap_or(false);

        debug!(path = %path, append, "write_file tool");

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
        }

        if append {
            use tokio::io::AsyncWriteExt;
            match tokio::fs::OpenOptions::new().append(true).create(true).open(path).await {
                Ok(mut f) => {
                    let result = f.write_all(content.as_bytes()).await;
                    let _ = f.flush().await;
                    let _ = f.shutdown().await;
                    match result {
                        Ok(()) => ToolOutput::ok(&call.id, format!("appended {} bytes to {path}", content.len())),
                        Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
                    }
                }
                Err(e) => ToolOutput::err(&call.id, format!("open error: {e}")),
            }
        } else {
            match tokio::fs::write(path, content).await {
                Ok(()) => ToolOutput::ok(&call.id, format!("wrote {} bytes to {path}", content.len())),
                Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
            }
        }
    }
}
