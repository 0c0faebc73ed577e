// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Hard byte ceiling; a head+tail window is kept when a file exceeds it so
/// the model still sees both ends of a large file.
const MAX_BYTES: usize = 20_000;
const HEAD_BYTES: usize = 12_000;
const TAIL_BYTES: usize = 6_000;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the local filesystem. Files larger than 20 KB are \
         returned as a head/tail window with a truncation marker in between."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute or relative path to the file" }
            },
            "required": ["path"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::FileContent
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(Value::as_str) else {
            return ToolOutput::err(&call.id, "missing required argument: path");
        };

        match tokio::fs::read_to_string(path).await {
            Ok(content) => ToolOutput::ok(&call.id, truncate(&content)),
            Err(e) => ToolOutput::err(&call.id, format!("failed to read {path}: {e}")),
        }
    }
}

fn truncate(content: &str) -> String {
    if content.len() <= MAX_BYTES {
        return content.to_string();
    }
    let head = &content[..HEAD_BYTES.min(content.len())];
    let tail_start = content.len().saturating_sub(TAIL_BYTES);
    let tail = &content[tail_start..];
    format!("{head}\n… [truncated {} bytes] …\n{tail}", content.len() - HEAD_BYTES - TAIL_BYTES)
}
