// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod classifier;
pub mod context;
pub mod policy;
pub mod registry;
pub mod tool;

pub use classifier::{classify, is_privileged, CommandHandling, RiskLevel};
pub use context::ToolContext;
pub use policy::ApprovalPolicy;
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{OutputCategory, Tool, ToolCall, ToolOutput, ToolOutputPart};

pub use builtin::check_terminal_status::CheckTerminalStatusTool;
pub use builtin::execute_command::ExecuteCommandTool;
pub use builtin::get_terminal_context::GetTerminalContextTool;
pub use builtin::read_file::ReadFileTool;
pub use builtin::remember_info::RememberInfoTool;
pub use builtin::send_control_key::SendControlKeyTool;
pub use builtin::write_file::WriteFileTool;
