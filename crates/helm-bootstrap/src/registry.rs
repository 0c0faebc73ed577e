// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Centralised tool-registry builder.
//!
//! The single canonical place where the seven builtin tools are wired up.
//! Adding a tool means registering it here once.

use helm_tools::{
    CheckTerminalStatusTool, ExecuteCommandTool, GetTerminalContextTool, ReadFileTool,
    RememberInfoTool, SendControlKeyTool, ToolRegistry, WriteFileTool,
};

/// Build the [`ToolRegistry`] used by every agent run — there is only one
/// profile; no research/plan mode or sub-agent nesting exists to gate tool
/// visibility.
pub fn build_tool_registry() -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register(ExecuteCommandTool);
    reg.register(ReadFileTool);
    reg.register(WriteFileTool);
    reg.register(GetTerminalContextTool);
    reg.register(CheckTerminalStatusTool);
    reg.register(SendControlKeyTool);
    reg.register(RememberInfoTool);
    reg
}
