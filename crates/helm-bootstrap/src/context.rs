// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Runtime context for agent construction.
//!
//! Narrowed to what [`crate::agent::AgentBuilder`] actually needs to wire a
//! run: prompt overrides. No project/git/CI detection exists in this spec —
//! the agent drives a terminal, not a checked-out repository.

/// Caller-supplied prompt overrides, converted into
/// [`helm_core::AgentRuntimeContext`] by [`crate::agent::AgentBuilder`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeContext {
    /// Text appended verbatim after the default system prompt.
    pub append_system_prompt: Option<String>,
    /// Replaces the whole generated system prompt when set.
    pub system_prompt_override: Option<String>,
}

impl RuntimeContext {
    pub fn empty() -> Self {
        Self::default()
    }
}
