// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Runtime context for an agent session.
//!
//! Narrowed to the prompt-override knobs this crate's system prompt (§4.8,
//! [`crate::prompts::system_prompt`]) actually consumes — no project/git/CI
//! detection or skill/subagent discovery exists in this spec.

/// Caller-supplied overrides for system-prompt construction.
#[derive(Debug, Clone, Default)]
pub struct AgentRuntimeContext {
    /// Text appended verbatim after the default prompt body.
    pub append_system_prompt: Option<String>,
    /// Replaces the whole generated system prompt when set.
    pub system_prompt_override: Option<String>,
}

impl AgentRuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_append(mut self, text: impl Into<String>) -> Self {
        self.append_system_prompt = Some(text.into());
        self
    }

    pub fn with_override(mut self, text: impl Into<String>) -> Self {
        self.system_prompt_override = Some(text.into());
        self
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_overrides() {
        let ctx = AgentRuntimeContext::new();
        assert!(ctx.append_system_prompt.is_none());
        assert!(ctx.system_prompt_override.is_none());
    }

    #[test]
    fn with_append_sets_field() {
        let ctx = AgentRuntimeContext::new().with_append("extra rule");
        assert_eq!(ctx.append_system_prompt.as_deref(), Some("extra rule"));
    }

    #[test]
    fn with_override_sets_field() {
        let ctx = AgentRuntimeContext::new().with_override("custom prompt");
        assert_eq!(ctx.system_prompt_override.as_deref(), Some("custom prompt"));
    }
}
