// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! [`AgentBuilder`] — single entry point for constructing a fully wired
//! [`Agent`].
//!
//! Callers pass a [`Config`] and a terminal driver; the builder resolves the
//! model provider, builds the tool registry and shared [`ToolContext`], and
//! constructs the [`Agent`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use helm_config::Config;
use helm_core::{Agent, AgentEvent, AgentRuntimeContext, Session};
use helm_model::ModelProvider;
use helm_term::{HostProfile, TerminalDriver, TerminalState};
use helm_tools::ToolContext;

use crate::context::RuntimeContext;
use crate::registry::build_tool_registry;

/// Constructs a fully wired [`Agent`] from configuration and a terminal
/// driver.
pub struct AgentBuilder {
    config: Arc<Config>,
    runtime_ctx: RuntimeContext,
}

impl AgentBuilder {
    /// Create a builder with the given configuration. Prompt overrides
    /// default to empty.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config, runtime_ctx: RuntimeContext::empty() }
    }

    pub fn with_runtime_context(mut self, ctx: RuntimeContext) -> Self {
        self.runtime_ctx = ctx;
        self
    }

    /// Build the [`Agent`] against `terminal`, an already-connected local
    /// shell or SSH session. `host_id` names the host for [`HostProfile`]
    /// and [`TerminalState`]; `initial_cwd` seeds the tracked working
    /// directory before the first `cd` is observed.
    pub fn build(
        self,
        terminal: Arc<dyn TerminalDriver>,
        host_id: impl Into<String>,
        initial_cwd: impl Into<String>,
    ) -> anyhow::Result<(Agent, mpsc::UnboundedReceiver<AgentEvent>)> {
        let host_id = host_id.into();
        let kind = terminal.kind();

        let model = Arc::from(helm_model::from_config(&self.config.model)?);
        let tools = Arc::new(build_tool_registry());

        let state = Arc::new(Mutex::new(TerminalState::new(host_id.clone(), kind, initial_cwd)));
        let host_profile = Arc::new(Mutex::new(HostProfile::new(host_id.clone())));
        let command_timeout = Duration::from_millis(self.config.agent.command_timeout_ms);
        let tool_ctx = ToolContext::new(terminal, state, command_timeout, host_profile);

        let context_window = model.catalog_context_window().unwrap_or(32_000) as usize;
        let session = Session::new(host_id.clone(), context_window);

        let runtime = AgentRuntimeContext {
            append_system_prompt: self.runtime_ctx.append_system_prompt,
            system_prompt_override: self.runtime_ctx.system_prompt_override,
        };

        Ok(Agent::new(host_id, session, tools, tool_ctx, model, self.config.agent.clone(), runtime))
    }
}
