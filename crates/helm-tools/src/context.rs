// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared state handed to every tool invocation: the terminal session a
//! tool call acts on, plus the sensing caches layered on top of it.

use std::sync::Arc;
use std::time::Duration;

use helm_term::{HostProfile, InputWaitCache, RateTracker, TerminalDriver, TerminalState};
use tokio::sync::Mutex;

/// Everything a builtin tool needs besides its own arguments.
///
/// One `ToolContext` is built per driven terminal session (local shell or
/// SSH connection) and shared across every tool call made against it.
#[derive(Clone)]
pub struct ToolContext {
    pub terminal: Arc<dyn TerminalDriver>,
    pub state: Arc<Mutex<TerminalState>>,
    pub input_wait_cache: Arc<Mutex<InputWaitCache>>,
    pub rate_tracker: Arc<Mutex<RateTracker>>,
    pub host_profile: Arc<Mutex<HostProfile>>,
    pub command_timeout: Duration,
}

impl ToolContext {
    pub fn new(
        terminal: Arc<dyn TerminalDriver>,
        state: Arc<Mutex<TerminalState>>,
        command_timeout: Duration,
        host_profile: Arc<Mutex<HostProfile>>,
    ) -> Self {
        Self {
            terminal,
            state,
            input_wait_cache: Arc::new(Mutex::new(InputWaitCache::default())),
            rate_tracker: Arc::new(Mutex::new(RateTracker::default())),
            host_profile,
            command_timeout,
        }
    }
}
