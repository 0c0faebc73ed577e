// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-tool approval defaults.
//!
//! `execute_command`'s actual confirmation decision is computed per-call
//! from the risk classifier and the agent's `strict_mode`/`auto_execute_*`
//! flags (C6, SPEC_FULL.md §4.6) — it never consults a static
//! [`ApprovalPolicy`]. Other tools declare one fixed policy for their whole
//! lifetime.

/// Per-tool approval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Always run without asking.
    Auto,
    /// Ask the user before each invocation.
    Ask,
    /// Never run; return an error.
    Deny,
}
