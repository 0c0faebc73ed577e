// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The append-only conversation history backing one agent run (SPEC_FULL.md
//! §3 `AgentRun.messages`), plus the token-budget accounting [`crate::compact`]
//! reads to decide when to compress it.

use helm_model::Message;

/// A session's message history and running token estimate.
///
/// `max_tokens` is the active model profile's configured context length
/// (default 32 000 per SPEC_FULL.md §4.8.1); the compression budget is 80%
/// of it.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub messages: Vec<Message>,
    pub token_count: usize,
    pub max_tokens: usize,
}

impl Session {
    pub fn new(id: impl Into<String>, max_tokens: usize) -> Self {
        Self { id: id.into(), messages: Vec::new(), token_count: 0, max_tokens }
    }

    pub fn push(&mut self, msg: Message) {
        self.token_count += msg.approx_tokens();
        self.messages.push(msg);
    }

    pub fn push_many(&mut self, msgs: impl IntoIterator<Item = Message>) {
        for m in msgs {
            self.push(m);
        }
    }

    /// Fraction of `max_tokens` currently used, in `[0.0, +inf)`.
    pub fn context_fraction(&self) -> f64 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        self.token_count as f64 / self.max_tokens as f64
    }

    /// `true` once usage crosses `threshold` (a fraction of `max_tokens`,
    /// e.g. `0.8` for the compression budget).
    pub fn is_near_limit(&self, threshold: f64) -> bool {
        self.context_fraction() >= threshold
    }

    /// Recompute `token_count` from scratch. Call after replacing history
    /// in place rather than through `push`/`push_many`.
    pub fn recalculate_tokens(&mut self) {
        self.token_count = self.messages.iter().map(Message::approx_tokens).sum();
    }

    /// Replace the whole message list (e.g. with a compressed version) and
    /// recompute the token count.
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.recalculate_tokens();
    }

    /// The compression budget: 80% of `max_tokens` (SPEC_FULL.md §4.8.1).
    pub fn compression_budget(&self) -> usize {
        (self.max_tokens as f64 * 0.8) as usize
    }

    pub fn over_compression_budget(&self) -> bool {
        self.token_count > self.compression_budget()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
