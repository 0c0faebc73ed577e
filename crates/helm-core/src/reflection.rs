// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Reflection and strategy switching (SPEC_FULL.md §4.8.2, §3 `ReflectionState`).
//!
//! Tracks how the run is going across tool calls and decides when the agent
//! should pause and reconsider its approach. Has no counterpart in the
//! teacher codebase — built directly from the spec.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Cooldown between automatic strategy switches.
pub const STRATEGY_SWITCH_COOLDOWN: Duration = Duration::from_secs(30);

/// Force a reflection pause after this many tool calls since the last one,
/// even with no detected issue.
pub const REFLECTION_TOOL_CALL_INTERVAL: u32 = 10;

/// Window over which `frequent_strategy_changes` counts switches.
const STRATEGY_CHANGE_WINDOW: Duration = Duration::from_secs(60);
const FREQUENT_STRATEGY_CHANGE_THRESHOLD: usize = 3;

const COMMAND_RING_CAPACITY: usize = 5;
const CONSECUTIVE_FAILURE_THRESHOLD: u32 = 3;
const HIGH_FAILURE_RATE_MIN_ATTEMPTS: u32 = 5;
const HIGH_FAILURE_RATE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Default,
    Conservative,
    Aggressive,
    Diagnostic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issue {
    CommandLoop,
    ConsecutiveFailures,
    HighFailureRate,
    FrequentStrategyChanges,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QualityScore {
    pub success_rate: f64,
    pub efficiency: f64,
    pub adaptability: f64,
    pub overall: f64,
}

#[derive(Debug, Clone)]
struct StrategySwitch {
    at: Instant,
    to: Strategy,
}

/// Per-run reflection bookkeeping (SPEC_FULL.md §3 `ReflectionState`).
#[derive(Debug, Clone)]
pub struct ReflectionState {
    pub tool_call_count: u32,
    pub consecutive_failures: u32,
    pub total_failures: u32,
    pub success_count: u32,
    recent_commands: VecDeque<String>,
    pub last_reflection_at: u32,
    pub current_strategy: Strategy,
    strategy_switches: Vec<StrategySwitch>,
    pub detected_issues: Vec<Issue>,
    pub applied_fixes: Vec<String>,
    pub quality_score: QualityScore,
    last_switch_at: Option<Instant>,
}

impl Default for ReflectionState {
    fn default() -> Self {
        Self {
            tool_call_count: 0,
            consecutive_failures: 0,
            total_failures: 0,
            success_count: 0,
            recent_commands: VecDeque::with_capacity(COMMAND_RING_CAPACITY),
            last_reflection_at: 0,
            current_strategy: Strategy::Default,
            strategy_switches: Vec::new(),
            detected_issues: Vec::new(),
            applied_fixes: Vec::new(),
            quality_score: QualityScore::default(),
            last_switch_at: None,
        }
    }
}

impl ReflectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one tool call (§4.8.2's counter-update step).
    /// `command` is `Some` only for `execute_command` calls.
    pub fn record_tool_call(&mut self, success: bool, command: Option<&str>) {
        self.tool_call_count += 1;
        if success {
            self.success_count += 1;
            self.consecutive_failures = 0; // I4
        } else {
            self.consecutive_failures += 1;
            self.total_failures += 1;
        }
        if let Some(cmd) = command {
            if self.recent_commands.len() == COMMAND_RING_CAPACITY {
                self.recent_commands.pop_front();
            }
            self.recent_commands.push_back(cmd.to_string());
        }
        self.detect_issues();
        self.recompute_quality_score();
    }

    fn attempts(&self) -> u32 {
        self.success_count + self.total_failures
    }

    fn command_loop_detected(&self) -> bool {
        let cmds: Vec<&String> = self.recent_commands.iter().collect();
        if cmds.len() >= 3 && cmds[cmds.len() - 3..].iter().all(|c| *c == cmds[cmds.len() - 1]) {
            return true;
        }
        if cmds.len() >= 4 {
            let n = cmds.len();
            return cmds[n - 4] == cmds[n - 2] && cmds[n - 3] == cmds[n - 1];
        }
        false
    }

    fn frequent_strategy_changes(&self, now: Instant) -> bool {
        self.strategy_switches
            .iter()
            .filter(|s| now.saturating_duration_since(s.at) <= STRATEGY_CHANGE_WINDOW)
            .count()
            >= FREQUENT_STRATEGY_CHANGE_THRESHOLD
    }

    fn detect_issues(&mut self) {
        let now = Instant::now();
        let mut issues = Vec::new();
        if self.command_loop_detected() {
            issues.push(Issue::CommandLoop);
        }
        if self.consecutive_failures >= CONSECUTIVE_FAILURE_THRESHOLD {
            issues.push(Issue::ConsecutiveFailures);
        }
        let attempts = self.attempts();
        if attempts >= HIGH_FAILURE_RATE_MIN_ATTEMPTS
            && (self.total_failures as f64 / attempts as f64) > HIGH_FAILURE_RATE_THRESHOLD
        {
            issues.push(Issue::HighFailureRate);
        }
        if self.frequent_strategy_changes(now) {
            issues.push(Issue::FrequentStrategyChanges);
        }
        self.detected_issues = issues;
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_switch_at {
            Some(last) => now.saturating_duration_since(last) >= STRATEGY_SWITCH_COOLDOWN,
            None => true,
        }
    }

    /// Apply the strategy-switch decision table (§4.8.2). Returns the new
    /// strategy if a switch happened.
    pub fn maybe_switch_strategy(&mut self) -> Option<Strategy> {
        let now = Instant::now();
        if !self.cooldown_elapsed(now) {
            return None;
        }

        let has = |issue: Issue| self.detected_issues.contains(&issue);

        let next = if has(Issue::ConsecutiveFailures) && self.current_strategy != Strategy::Conservative {
            Some(Strategy::Conservative)
        } else if has(Issue::CommandLoop) && self.current_strategy != Strategy::Diagnostic {
            Some(Strategy::Diagnostic)
        } else if has(Issue::HighFailureRate) && self.current_strategy == Strategy::Aggressive {
            Some(Strategy::Conservative)
        } else if self.detected_issues.is_empty()
            && self.current_strategy == Strategy::Conservative
            && self.success_count >= 3
            && self.total_failures == 0
        {
            Some(Strategy::Default)
        } else {
            None
        };

        if let Some(strategy) = next {
            self.current_strategy = strategy;
            self.last_switch_at = Some(now);
            self.strategy_switches.push(StrategySwitch { at: now, to: strategy });
        }
        next
    }

    /// `true` when reflection should trigger this turn (§4.8.2).
    pub fn should_reflect(&self) -> bool {
        !self.detected_issues.is_empty()
            || self.tool_call_count.saturating_sub(self.last_reflection_at) >= REFLECTION_TOOL_CALL_INTERVAL
    }

    /// Mark reflection as having just run: resets `consecutive_failures`
    /// and the reflection-interval counter.
    pub fn mark_reflected(&mut self) {
        self.last_reflection_at = self.tool_call_count;
        self.consecutive_failures = 0;
    }

    fn recompute_quality_score(&mut self) {
        let attempts = self.attempts().max(1) as f64;
        let success_rate = self.success_count as f64 / attempts;
        let efficiency = (1.0 - 0.5 * self.total_failures as f64 / attempts).max(0.0);
        let adaptability = if self.total_failures == 0
            && self.last_switch_at.map(|t| t.elapsed() > Duration::from_secs(10)).unwrap_or(true)
        {
            0.9
        } else if self.total_failures > 0 {
            0.5
        } else {
            0.7
        };
        let overall = 0.5 * success_rate + 0.3 * efficiency + 0.2 * adaptability;
        self.quality_score = QualityScore { success_rate, efficiency, adaptability, overall };
    }

    /// Build the reflection prompt text appended as a user message (§4.8.2),
    /// parameterized by the current strategy and detected issues.
    pub fn reflection_prompt(&self) -> String {
        if self.detected_issues.contains(&Issue::CommandLoop)
            && self.current_strategy == Strategy::Diagnostic
        {
            return "You appear to be repeating the same command without making progress. \
                    Stop and diagnose the root cause before trying again: inspect the command's \
                    output carefully, check for an underlying error, and consider a completely \
                    different approach."
                .to_string();
        }
        if self.detected_issues.contains(&Issue::ConsecutiveFailures) {
            return "Several consecutive attempts have failed. Pause, review what went wrong in \
                    each attempt, and switch to a more cautious, incremental approach before \
                    continuing."
                .to_string();
        }
        if self.detected_issues.contains(&Issue::HighFailureRate) {
            return "The overall failure rate for this task is high. Reconsider the strategy: \
                    verify assumptions with read-only checks before making further changes."
                .to_string();
        }
        "Take a moment to reflect on progress so far. If the current approach is not working, \
         try a different approach."
            .to_string()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
