// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Terminal State Tracker (C4): per-session CWD, last command, and bounded
//! execution history.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use crate::driver::TerminalKind;

const MAX_HISTORY: usize = 20;
const MAX_OUTPUT_CHARS: usize = 5_000;
const PWD_CHECK_MIN_INTERVAL: Duration = Duration::from_secs(5);
const CWD_PREDICTION_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CommandExecution {
    pub command: String,
    pub output: String,
    pub exit_code: Option<i32>,
    pub started_at: Instant,
    pub completed_at: Option<Instant>,
}

impl CommandExecution {
    fn append_output(&mut self, chunk: &str) {
        self.output.push_str(chunk);
        if self.output.len() > MAX_OUTPUT_CHARS {
            let cut = self.output.len() - MAX_OUTPUT_CHARS;
            self.output.replace_range(0..cut, "");
            self.output = format!("… [truncated]\n{}", self.output);
        }
    }
}

/// Per-session runtime state (§3 `TerminalState`).
pub struct TerminalState {
    pub id: String,
    pub kind: TerminalKind,
    pub cwd: String,
    pub cwd_updated_at: Instant,
    pub last_command: Option<String>,
    pub last_exit_code: Option<i32>,
    pub is_idle: bool,
    pub last_activity_at: Instant,
    pub current_execution: Option<CommandExecution>,
    pub execution_history: VecDeque<CommandExecution>,
    last_pwd_check: Option<Instant>,
    cd_pattern: Regex,
}

impl TerminalState {
    pub fn new(id: impl Into<String>, kind: TerminalKind, initial_cwd: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            kind,
            cwd: initial_cwd.into(),
            cwd_updated_at: now,
            last_command: None,
            last_exit_code: None,
            is_idle: true,
            last_activity_at: now,
            current_execution: None,
            execution_history: VecDeque::with_capacity(MAX_HISTORY),
            last_pwd_check: None,
            cd_pattern: Regex::new(r"^\s*(?:builtin\s+)?(cd|pushd|popd|z|j)\b\s*(.*)$").unwrap(),
        }
    }

    /// I5: a new execution must not be started while one is still open.
    pub fn start_command_execution(&mut self, command: &str) {
        debug_assert!(self.current_execution.is_none(), "I5: execution already in flight");
        self.is_idle = false;
        self.last_activity_at = Instant::now();
        self.current_execution = Some(CommandExecution {
            command: command.to_string(),
            output: String::new(),
            exit_code: None,
            started_at: Instant::now(),
            completed_at: None,
        });
    }

    pub fn append_output(&mut self, chunk: &str) {
        self.last_activity_at = Instant::now();
        if let Some(exec) = self.current_execution.as_mut() {
            exec.append_output(chunk);
        }
    }

    pub fn complete_command_execution(&mut self, exit_code: Option<i32>) {
        if let Some(mut exec) = self.current_execution.take() {
            exec.exit_code = exit_code;
            exec.completed_at = Some(Instant::now());
            self.last_command = Some(exec.command.clone());
            self.last_exit_code = exit_code;
            if self.execution_history.len() >= MAX_HISTORY {
                self.execution_history.pop_front();
            }
            self.execution_history.push_back(exec);
        }
        self.is_idle = true;
        self.last_activity_at = Instant::now();
    }

    /// Examine raw input for a CWD-changing command (I6 "command" trigger).
    /// Returns the *predicted* new CWD, if any; callers apply
    /// [`TerminalState::set_cwd`] themselves after honoring
    /// `CWD_PREDICTION_DELAY` and trying the driver's real CWD first.
    pub fn predict_cwd_change(&self, raw_input: &str) -> Option<String> {
        let caps = self.cd_pattern.captures(raw_input.trim())?;
        let target = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        match caps.get(1).map(|m| m.as_str()) {
            Some("cd") | Some("z") | Some("j") => Some(resolve_cwd_path(&self.cwd, target)),
            Some("pushd") if !target.is_empty() => Some(resolve_cwd_path(&self.cwd, target)),
            _ => None, // popd without a directory stack snapshot cannot be predicted
        }
    }

    pub fn cwd_prediction_delay() -> Duration {
        CWD_PREDICTION_DELAY
    }

    /// I6: every CWD update carries a trigger and refreshes `cwd_updated_at`.
    pub fn set_cwd(&mut self, new_cwd: impl Into<String>) {
        self.cwd = new_cwd.into();
        self.cwd_updated_at = Instant::now();
    }

    /// Whether a `pwd_check` refresh is allowed right now. Rate-limited to
    /// one per 5s, and (per §4.4) never issued as a visible write on SSH —
    /// callers must route SSH refreshes through prediction only.
    pub fn pwd_check_allowed(&self) -> bool {
        match self.last_pwd_check {
            None => true,
            Some(t) => t.elapsed() >= PWD_CHECK_MIN_INTERVAL,
        }
    }

    pub fn mark_pwd_checked(&mut self) {
        self.last_pwd_check = Some(Instant::now());
    }
}

/// R1: resolve a `cd`-style target against the current CWD.
///
/// Handles `~`, absolute Unix paths, Windows drive-letter paths, `.`, and
/// `..`, without touching the filesystem (SSH sessions have none locally).
pub fn resolve_cwd_path(cwd: &str, target: &str) -> String {
    let target = target.trim().trim_matches('"').trim_matches('\'');
    if target.is_empty() || target == "~" {
        return dirs_home();
    }
    if let Some(rest) = target.strip_prefix("~/") {
        return join_and_normalize(&dirs_home(), rest);
    }
    if is_windows_absolute(target) {
        return normalize_windows(target);
    }
    if target.starts_with('/') {
        return normalize_unix(target);
    }
    join_and_normalize(cwd, target)
}

fn dirs_home() -> String {
    std::env::var("HOME").unwrap_or_else(|_| "/root".to_string())
}

fn is_windows_absolute(p: &str) -> bool {
    let bytes = p.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn join_and_normalize(base: &str, rel: &str) -> String {
    if is_windows_absolute(base) {
        let joined = format!("{}\\{}", base.trim_end_matches('\\'), rel.replace('/', "\\"));
        normalize_windows(&joined)
    } else {
        let joined = format!("{}/{}", base.trim_end_matches('/'), rel);
        normalize_unix(&joined)
    }
}

fn normalize_unix(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            p => stack.push(p),
        }
    }
    format!("/{}", stack.join("/"))
}

fn normalize_windows(path: &str) -> String {
    let path = path.replace('/', "\\");
    let (drive, rest) = path.split_at(2);
    let mut stack: Vec<&str> = Vec::new();
    for part in rest.split('\\') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            p => stack.push(p),
        }
    }
    if stack.is_empty() {
        format!("{drive}\\")
    } else {
        format!("{drive}\\{}", stack.join("\\"))
    }
}

/// Absolutize a path for display purposes only (not used for resolution).
pub fn display_path(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}
