// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Process & Input Sensor (C5): infers what a terminal session is doing from
//! child-process probes, output-rate tracking, and screen-content analysis.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use regex::RegexSet;

use crate::driver::{LocalProcessStatus, RemoteProcesses, TerminalKind};

/// A command is considered possibly stuck only once it has run this long
/// with no output.
const STUCK_THRESHOLD: Duration = Duration::from_secs(30);
/// Width of the sliding window used for lines/s and bytes/s estimation.
const RATE_WINDOW: Duration = Duration::from_secs(10);
/// How long a screen-analyzer verdict may be reused before it must be
/// recomputed.
const INPUT_WAIT_CACHE_TTL: Duration = Duration::from_millis(2_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Idle,
    RunningInteractive,
    RunningStreaming,
    RunningSilent,
    PossiblyStuck,
    WaitingInput,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessState {
    pub status: Option<ProcessStatus>,
    pub foreground_process: Option<String>,
    pub pid: Option<u32>,
    pub running_time: Option<Duration>,
    pub last_output_time: Option<Instant>,
    pub output_rate_lines_per_s: Option<f64>,
    pub data_rate_bytes_per_s: Option<f64>,
    pub suggestion: String,
    pub is_known_long_running: bool,
}

const INTERACTIVE_COMMANDS: &[&str] = &[
    "vim", "vi", "nvim", "nano", "emacs", "less", "more", "top", "htop", "man",
    "tmux", "screen", "mc", "ranger", "mysql", "psql", "python3", "python", "node", "irb",
];
const STREAMING_COMMANDS: &[&str] = &[
    "tail -f", "tail -F", "docker logs -f", "kubectl logs -f", "journalctl -f",
    "npm run dev", "npm start", "watch ", "dmesg -w",
];
const SILENT_COMMANDS: &[&str] = &[
    "git clone", "make", "cargo build", "cargo test", "npm install", "npm ci",
    "yarn install", "pip install", "apt-get update", "apt-get install",
    "tar ", "rsync ", "dd ", "scp ",
];

fn command_head_matches(command: &str, list: &[&str]) -> bool {
    let lower = command.trim().to_ascii_lowercase();
    list.iter().any(|p| lower.starts_with(p))
}

/// Sliding window of `(timestamp, line_count, byte_count)` samples used to
/// compute output rates over the last [`RATE_WINDOW`].
#[derive(Default)]
pub struct RateTracker {
    samples: VecDeque<(Instant, usize, usize)>,
}

impl RateTracker {
    pub fn record(&mut self, lines: usize, bytes: usize) {
        let now = Instant::now();
        self.samples.push_back((now, lines, bytes));
        while let Some((t, _, _)) = self.samples.front() {
            if now.duration_since(*t) > RATE_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn rates(&self) -> (f64, f64) {
        if self.samples.len() < 2 {
            return (0.0, 0.0);
        }
        let (t0, _, _) = self.samples.front().unwrap();
        let (t1, _, _) = self.samples.back().unwrap();
        let elapsed = t1.duration_since(*t0).as_secs_f64().max(0.001);
        let lines: usize = self.samples.iter().map(|(_, l, _)| l).sum();
        let bytes: usize = self.samples.iter().map(|(_, _, b)| b).sum();
        (lines as f64 / elapsed, bytes as f64 / elapsed)
    }
}

/// Classify the live process status of one session (C5, local/SSH split).
pub fn classify_process(
    kind: TerminalKind,
    command: Option<&str>,
    local: Option<&LocalProcessStatus>,
    remote: Option<&RemoteProcesses>,
    rates: (f64, f64),
) -> ProcessState {
    let mut state = ProcessState::default();

    let is_idle = match kind {
        TerminalKind::Local => local.map(|l| l.is_idle).unwrap_or(true),
        TerminalKind::Ssh => remote.map(|r| r.children.is_empty()).unwrap_or(true),
    };

    if is_idle {
        state.status = Some(ProcessStatus::Idle);
        state.suggestion = "Terminal is idle; ready for the next command.".into();
        return state;
    }

    let command = command.unwrap_or("");
    state.foreground_process = Some(command.to_string());
    state.pid = local.and_then(|l| l.foreground_pid);
    state.running_time = local.and_then(|l| l.running_time);
    state.output_rate_lines_per_s = Some(rates.0);
    state.data_rate_bytes_per_s = Some(rates.1);

    let is_interactive = command_head_matches(command, INTERACTIVE_COMMANDS);
    let is_streaming = command_head_matches(command, STREAMING_COMMANDS);
    let is_silent = command_head_matches(command, SILENT_COMMANDS);
    state.is_known_long_running = is_streaming || is_silent;

    if is_interactive {
        state.status = Some(ProcessStatus::RunningInteractive);
        state.suggestion = "An interactive program is running; use send_control_key to interact.".into();
        return state;
    }
    if is_streaming {
        state.status = Some(ProcessStatus::RunningStreaming);
        state.suggestion = "Output is streaming continuously; poll with get_terminal_context and stop with send_control_key when done.".into();
        return state;
    }
    // P5: a silent command is never classified as stuck, regardless of how
    // long it has been silent.
    if is_silent {
        state.status = Some(ProcessStatus::RunningSilent);
        state.suggestion = "Command is known to run silently; this is expected, keep waiting.".into();
        return state;
    }

    let running_time = state.running_time.unwrap_or_default();
    let has_output = rates.0 > 0.0 || rates.1 > 0.0;
    if running_time >= STUCK_THRESHOLD && !has_output {
        state.status = Some(ProcessStatus::PossiblyStuck);
        state.suggestion = "No output for a while; consider checking status or sending Ctrl-C.".into();
    } else {
        state.status = Some(ProcessStatus::RunningSilent);
        state.suggestion = "Command is running normally.".into();
    }
    state
}

// ─── Input-waiting screen analysis ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputWaitKind {
    Password,
    YesNo,
    Selection,
    Pager,
    Editor,
    Prompt,
    None,
}

#[derive(Debug, Clone)]
pub struct InputWaitingState {
    pub kind: InputWaitKind,
    pub confidence: f64,
    pub suggested_response: Option<String>,
    pub computed_at: Instant,
}

impl InputWaitingState {
    fn is_fresh(&self) -> bool {
        self.computed_at.elapsed() < INPUT_WAIT_CACHE_TTL
    }
}

struct ScreenPatterns {
    password: RegexSet,
    yes_no: RegexSet,
    selection: RegexSet,
    pager: RegexSet,
    editor: RegexSet,
    prompt: RegexSet,
}

fn screen_patterns() -> &'static ScreenPatterns {
    use std::sync::OnceLock;
    static PATTERNS: OnceLock<ScreenPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ScreenPatterns {
        password: RegexSet::new([
            r"(?i)password\s*:\s*$",
            r"(?i)\[sudo\] password for \w+:\s*$",
            r"(?i)enter passphrase",
            r"(?i)'s password:\s*$",
        ])
        .unwrap(),
        yes_no: RegexSet::new([r"\(y/n\)", r"(?i)continue\?\s*\[y/n\]", r"(?i)do you want to continue"])
            .unwrap(),
        selection: RegexSet::new([r"^\s*\d+\)\s", r"(?i)select\s+(an?\s+)?option"]).unwrap(),
        pager: RegexSet::new([r"^:\s*$", r"(?i)--more--", r"\(END\)"]).unwrap(),
        editor: RegexSet::new([r"-- INSERT --", r"-- VISUAL --", r"\^G Get Help"]).unwrap(),
        prompt: RegexSet::new([r"[$#%>]\s*$"]).unwrap(),
    })
}

/// Analyze the last N lines of a terminal buffer for an input-waiting
/// signal. Pure function; callers are responsible for the 2s cache TTL via
/// [`InputWaitingState::is_fresh`] / [`InputWaitCache`].
pub fn analyze_screen(tail: &str) -> InputWaitingState {
    let p = screen_patterns();
    let last_lines: Vec<&str> = tail.lines().rev().take(10).collect();
    let joined = last_lines.join("\n");

    let (kind, confidence, suggested_response) = if p.password.is_match(&joined) {
        (InputWaitKind::Password, 0.95, None)
    } else if p.yes_no.is_match(&joined) {
        (InputWaitKind::YesNo, 0.85, Some("y".to_string()))
    } else if p.selection.is_match(&joined) {
        (InputWaitKind::Selection, 0.7, None)
    } else if p.pager.is_match(&joined) {
        (InputWaitKind::Pager, 0.8, Some("q".to_string()))
    } else if p.editor.is_match(&joined) {
        (InputWaitKind::Editor, 0.8, Some("\u{1b}:wq\r".to_string()))
    } else if p.prompt.is_match(&joined) {
        (InputWaitKind::Prompt, 0.6, None)
    } else {
        (InputWaitKind::None, 0.0, None)
    };

    InputWaitingState { kind, confidence, suggested_response, computed_at: Instant::now() }
}

/// Caches the last [`analyze_screen`] verdict for [`INPUT_WAIT_CACHE_TTL`].
#[derive(Default)]
pub struct InputWaitCache {
    last: Option<InputWaitingState>,
}

impl InputWaitCache {
    pub fn get_or_compute(&mut self, tail: &str) -> InputWaitingState {
        if let Some(last) = &self.last {
            if last.is_fresh() {
                return last.clone();
            }
        }
        let computed = analyze_screen(tail);
        self.last = Some(computed.clone());
        computed
    }
}

impl Clone for InputWaitingState {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            confidence: self.confidence,
            suggested_response: self.suggested_response.clone(),
            computed_at: self.computed_at,
        }
    }
}

// ─── Synthesis ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct EnvironmentContext {
    pub user: Option<String>,
    pub hostname: Option<String>,
    pub is_root: bool,
    pub cwd: Option<String>,
    pub virtualenv: Option<String>,
    pub ssh_depth: u32,
    pub prompt_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallStatus {
    Idle,
    Busy,
    Stuck,
    WaitingInput,
}

#[derive(Debug, Clone)]
pub struct TerminalAwareness {
    pub status: OverallStatus,
    pub process: ProcessState,
    pub input_wait: InputWaitingState,
    pub environment: EnvironmentContext,
    pub suggestion: String,
    pub can_execute_command: bool,
    pub needs_user_input: bool,
}

/// Combine process state, input-wait state, and environment context into one
/// overall awareness verdict (§4.5 "Synthesis").
pub fn synthesize(
    process: ProcessState,
    input_wait: InputWaitingState,
    environment: EnvironmentContext,
) -> TerminalAwareness {
    let non_prompt_wait = !matches!(input_wait.kind, InputWaitKind::None | InputWaitKind::Prompt);

    let status = if non_prompt_wait {
        OverallStatus::WaitingInput
    } else if matches!(process.status, Some(ProcessStatus::PossiblyStuck)) {
        OverallStatus::Stuck
    } else if matches!(process.status, Some(ProcessStatus::Idle))
        || matches!(input_wait.kind, InputWaitKind::Prompt)
    {
        OverallStatus::Idle
    } else {
        OverallStatus::Busy
    };

    let suggestion = match status {
        OverallStatus::WaitingInput => match input_wait.kind {
            InputWaitKind::Password => "The terminal is waiting for a password. Do not send it in plain text over this channel; ask the user or use a credential helper.".to_string(),
            InputWaitKind::YesNo => "The terminal is waiting for a yes/no confirmation.".to_string(),
            InputWaitKind::Selection => "The terminal is waiting for a numbered selection.".to_string(),
            InputWaitKind::Pager => "A pager is open; send 'q' to exit or space to page.".to_string(),
            InputWaitKind::Editor => "An editor is open; prefer write_file instead of driving the editor interactively.".to_string(),
            _ => "The terminal is waiting for input.".to_string(),
        },
        OverallStatus::Stuck => process.suggestion.clone(),
        OverallStatus::Idle => "Terminal is idle; ready for the next command.".to_string(),
        OverallStatus::Busy => process.suggestion.clone(),
    };

    let can_execute_command = matches!(status, OverallStatus::Idle);
    let needs_user_input = matches!(status, OverallStatus::WaitingInput)
        && matches!(input_wait.kind, InputWaitKind::Password | InputWaitKind::Selection);

    TerminalAwareness { status, process, input_wait, environment, suggestion, can_execute_command, needs_user_input }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_command_never_stuck() {
        let local = LocalProcessStatus { is_idle: false, foreground_pid: Some(1), foreground_command: None, running_time: Some(Duration::from_secs(600)) };
        let state = classify_process(TerminalKind::Local, Some("cargo build --release"), Some(&local), None, (0.0, 0.0));
        assert_eq!(state.status, Some(ProcessStatus::RunningSilent));
    }

    #[test]
    fn long_silent_normal_command_becomes_stuck() {
        let local = LocalProcessStatus { is_idle: false, foreground_pid: Some(1), foreground_command: None, running_time: Some(Duration::from_secs(40)) };
        let state = classify_process(TerminalKind::Local, Some("./long_compile"), Some(&local), None, (0.0, 0.0));
        assert_eq!(state.status, Some(ProcessStatus::PossiblyStuck));
    }

    #[test]
    fn idle_when_no_child_process() {
        let local = LocalProcessStatus { is_idle: true, ..Default::default() };
        let state = classify_process(TerminalKind::Local, None, Some(&local), None, (0.0, 0.0));
        assert_eq!(state.status, Some(ProcessStatus::Idle));
    }

    #[test]
    fn streaming_command_detected() {
        let local = LocalProcessStatus { is_idle: false, ..Default::default() };
        let state = classify_process(TerminalKind::Local, Some("tail -f /var/log/syslog"), Some(&local), None, (5.0, 400.0));
        assert_eq!(state.status, Some(ProcessStatus::RunningStreaming));
    }

    #[test]
    fn password_prompt_detected() {
        let wait = analyze_screen("Updating nginx...\n[sudo] password for alice:");
        assert_eq!(wait.kind, InputWaitKind::Password);
        assert!(wait.confidence > 0.9);
    }

    #[test]
    fn plain_prompt_is_not_waiting_input() {
        let wait = analyze_screen("total 24\ndrwxr-xr-x  3 me me 4096 Jan  1 00:00 .\nme@host:~$ ");
        assert_eq!(wait.kind, InputWaitKind::Prompt);
    }

    #[test]
    fn synthesize_password_prompt_blocks_execution() {
        let process = ProcessState { status: Some(ProcessStatus::RunningSilent), ..Default::default() };
        let wait = analyze_screen("[sudo] password for alice:");
        let awareness = synthesize(process, wait, EnvironmentContext::default());
        assert_eq!(awareness.status, OverallStatus::WaitingInput);
        assert!(!awareness.can_execute_command);
        assert!(awareness.needs_user_input);
    }

    #[test]
    fn synthesize_stuck_process() {
        let process = ProcessState { status: Some(ProcessStatus::PossiblyStuck), suggestion: "maybe stuck".into(), ..Default::default() };
        let wait = InputWaitingState { kind: InputWaitKind::None, confidence: 0.0, suggested_response: None, computed_at: Instant::now() };
        let awareness = synthesize(process, wait, EnvironmentContext::default());
        assert_eq!(awareness.status, OverallStatus::Stuck);
    }

    #[test]
    fn rate_tracker_computes_rates() {
        let mut rt = RateTracker::default();
        rt.record(10, 1000);
        rt.record(10, 1000);
        let (lines, bytes) = rt.rates();
        assert!(lines > 0.0);
        assert!(bytes > 0.0);
    }

    #[test]
    fn input_wait_cache_reuses_within_ttl() {
        let mut cache = InputWaitCache::default();
        let first = cache.get_or_compute("me@host:~$ ");
        let second = cache.get_or_compute("totally different garbage with no prompt at all");
        assert_eq!(first.kind, second.kind);
    }
}
