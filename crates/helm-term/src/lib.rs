// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Terminal driving, state tracking, and process/input inference.
//!
//! Three cooperating pieces, corresponding to C3/C4/C5 of the agent core:
//! [`driver`] abstracts a local PTY or an SSH shell behind one trait;
//! [`state`] tracks per-session CWD/command-history bookkeeping on top of a
//! driver; [`sensor`] infers whether a session is idle, busy, stuck, or
//! waiting for input.

pub mod driver;
pub mod profile;
pub mod sensor;
pub mod state;

pub use driver::{
    ControlKey, ExecuteOutcome, LocalDriver, LocalProcessStatus, RemoteProcesses, SshAuth,
    SshDriver, SshTarget, TerminalDriver, TerminalKind,
};
pub use profile::{looks_dynamic, HostProfile};
pub use sensor::{
    analyze_screen, classify_process, synthesize, EnvironmentContext, InputWaitCache,
    InputWaitKind, InputWaitingState, OverallStatus, ProcessState, ProcessStatus, RateTracker,
    TerminalAwareness,
};
pub use state::{resolve_cwd_path, CommandExecution, TerminalState};
