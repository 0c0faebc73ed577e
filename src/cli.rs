// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;

/// Drive a local shell through an LLM assistant.
#[derive(Parser, Debug)]
#[command(name = "helm", version, about)]
pub struct Cli {
    /// Path to a config file. Defaults to the standard search path
    /// (`./helm.yaml`, `~/.config/helm/config.yaml`).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// The task to hand to the agent. Reads from stdin when omitted.
    pub task: Option<String>,

    /// Print `helm-config`'s effective configuration (after merge) and exit.
    #[arg(long)]
    pub show_config: bool,

    /// Require confirmation for every command regardless of risk level,
    /// overriding the config file's `agent.strict_mode`.
    #[arg(long)]
    pub strict: bool,

    /// Write tracing output to stderr (off by default to keep stdout clean
    /// for piping).
    #[arg(long)]
    pub verbose: bool,
}
