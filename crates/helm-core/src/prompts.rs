// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Deterministic system-prompt construction (SPEC_FULL.md §4.8): OS, shell,
//! optional host profile, preloaded knowledge snippets, optional uploaded
//! document content, a fixed ReAct-style framing block, an optional
//! stylistic block keyed by an "MBTI" parameter, the available tools, the
//! command-handling rules, and a termination clause.

use helm_term::HostProfile;

/// All optional contextual blocks that can be injected into the system prompt.
#[derive(Debug, Default)]
pub struct PromptContext<'a> {
    /// Snapshot of the driven terminal's host profile, if probed.
    pub host_profile: Option<&'a HostProfile>,
    /// Preloaded knowledge snippets (short project facts, not a full
    /// knowledge base — no persistent knowledge store exists in this spec).
    pub knowledge_snippets: &'a [String],
    /// Contents of a document the user uploaded for this run.
    pub uploaded_document: Option<&'a str>,
    /// Stylistic register the model should adopt, keyed by an "MBTI" code
    /// (e.g. `"INTJ"`); `None` uses the neutral default voice.
    pub mbti: Option<&'a str>,
    /// Text appended verbatim after the default prompt body.
    pub append: Option<&'a str>,
}

fn react_framing() -> &'static str {
    "## Operating Loop\n\n\
     You operate in a Reason-Act-Observe loop: think about what the next step \
     should be, call exactly the tools needed to make progress, then observe \
     their results before deciding the next step. Do not narrate steps you are \
     not about to take. Prefer the smallest safe action that moves the task \
     forward over a large speculative one."
}

fn mbti_style_block(code: &str) -> String {
    format!(
        "## Communication Style\n\n\
         Adopt a communication style consistent with the {code} temperament: \
         let that inform tone and pacing, but never let it override correctness, \
         safety, or the operating loop above."
    )
}

fn tool_rules() -> &'static str {
    "## Command Handling Rules\n\n\
     - Commands are risk-classified before they run. `safe` and `moderate` \
       commands may run automatically depending on configuration; `dangerous` \
       commands require your explicit confirmation step to be acknowledged by \
       the user; `blocked` commands are refused outright — do not retry a \
       blocked command with a workaround that defeats the block.\n\
     - Some commands are rewritten automatically (e.g. `ping` gains `-c 4`, \
       `apt install` gains `-y`) — treat the rewritten form as authoritative.\n\
     - Long-running or streaming commands (servers, `tail -f`, `top`) are \
       started in the background; poll with `get_terminal_context` and stop \
       with `send_control_key` rather than waiting for them to exit on their \
       own.\n\
     - Interactive full-screen programs (editors, pagers, multiplexers) are \
       blocked — use `read_file`/`write_file` for file edits instead of an \
       editor, and avoid pagers by redirecting or using flags that disable \
       them.\n\
     - Use `check_terminal_status` when unsure whether the terminal is idle, \
       busy, or waiting on input before issuing another command.\n\
     - Use `remember_info` for durable facts about this host (where a project \
       or config file lives) — not for transient details like ports or PIDs."
}

fn termination_clause() -> &'static str {
    "## Finishing\n\n\
     Stop and report once the task is complete or you have established that it \
     cannot be completed with the tools available. Do not keep invoking tools \
     after the user's goal has been satisfied."
}

fn host_section(profile: &HostProfile) -> String {
    let os = profile.os.as_deref().unwrap_or("unknown");
    let os_version = profile.os_version.as_deref().unwrap_or("");
    let shell = profile.shell.as_deref().unwrap_or("unknown");
    let pm = profile.package_manager.as_deref().unwrap_or("unknown");
    let tools = if profile.installed_tools.is_empty() {
        "none recorded".to_string()
    } else {
        profile.installed_tools.join(", ")
    };
    let notes = if profile.notes.is_empty() {
        String::new()
    } else {
        format!("\nKnown facts about this host:\n{}", profile.notes.iter().map(|n| format!("- {n}")).collect::<Vec<_>>().join("\n"))
    };
    format!(
        "## Host Profile\n\n\
         Host: `{}`\nOS: {os} {os_version}\nShell: {shell}\nPackage manager: {pm}\nAvailable tools: {tools}{notes}",
        profile.host_id,
    )
}

fn knowledge_section(snippets: &[String]) -> String {
    if snippets.is_empty() {
        return String::new();
    }
    format!(
        "\n\n## Known Project Context\n\n{}",
        snippets.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n")
    )
}

/// Build the deterministic system prompt for one run.
pub fn system_prompt(ctx: PromptContext<'_>) -> String {
    let identity = "You are an assistant that drives a real shell or SSH session on the \
                     user's behalf. You observe terminal output, run commands, read and \
                     write files, and report back — you never fabricate command output.";

    let host_section = ctx.host_profile.map(host_section).unwrap_or_default();
    let knowledge_section = knowledge_section(ctx.knowledge_snippets);
    let document_section = ctx
        .uploaded_document
        .map(|d| format!("\n\n## Uploaded Document\n\n{d}"))
        .unwrap_or_default();
    let style_section = ctx.mbti.map(mbti_style_block).map(|s| format!("\n\n{s}")).unwrap_or_default();
    let append_section = ctx.append.map(|a| format!("\n\n{a}")).unwrap_or_default();

    format!(
        "{identity}\n\n{}\n\n{}{host_section}{knowledge_section}{document_section}{style_section}\n\n{}{append_section}",
        react_framing(),
        tool_rules(),
        termination_clause(),
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
