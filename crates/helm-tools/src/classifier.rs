// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Risk Classifier (C1): a pure, deterministic mapping from a shell command
//! string to a risk level and a handling decision.

use std::sync::OnceLock;
use std::time::Duration;

use regex::{Regex, RegexSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Safe,
    Moderate,
    Dangerous,
    Blocked,
}

/// What the executor should do with the command, independent of risk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandHandling {
    Allow,
    AutoFix { rewritten: String },
    /// Execute for a bounded window, then send a control key to return.
    /// Selectable explicitly; the classifier itself never emits this (it
    /// emits `FireAndForget` for the matching command families — see
    /// SPEC_FULL.md §3's Q1 resolution).
    TimedExecution { duration: Duration, stop_key: &'static str },
    FireAndForget { hint: String },
    Block { reason: String, hint: String },
}

struct Rules {
    blocked: RegexSet,
    dangerous: RegexSet,
    moderate: RegexSet,
    blockers_interactive: RegexSet,
    ping_no_count: Regex,
    install_no_yes: Regex,
    pager_pipe: Regex,
    pager_leading: Regex,
    fire_and_forget: RegexSet,
    privileged: RegexSet,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        blocked: RegexSet::new([
            r"(?i):\(\)\s*\{.*\|.*&.*\}\s*;",            // classic fork bomb
            r"(?i)^\s*rm\s+(-\w*r\w*f\w*|-\w*f\w*r\w*)\s+/\s*(\*)?\s*$",
            r"(?i)^\s*rm\s+(-\w*r\w*f\w*|-\w*f\w*r\w*)\s+/\*\s*$",
            r"(?i)^\s*mkfs(\.\w+)?\s",
            r"(?i)^\s*dd\s+.*of=/dev/sd\w*",
            r"(?i)>\s*/dev/sd\w*",
            r"(?i)^\s*chmod\s+777\s+/\s*$",
            r"(?i)^\s*chown\s+.*\s+/\s*$",
            r"(?i)>\s*/etc/(passwd|shadow|sudoers)\b",
        ])
        .unwrap(),
        dangerous: RegexSet::new([
            r"(?i)^\s*rm\s+-\w*r\w*",
            r"(?i)^\s*(kill|killall|pkill)\b",
            r"(?i)^\s*chmod\b",
            r"(?i)^\s*chown\b",
            r"(?i)^\s*(shutdown|reboot|halt|poweroff)\b",
            r"(?i)^\s*systemctl\s+(stop|restart|disable)\b",
            r"(?i)^\s*service\s+\S+\s+(stop|restart)\b",
            r"(?i)^\s*(apt|apt-get|yum|dnf)\s+.*\bremove\b",
            r"(?i)>\s*/etc/\S",
            r"(?i)>\s*/var/\S",
            r"(?i)curl\s+.*\|\s*sh\b",
            r"(?i)wget\s+.*-O-.*\|\s*sh\b",
        ])
        .unwrap(),
        moderate: RegexSet::new([
            r"(?i)^\s*mv\b",
            r"(?i)^\s*cp\b",
            r"(?i)^\s*mkdir\b",
            r"(?i)^\s*touch\b",
            r"(?i)^\s*systemctl\s+(start|enable|status)\b",
            r"(?i)^\s*service\s+\S+\s+start\b",
            r"(?i)^\s*(apt|apt-get|yum|dnf|npm|pip|pip3)\s+.*\binstall\b",
            r"(?i)^\s*git\s+(pull|push|commit)\b",
        ])
        .unwrap(),
        blockers_interactive: RegexSet::new([
            r"(?i)^\s*(vim|vi|nvim|nano|emacs)\b",
            r"(?i)^\s*(mc|ranger)\b",
            r"(?i)^\s*(tmux|screen)\b",
        ])
        .unwrap(),
        ping_no_count: Regex::new(r"(?i)^\s*ping\s+(?:(?!-c\b).)*$").unwrap(),
        install_no_yes: Regex::new(r"(?i)^\s*(apt|apt-get|yum|dnf)\s+install\b(?:(?!-y\b)(?!--yes\b).)*$").unwrap(),
        pager_pipe: Regex::new(r"(?i)^(?P<cmd>.*)\|\s*(less|more)\s*$").unwrap(),
        pager_leading: Regex::new(r"(?i)^\s*(less|more)\s+(?P<file>.+)$").unwrap(),
        fire_and_forget: RegexSet::new([
            r"(?i)^\s*tail\s+-[fF]",
            r"(?i)^\s*ping\b", // only reached if ping already has -c; see classify()
            r"(?i)^\s*watch\s",
            r"(?i)^\s*(top|htop|btop|atop|iotop|iftop|nload|bmon)\b",
            r"(?i)^\s*journalctl\b.*-f\b",
            r"(?i)^\s*docker\s+logs\b.*-f\b",
            r"(?i)^\s*kubectl\s+logs\b.*-f\b",
            r"(?i)^\s*dmesg\s+-w\b",
        ])
        .unwrap(),
        privileged: RegexSet::new([
            r"(?i)^\s*sudo\b",
            r"(?i)^\s*su\s+(-\s+)?(-c\s+)?",
            r"(?i)^\s*pkexec\b",
            r"(?i)^\s*doas\b",
            r"(?i)osascript.*administrator privileges",
        ])
        .unwrap(),
    })
}

/// Whether a command is expected to prompt for elevated privileges.
pub fn is_privileged(command: &str) -> bool {
    rules().privileged.is_match(command)
}

fn classify_risk(command: &str) -> RiskLevel {
    let r = rules();
    if r.blocked.is_match(command) {
        RiskLevel::Blocked
    } else if r.dangerous.is_match(command) {
        RiskLevel::Dangerous
    } else if r.moderate.is_match(command) {
        RiskLevel::Moderate
    } else {
        RiskLevel::Safe
    }
}

/// C1: classify and, where applicable, rewrite a shell command.
pub fn classify(command: &str) -> (RiskLevel, CommandHandling) {
    let r = rules();
    let risk = classify_risk(command);

    if r.blockers_interactive.is_match(command) {
        let tool = command.trim().split_whitespace().next().unwrap_or("");
        return (
            risk,
            CommandHandling::Block {
                reason: format!("'{tool}' requires an interactive terminal session this agent cannot drive"),
                hint: "Use read_file / write_file to inspect or edit files instead.".to_string(),
            },
        );
    }

    if risk == RiskLevel::Blocked {
        return (
            risk,
            CommandHandling::Block {
                reason: "command matches a destructive pattern that is never allowed".to_string(),
                hint: "Rephrase the task with a narrower, explicit target path.".to_string(),
            },
        );
    }

    if r.ping_no_count.is_match(command) && command.trim_start().to_ascii_lowercase().starts_with("ping") {
        let rewritten = insert_after_head_ci(command.trim_end(), "ping", "-c 4");
        return (risk, CommandHandling::AutoFix { rewritten });
    }

    if r.install_no_yes.is_match(command) {
        let rewritten = insert_after_head_ci(command, "install", "-y");
        return (risk, CommandHandling::AutoFix { rewritten });
    }

    if let Some(caps) = r.pager_pipe.captures(command) {
        let cmd = caps.name("cmd").unwrap().as_str().trim_end().trim_end_matches('|').trim_end();
        return (risk, CommandHandling::AutoFix { rewritten: format!("{cmd} | head -200") });
    }
    if let Some(caps) = r.pager_leading.captures(command) {
        let file = caps.name("file").unwrap().as_str().trim();
        return (risk, CommandHandling::AutoFix { rewritten: format!("cat {file} | head -200") });
    }

    // `ping` without `-c` was already handled above as AutoFix; only a
    // `ping` that already carries `-c` can reach here as fire-and-forget
    // eligible, which it should not be — exclude it explicitly.
    let is_bare_ping =
        command.trim_start().to_ascii_lowercase().starts_with("ping") && !command.contains("-c");
    if !is_bare_ping && r.fire_and_forget.is_match(command) {
        return (
            risk,
            CommandHandling::FireAndForget {
                hint: "This command does not terminate on its own. Poll output with get_terminal_context and stop it with send_control_key(ctrl+c) when finished.".to_string(),
            },
        );
    }

    (risk, CommandHandling::Allow)
}

/// Insert a flag immediately after the command's head token (or after a
/// named subcommand word like "install"), without disturbing quoting.
/// Matches `after_word` case-insensitively, since the command head itself
/// may be.
fn insert_after_head_ci(command: &str, after_word: &str, flag: &str) -> String {
    let mut parts: Vec<&str> = command.split_whitespace().collect();
    if let Some(pos) = parts.iter().position(|p| p.eq_ignore_ascii_case(after_word)) {
        parts.insert(pos + 1, flag);
        parts.join(" ")
    } else {
        format!("{command} {flag}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // B1
    #[test]
    fn rm_rf_root_is_blocked() {
        let (risk, handling) = classify("rm -rf /");
        assert_eq!(risk, RiskLevel::Blocked);
        assert!(matches!(handling, CommandHandling::Block { .. }));
    }

    #[test]
    fn rm_rf_subdir_is_dangerous_not_blocked() {
        let (risk, _) = classify("rm -rf /home/me/tmp");
        assert_eq!(risk, RiskLevel::Dangerous);
    }

    // B2
    #[test]
    fn ping_without_count_autofixed() {
        let (_, handling) = classify("ping 8.8.8.8");
        assert_eq!(handling, CommandHandling::AutoFix { rewritten: "ping -c 4 8.8.8.8".to_string() });
    }

    #[test]
    fn ping_with_count_is_allowed() {
        let (_, handling) = classify("ping -c 4 8.8.8.8");
        assert_eq!(handling, CommandHandling::Allow);
    }

    // B3
    #[test]
    fn apt_install_autofixed_and_moderate() {
        let (risk, handling) = classify("apt install curl");
        assert_eq!(risk, RiskLevel::Moderate);
        assert_eq!(handling, CommandHandling::AutoFix { rewritten: "apt install -y curl".to_string() });
    }

    #[test]
    fn apt_install_with_yes_is_allowed() {
        let (_, handling) = classify("apt install -y curl");
        assert_eq!(handling, CommandHandling::Allow);
    }

    // B4
    #[test]
    fn less_file_autofixed() {
        let (_, handling) = classify("less /var/log/syslog");
        assert_eq!(handling, CommandHandling::AutoFix { rewritten: "cat /var/log/syslog | head -200".to_string() });
    }

    #[test]
    fn piped_to_less_autofixed() {
        let (_, handling) = classify("dmesg | less");
        assert_eq!(handling, CommandHandling::AutoFix { rewritten: "dmesg | head -200".to_string() });
    }

    // B5
    #[test]
    fn vim_is_blocked() {
        let (_, handling) = classify("vim foo.txt");
        assert!(matches!(handling, CommandHandling::Block { .. }));
    }

    #[test]
    fn tail_f_is_fire_and_forget() {
        let (_, handling) = classify("tail -f /var/log/app.log");
        assert!(matches!(handling, CommandHandling::FireAndForget { .. }));
    }

    #[test]
    fn top_is_fire_and_forget() {
        let (_, handling) = classify("top");
        assert!(matches!(handling, CommandHandling::FireAndForget { .. }));
    }

    #[test]
    fn plain_ls_is_safe_and_allowed() {
        let (risk, handling) = classify("ls -la");
        assert_eq!(risk, RiskLevel::Safe);
        assert_eq!(handling, CommandHandling::Allow);
    }

    #[test]
    fn fork_bomb_blocked() {
        let (risk, _) = classify(":(){ :|:& };:");
        assert_eq!(risk, RiskLevel::Blocked);
    }

    #[test]
    fn git_commit_is_moderate() {
        let (risk, handling) = classify("git commit -m wip");
        assert_eq!(risk, RiskLevel::Moderate);
        assert_eq!(handling, CommandHandling::Allow);
    }

    #[test]
    fn sudo_is_privileged() {
        assert!(is_privileged("sudo systemctl restart nginx"));
        assert!(!is_privileged("ls -la"));
    }

    // P1: case-insensitive on the command head
    #[test]
    fn uppercase_rm_rf_root_is_blocked() {
        let (risk, handling) = classify("RM -RF /");
        assert_eq!(risk, RiskLevel::Blocked);
        assert!(matches!(handling, CommandHandling::Block { .. }));
    }

    #[test]
    fn uppercase_vim_is_blocked() {
        let (_, handling) = classify("VIM foo.txt");
        assert!(matches!(handling, CommandHandling::Block { .. }));
    }

    #[test]
    fn mixed_case_ping_autofixed() {
        let (_, handling) = classify("Ping 8.8.8.8");
        assert_eq!(handling, CommandHandling::AutoFix { rewritten: "Ping -c 4 8.8.8.8".to_string() });
    }

    // P1: pure function
    #[test]
    fn classify_is_pure() {
        let a = classify("rm -rf /tmp/x");
        let b = classify("rm -rf /tmp/x");
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
    }
}
