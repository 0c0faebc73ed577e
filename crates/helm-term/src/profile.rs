// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Host profile: a one-shot probe of the remote/local host plus
//! Agent-authored path facts (§3 `HostProfile`, §6 host-probe grammar).

use chrono::{DateTime, Utc};

const MAX_NOTES: usize = 20;

#[derive(Debug, Clone)]
pub struct HostProfile {
    pub host_id: String,
    pub hostname: Option<String>,
    pub username: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub shell: Option<String>,
    pub package_manager: Option<String>,
    pub installed_tools: Vec<String>,
    pub notes: Vec<String>,
    pub last_probed: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl HostProfile {
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            hostname: None,
            username: None,
            os: None,
            os_version: None,
            shell: None,
            package_manager: None,
            installed_tools: Vec::new(),
            notes: Vec::new(),
            last_probed: None,
            last_updated: Utc::now(),
        }
    }

    /// Append a deduplicated path fact, capped at 20 (§4.2).
    pub fn remember(&mut self, note: impl Into<String>) {
        let note = note.into();
        if self.notes.iter().any(|n| n == &note) {
            return;
        }
        if self.notes.len() >= MAX_NOTES {
            self.notes.remove(0);
        }
        self.notes.push(note);
        self.last_updated = Utc::now();
    }

    pub fn apply_probe(&mut self, output: &str) {
        let parsed = parse_probe_output(output);
        self.hostname = parsed.hostname.or_else(|| self.hostname.clone());
        self.username = parsed.username.or_else(|| self.username.clone());
        self.os = parsed.os.or_else(|| self.os.clone());
        self.os_version = parsed.os_version.or_else(|| self.os_version.clone());
        self.shell = parsed.shell.or_else(|| self.shell.clone());
        self.package_manager = parsed.package_manager.or_else(|| self.package_manager.clone());
        self.installed_tools = parsed.installed_tools;
        self.last_probed = Some(Utc::now());
        self.last_updated = Utc::now();
    }
}

#[derive(Default)]
struct ParsedProbe {
    hostname: Option<String>,
    username: Option<String>,
    os: Option<String>,
    os_version: Option<String>,
    shell: Option<String>,
    package_manager: Option<String>,
    installed_tools: Vec<String>,
}

const PKG_MARKERS: &[(&str, &str)] = &[
    ("[PKG_APT]", "apt"),
    ("[PKG_DNF]", "dnf"),
    ("[PKG_YUM]", "yum"),
    ("[PKG_BREW]", "brew"),
    ("[PKG_PACMAN]", "pacman"),
];

const HAS_MARKERS: &[&str] = &[
    "[HAS_GIT]", "[HAS_DOCKER]", "[HAS_PYTHON3]", "[HAS_PYTHON]", "[HAS_NODE]",
    "[HAS_NGINX]", "[HAS_SYSTEMD]", "[HAS_VIM]", "[HAS_NANO]",
];

/// Parse the concatenated output of the fixed host-probe script (§6).
/// Line-oriented and tolerant of extra noise interleaved between markers.
fn parse_probe_output(output: &str) -> ParsedProbe {
    let mut parsed = ParsedProbe::default();
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("HOSTNAME=") {
            parsed.hostname = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("USERNAME=") {
            parsed.username = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("OS=") {
            parsed.os = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("OS_VERSION=") {
            parsed.os_version = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("SHELL=") {
            parsed.shell = Some(rest.to_string());
        }
        for (marker, name) in PKG_MARKERS {
            if line.contains(marker) {
                parsed.package_manager = Some(name.to_string());
            }
        }
        for marker in HAS_MARKERS {
            if line.contains(marker) {
                let tool = marker.trim_start_matches("[HAS_").trim_end_matches(']').to_ascii_lowercase();
                if !parsed.installed_tools.contains(&tool) {
                    parsed.installed_tools.push(tool);
                }
            }
        }
    }
    parsed
}

/// Regexes (applied as plain substring/word checks) that mark a piece of
/// text as "dynamic" — not a stable path fact worth remembering — per §4.2's
/// `remember_info` filter: port numbers, PIDs, status codes, percentages,
/// connection counts.
pub fn looks_dynamic(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    let has_digit_word = |word: &str| {
        lower
            .split_whitespace()
            .any(|tok| tok.starts_with(word) && tok.chars().any(|c| c.is_ascii_digit()))
    };
    lower.contains("pid ") || lower.contains("port ") || has_digit_word("pid")
        || has_digit_word("port") || lower.contains('%') || lower.contains("connections")
        || lower.contains("status ") && lower.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_parses_markers() {
        let output = "HOSTNAME=devbox\nOS=Linux\n[PKG_APT] apt 2.4\n[HAS_GIT] git 2.30\n[HAS_DOCKER] docker 24\n";
        let mut profile = HostProfile::new("local");
        profile.apply_probe(output);
        assert_eq!(profile.hostname.as_deref(), Some("devbox"));
        assert_eq!(profile.package_manager.as_deref(), Some("apt"));
        assert!(profile.installed_tools.contains(&"git".to_string()));
        assert!(profile.installed_tools.contains(&"docker".to_string()));
    }

    #[test]
    fn notes_deduplicate_and_cap() {
        let mut profile = HostProfile::new("local");
        for i in 0..25 {
            profile.remember(format!("fact {i}"));
        }
        assert_eq!(profile.notes.len(), MAX_NOTES);
        profile.remember("fact 24".to_string());
        assert_eq!(profile.notes.len(), MAX_NOTES);
    }

    #[test]
    fn dynamic_info_rejected() {
        assert!(looks_dynamic("server is listening on port 8080"));
        assert!(looks_dynamic("disk usage is at 85%"));
        assert!(!looks_dynamic("project source lives at /srv/app/src"));
    }
}
