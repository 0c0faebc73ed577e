// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Deterministic memory compression (SPEC_FULL.md §4.8.1) and per-tool-result
//! truncation (§4.6's `smart_truncate`). No model call is involved in either
//! path — both are pure functions over message/string content.

use helm_model::{Message, MessageContent, Role};
use helm_tools::OutputCategory;
use regex::Regex;
use std::sync::OnceLock;

/// `tool` message content above this length is head/tail-compressed.
pub const TOOL_TRUNCATE_THRESHOLD: usize = 2_000;
/// `assistant` message content above this length is hard-truncated.
pub const ASSISTANT_TRUNCATE_THRESHOLD: usize = 3_000;
const HEAD_LINES: usize = 10;
const TAIL_LINES: usize = 10;
const KEY_POINTS_KEEP_RECENT: usize = 10;
const KEEP_RECENT_GROUPS: usize = 3;

fn keypoint_patterns() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(diagnosed|completed|error)\s*:\s*(.+)").unwrap())
}

/// Find the nearest valid char boundary at or before `idx`.
fn floor_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut i = idx;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Find the nearest valid char boundary at or after `idx`.
fn ceil_char_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

fn head_tail_lines(text: &str, head: usize, tail: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= head + tail {
        return text.to_string();
    }
    let omitted = lines.len() - head - tail;
    format!(
        "{}\n… [omitted {omitted} lines] …\n{}",
        lines[..head].join("\n"),
        lines[lines.len() - tail..].join("\n")
    )
}

/// Truncate one tool result's text to fit within `cap_chars`, using the
/// shape `category` implies about its content (SPEC_FULL.md §4.6).
pub fn smart_truncate(content: &str, category: OutputCategory, cap_chars: usize) -> String {
    if content.len() <= cap_chars {
        return content.to_string();
    }
    match category {
        OutputCategory::HeadTail => {
            let head = cap_chars * 3 / 5;
            let tail = cap_chars - head;
            let head_end = floor_char_boundary(content, head.min(content.len()));
            let tail_start = ceil_char_boundary(content, content.len().saturating_sub(tail));
            format!(
                "{}\n… [truncated {} chars] …\n{}",
                &content[..head_end],
                tail_start.saturating_sub(head_end),
                &content[tail_start..]
            )
        }
        OutputCategory::FileContent => {
            let head = cap_chars * 2 / 3;
            let tail = cap_chars - head;
            let head_end = floor_char_boundary(content, head.min(content.len()));
            let tail_start = ceil_char_boundary(content, content.len().saturating_sub(tail));
            format!(
                "{}\n… [truncated, {} chars omitted] …\n{}",
                &content[..head_end],
                tail_start.saturating_sub(head_end),
                &content[tail_start..]
            )
        }
        OutputCategory::Generic => {
            let end = floor_char_boundary(content, cap_chars);
            format!("{}… [truncated, {} chars omitted]", &content[..end], content.len() - end)
        }
    }
}

/// Compress a single message in place per step 2 of §4.8.1: `tool` content
/// over [`TOOL_TRUNCATE_THRESHOLD`] chars becomes a head/tail window; long
/// `assistant` content is hard-truncated.
fn compress_long_message(msg: &Message) -> Message {
    match (&msg.role, &msg.content) {
        (Role::Tool, MessageContent::ToolResult { tool_call_id, content }) => {
            if let Some(text) = content.as_text() {
                if text.len() > TOOL_TRUNCATE_THRESHOLD {
                    let compressed = head_tail_lines(text, HEAD_LINES, TAIL_LINES);
                    return Message::tool_result(tool_call_id.clone(), compressed);
                }
            }
            msg.clone()
        }
        (Role::Assistant, MessageContent::Text(text)) if text.len() > ASSISTANT_TRUNCATE_THRESHOLD => {
            let end = floor_char_boundary(text, ASSISTANT_TRUNCATE_THRESHOLD);
            Message::assistant(format!("{}… [truncated]", &text[..end]))
        }
        _ => msg.clone(),
    }
}

/// Extract "key point" sentences from compressed messages (step 3): regex
/// matches over assistant content for `diagnosed:`/`completed:`/`error:`,
/// and the first line of any tool error.
fn extract_key_points(messages: &[Message]) -> Vec<String> {
    let mut points = Vec::new();
    for msg in messages {
        match (&msg.role, &msg.content) {
            (Role::Assistant, MessageContent::Text(text)) => {
                for cap in keypoint_patterns().captures_iter(text) {
                    points.push(format!("{}: {}", &cap[1], cap[2].trim()));
                }
            }
            (Role::Tool, MessageContent::ToolResult { content, .. }) => {
                if let Some(text) = content.as_text() {
                    if let Some(first_line) = text.lines().next() {
                        if first_line.to_lowercase().contains("error") {
                            points.push(first_line.trim().to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    let mut seen = std::collections::HashSet::new();
    points.retain(|p| seen.insert(p.clone()));
    let keep_from = points.len().saturating_sub(KEY_POINTS_KEEP_RECENT);
    points[keep_from..].to_vec()
}

/// Group messages into turns: a leading system-only group, then a
/// user-start group per §4.8.1 — `user → assistant [→ tool_calls, tool
/// responses]` repeated. Preserves I3 (assistant-with-tool_calls always
/// stays adjacent to its tool responses) since a new group only starts at
/// the next `user` message.
fn group_into_turns(messages: &[Message]) -> (Vec<Message>, Vec<Vec<Message>>) {
    let mut i = 0;
    while i < messages.len() && messages[i].role == Role::System {
        i += 1;
    }
    let system_group = messages[..i].to_vec();

    let mut turns: Vec<Vec<Message>> = Vec::new();
    for msg in &messages[i..] {
        if msg.role == Role::User || turns.is_empty() {
            turns.push(vec![msg.clone()]);
        } else {
            turns.last_mut().unwrap().push(msg.clone());
        }
    }
    (system_group, turns)
}

fn turn_has_tool_calls(turn: &[Message]) -> bool {
    turn.iter()
        .any(|m| matches!(&m.content, MessageContent::ToolCall { .. }))
}

fn turn_len(turn: &[Message]) -> usize {
    turn.iter().map(|m| m.as_text().map(str::len).unwrap_or(0)).sum()
}

fn turn_tokens(turn: &[Message]) -> usize {
    turn.iter().map(Message::approx_tokens).sum()
}

const KEYWORD_BONUS_TERMS: &[&str] = &["error", "fix", "test", "fail"];

fn keyword_bonus(turn: &[Message]) -> f64 {
    let mut bonus = 0.0;
    for msg in turn {
        if let Some(text) = msg.as_text() {
            let lower = text.to_lowercase();
            for term in KEYWORD_BONUS_TERMS {
                if lower.contains(term) {
                    bonus += 5.0;
                }
            }
        }
    }
    bonus
}

/// Score a non-kept-recent turn group for budget selection (§4.8.1 step 4):
/// `position*0.3 + (user?20:0) + (has_tool_calls?15:0) + keyword bonuses
/// − (len>2000?10:0)`.
fn score_turn(turn: &[Message], position: usize) -> f64 {
    let is_user_start = turn.first().map(|m| m.role == Role::User).unwrap_or(false);
    let mut score = position as f64 * 0.3;
    if is_user_start {
        score += 20.0;
    }
    if turn_has_tool_calls(turn) {
        score += 15.0;
    }
    score += keyword_bonus(turn);
    if turn_len(turn) > 2_000 {
        score -= 10.0;
    }
    score
}

/// Compress `messages` to fit within `budget_tokens` (SPEC_FULL.md §4.8.1).
///
/// Runs the full 5-step algorithm unconditionally; callers decide when to
/// invoke it (after step 3 of the run loop, per §4.8).
pub fn compact_session(messages: &[Message], budget_tokens: usize) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    // Step 1 + 2: keep system group verbatim, compress long individual messages.
    let (system_group, turns) = group_into_turns(messages);
    let compressed_turns: Vec<Vec<Message>> =
        turns.iter().map(|t| t.iter().map(compress_long_message).collect()).collect();

    let current_tokens = |groups: &[Vec<Message>]| -> usize {
        system_group.iter().map(Message::approx_tokens).sum::<usize>()
            + groups.iter().flatten().map(Message::approx_tokens).sum::<usize>()
    };

    if current_tokens(&compressed_turns) <= budget_tokens {
        let mut out = system_group.clone();
        out.extend(compressed_turns.into_iter().flatten());
        return out;
    }

    // Step 3: memory folding — extract key points from the compressed history.
    let all_compressed: Vec<Message> = compressed_turns.iter().flatten().cloned().collect();
    let key_points = extract_key_points(&all_compressed);

    // Step 4: keep the last 3 turns verbatim; score and select from the rest.
    let keep_from = compressed_turns.len().saturating_sub(KEEP_RECENT_GROUPS);
    let (older, recent) = compressed_turns.split_at(keep_from);
    let recent_tokens: usize = recent.iter().flatten().map(Message::approx_tokens).sum();
    let system_tokens: usize = system_group.iter().map(Message::approx_tokens).sum();

    let synthetic_summary_tokens = if key_points.is_empty() {
        0
    } else {
        Message::user(format!(
            "## Summary of earlier progress\n{}",
            key_points.iter().map(|p| format!("- {p}")).collect::<Vec<_>>().join("\n")
        ))
        .approx_tokens()
    };

    let mut remaining_budget = budget_tokens
        .saturating_sub(system_tokens)
        .saturating_sub(recent_tokens)
        .saturating_sub(synthetic_summary_tokens);

    let mut scored: Vec<(usize, f64, usize)> = older
        .iter()
        .enumerate()
        .map(|(pos, turn)| (pos, score_turn(turn, pos), turn_tokens(turn)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    let mut keep_indices = std::collections::HashSet::new();
    for (idx, _score, tokens) in scored {
        if tokens <= remaining_budget {
            keep_indices.insert(idx);
            remaining_budget -= tokens;
        }
    }

    // Step 5: synthetic summary message right after the system message.
    let mut out = system_group.clone();
    if !key_points.is_empty() {
        out.push(Message::user(format!(
            "## Summary of earlier progress\n{}",
            key_points.iter().map(|p| format!("- {p}")).collect::<Vec<_>>().join("\n")
        )));
    }
    for (idx, turn) in older.iter().enumerate() {
        if keep_indices.contains(&idx) {
            out.extend(turn.clone());
        }
    }
    out.extend(recent.iter().flatten().cloned());
    out
}

/// Deterministic fallback when [`compact_session`] still leaves the
/// history over budget: drop everything except the system group and the
/// last `keep_recent` turn groups.
pub fn emergency_compact(messages: &[Message], keep_recent: usize) -> Vec<Message> {
    let (system_group, turns) = group_into_turns(messages);
    let keep_from = turns.len().saturating_sub(keep_recent);
    let mut out = system_group;
    out.extend(turns[keep_from..].iter().flatten().cloned());
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_msg(id: &str, content: &str) -> Message {
        Message::tool_result(id, content)
    }

    #[test]
    fn smart_truncate_passes_through_short_content() {
        let out = smart_truncate("short", OutputCategory::Generic, 100);
        assert_eq!(out, "short");
    }

    #[test]
    fn smart_truncate_generic_hard_truncates() {
        let content = "x".repeat(100);
        let out = smart_truncate(&content, OutputCategory::Generic, 20);
        assert!(out.len() < content.len());
        assert!(out.contains("truncated"));
    }

    #[test]
    fn smart_truncate_headtail_keeps_both_ends() {
        let content = "A".repeat(30) + &"B".repeat(1000) + &"C".repeat(30);
        let out = smart_truncate(&content, OutputCategory::HeadTail, 100);
        assert!(out.starts_with("AAA"));
        assert!(out.ends_with("CCC"));
    }

    #[test]
    fn smart_truncate_filecontent_keeps_both_ends() {
        let content = "A".repeat(50) + &"B".repeat(1000) + &"C".repeat(50);
        let out = smart_truncate(&content, OutputCategory::FileContent, 100);
        assert!(out.starts_with("AAA"));
        assert!(out.ends_with("CCC"));
    }

    #[test]
    fn group_into_turns_keeps_system_separate() {
        let messages = vec![Message::system("sys"), Message::user("hi"), Message::assistant("hello")];
        let (sys, turns) = group_into_turns(&messages);
        assert_eq!(sys.len(), 1);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].len(), 2);
    }

    #[test]
    fn group_into_turns_preserves_tool_call_adjacency() {
        // user -> assistant(tool_calls) -> tool -> tool -> user -> assistant
        let messages = vec![
            Message::system("sys"),
            Message::user("do something"),
            Message {
                role: Role::Assistant,
                content: MessageContent::ToolCall {
                    tool_call_id: "c1".into(),
                    function: helm_model::FunctionCall { name: "ls".into(), arguments: "{}".into() },
                },
            },
            tool_msg("c1", "output"),
            Message::user("next"),
            Message::assistant("done"),
        ];
        let (_, turns) = group_into_turns(&messages);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].len(), 3, "assistant+tool must stay with the user that started the turn");
        assert_eq!(turns[1].len(), 2);
    }

    #[test]
    fn compact_session_no_op_under_budget() {
        let messages = vec![Message::system("sys"), Message::user("hi"), Message::assistant("hello")];
        let out = compact_session(&messages, 10_000);
        assert_eq!(out.len(), messages.len());
    }

    #[test]
    fn compact_session_compresses_long_tool_output() {
        let long_output = (1..=100).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        assert!(long_output.len() > TOOL_TRUNCATE_THRESHOLD);
        let messages = vec![
            Message::system("sys"),
            Message::user("run it"),
            Message {
                role: Role::Assistant,
                content: MessageContent::ToolCall {
                    tool_call_id: "c1".into(),
                    function: helm_model::FunctionCall { name: "execute_command".into(), arguments: "{}".into() },
                },
            },
            tool_msg("c1", &long_output),
        ];
        let out = compact_session(&messages, 10);
        let tool_out = out.iter().find_map(|m| match &m.content {
            MessageContent::ToolResult { content, .. } => content.as_text(),
            _ => None,
        });
        assert!(tool_out.unwrap().contains("omitted"));
    }

    #[test]
    fn compact_session_keeps_last_three_turns_verbatim() {
        let mut messages = vec![Message::system("sys")];
        for i in 0..10 {
            messages.push(Message::user(format!("turn {i}")));
            messages.push(Message::assistant(format!("reply {i}")));
        }
        let out = compact_session(&messages, 1);
        let texts: Vec<&str> = out.iter().filter_map(Message::as_text).collect();
        assert!(texts.iter().any(|t| t.contains("turn 9")));
        assert!(texts.iter().any(|t| t.contains("turn 8")));
        assert!(texts.iter().any(|t| t.contains("turn 7")));
    }

    #[test]
    fn compact_session_inserts_synthetic_summary_after_system() {
        let mut messages = vec![Message::system("sys")];
        for i in 0..10 {
            messages.push(Message::user(format!("turn {i}")));
            messages.push(Message::assistant(format!("completed: step {i} done")));
        }
        let out = compact_session(&messages, 1);
        assert!(out[1].as_text().unwrap_or("").contains("Summary of earlier progress"));
    }

    #[test]
    fn emergency_compact_drops_everything_but_recent() {
        let mut messages = vec![Message::system("sys")];
        for i in 0..10 {
            messages.push(Message::user(format!("turn {i}")));
            messages.push(Message::assistant(format!("reply {i}")));
        }
        let out = emergency_compact(&messages, 2);
        // system + 2 turns * 2 messages
        assert_eq!(out.len(), 1 + 4);
    }

    #[test]
    fn extract_key_points_dedupes_and_caps_at_ten() {
        let messages: Vec<Message> = (0..15)
            .map(|i| Message::assistant(format!("completed: step {i}")))
            .collect();
        let points = extract_key_points(&messages);
        assert_eq!(points.len(), 10);
        assert!(points.iter().all(|p| p.starts_with("completed:")));
    }

    #[test]
    fn extract_key_points_picks_up_tool_errors() {
        let messages = vec![tool_msg("c1", "Error: file not found\nmore context")];
        let points = extract_key_points(&messages);
        assert_eq!(points, vec!["Error: file not found".to_string()]);
    }
}
