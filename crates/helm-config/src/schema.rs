// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// Used for config fields that should be enabled unless the user explicitly
/// sets them to `false`.  `#[serde(default)]` on a `bool` always falls back
/// to `bool::default()` (i.e. `false`), so a named function is required.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    /// Named provider configurations.
    ///
    /// Define custom endpoints, local models, or additional accounts here and
    /// reference them by name with `--model <key>` or `--model <key>/<model>`.
    ///
    /// ```yaml
    /// providers:
    ///   my_ollama:
    ///     provider: openai        # uses the OpenAI-compatible wire format
    ///     base_url: http://localhost:11434/v1
    ///     name: llama3.2          # default model for this provider
    ///   work_anthropic:
    ///     provider: anthropic
    ///     api_key_env: WORK_ANTHROPIC_KEY
    ///     name: claude-opus-4-5
    /// ```
    #[serde(default)]
    pub providers: std::collections::HashMap<String, ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier.  Run `helm list-providers` for the full list.
    /// Common values: "openai" | "anthropic" | "azure" | "groq" |
    /// "openrouter" | "ollama" | "mistral" | "deepseek" | "mock"
    pub provider: String,
    /// Model name forwarded to the provider API
    pub name: String,
    /// Environment variable that holds the API key (read at runtime)
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files
    pub api_key: Option<String>,
    /// Base URL override.  Useful for local proxies, LiteLLM, or Cloudflare.
    /// For most hosted providers the correct default is auto-selected.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0)
    pub temperature: Option<f32>,

    // ── Azure OpenAI ─────────────────────────────────────────────────────────
    /// Azure resource name (the subdomain of `.openai.azure.com`).
    /// Required when provider = "azure" and base_url is not set.
    pub azure_resource: Option<String>,
    /// Azure deployment name.  Defaults to `model.name` when not set.
    pub azure_deployment: Option<String>,
    /// Azure REST API version string, e.g. `"2024-02-01"`.
    pub azure_api_version: Option<String>,

    // ── Prompt caching ────────────────────────────────────────────────────────
    /// Attach an explicit cache-control marker to the system message.
    ///
    /// **Anthropic**: adds `"cache_control": {"type": "ephemeral"}` to the
    /// system block, which tells the API to cache the prefix up to and
    /// including that block.  Anthropic charges a one-time write fee and
    /// subsequent calls save ~90% on cached input tokens.
    ///
    /// **Other providers**: has no effect; they cache automatically or not
    /// at all.
    #[serde(default = "default_true")]
    pub cache_system_prompt: bool,

    /// Use the extended (1-hour) cache TTL instead of the default 5-minute
    /// window.  Applies to the system prompt (when `cache_system_prompt = true`)
    /// and to tool definitions (when `cache_tools = true`).  Only meaningful
    /// for the Anthropic provider.  Sends the
    /// `anthropic-beta: extended-cache-ttl-2025-04-11` header automatically.
    ///
    /// Conversation caching (`cache_conversation`) always uses the 5-minute
    /// TTL regardless of this setting, because conversation turns are
    /// typically frequent enough to keep the cache refreshed within 5 minutes.
    #[serde(default)]
    pub extended_cache_time: bool,

    /// Cache tool definitions using Anthropic prompt caching.
    ///
    /// Tool definitions are stable across requests within a session, making
    /// them ideal for caching.  The last tool in the list receives a
    /// `cache_control` marker so Anthropic caches all tool definitions as a
    /// prefix.  Uses the same TTL as `extended_cache_time` controls (1-hour
    /// when true, 5-minute otherwise).
    #[serde(default = "default_true")]
    pub cache_tools: bool,

    /// Enable automatic conversation caching (Anthropic only).
    ///
    /// Adds a top-level `cache_control` marker that instructs Anthropic to
    /// automatically cache conversation history up to the last message.
    /// Subsequent turns read prior context from cache at 10% of the base
    /// token cost, dramatically reducing cost for multi-turn agent sessions.
    ///
    /// The cache breakpoint automatically advances with each new turn so no
    /// manual management is needed.
    #[serde(default = "default_true")]
    pub cache_conversation: bool,

    /// Cache image content blocks in conversation history (Anthropic only).
    ///
    /// Uses the same TTL tier as `extended_cache_time` controls.  The number
    /// of cached images is bounded by the remaining Anthropic breakpoint budget
    /// (maximum 4 breakpoints total across system, tools, conversation, and
    /// images/tool-results).
    #[serde(default = "default_true")]
    pub cache_images: bool,

    /// Cache large tool results in conversation history (Anthropic only).
    ///
    /// When an agent reads files, runs commands, or fetches terminal output,
    /// those tool results can consume thousands of tokens on every subsequent
    /// turn.  Marking them with `cache_control` once saves ~90% on those
    /// tokens for all following turns.
    ///
    /// A result is eligible when its serialised content exceeds 4 096
    /// characters (~1 024 tokens, the Anthropic minimum cacheable length for
    /// Sonnet-class models).  The oldest eligible results are cached first;
    /// the count is bounded by the remaining breakpoint budget.
    ///
    /// Uses the same TTL tier as `extended_cache_time` controls.
    #[serde(default = "default_true")]
    pub cache_tool_results: bool,

    // ── Provider-specific extras ──────────────────────────────────────────────
    /// Free-form provider-specific options forwarded as-is to the driver.
    /// Useful for headers or parameters not covered by the standard fields.
    #[serde(default)]
    pub driver_options: serde_json::Value,

    // ── Mock provider ─────────────────────────────────────────────────────────
    /// Path to YAML mock-responses file (used when provider = "mock").
    /// Can also be set via the HELM_MOCK_RESPONSES environment variable.
    pub mock_responses_file: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            // api_key_env is intentionally None here.  resolve_api_key() falls
            // through to the driver registry, which already knows the canonical
            // env-var name for each provider (OPENAI_API_KEY, ANTHROPIC_API_KEY,
            // etc.).  Hard-coding it here would shadow the registry lookup and
            // cause the wrong key to be sent whenever the provider is overridden.
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
            azure_resource: None,
            azure_deployment: None,
            azure_api_version: None,
            // Comprehensive caching is on by default for every provider that
            // supports it (currently Anthropic).  The flags are no-ops for
            // providers such as OpenAI that cache automatically.  Only the
            // extended (1-hour) TTL remains opt-in because it carries a 2×
            // write cost that is only worthwhile when turns are >5 min apart.
            cache_system_prompt: true,
            extended_cache_time: false,
            cache_tools: true,
            cache_conversation: true,
            cache_images: true,
            cache_tool_results: true,
            driver_options: serde_json::Value::Null,
            mock_responses_file: None,
        }
    }
}

fn default_true_enabled() -> bool {
    true
}
fn default_max_steps() -> u32 {
    // 0 means unbounded (Q2): an explicit opt-in is required to bound a run.
    0
}
fn default_command_timeout_ms() -> u64 {
    30_000
}

/// Agent run-loop configuration (SPEC_FULL.md §6).
///
/// Narrowed to exactly the knobs the run loop and its confirmation gate read;
/// everything else about a run (system prompt, tool set, terminal driver) is
/// wired at construction time, not configured here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Master on/off switch; a disabled agent refuses to start a run.
    #[serde(default = "default_true_enabled")]
    pub enabled: bool,
    /// Maximum number of run-loop steps before the run stops itself.
    /// 0 means unbounded.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Default timeout for a single `execute_command` call, in milliseconds.
    /// Commands classified as `TimedExecution` use their own duration instead.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Auto-execute commands classified `RiskLevel::Safe` without pausing for
    /// confirmation.
    #[serde(default = "default_true_enabled")]
    pub auto_execute_safe: bool,
    /// Auto-execute commands classified `RiskLevel::Moderate` without pausing
    /// for confirmation.
    #[serde(default = "default_true_enabled")]
    pub auto_execute_moderate: bool,
    /// Require confirmation for every command regardless of risk level,
    /// overriding `auto_execute_safe` and `auto_execute_moderate`.
    #[serde(default)]
    pub strict_mode: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_steps: default_max_steps(),
            command_timeout_ms: default_command_timeout_ms(),
            auto_execute_safe: true,
            auto_execute_moderate: true,
            strict_mode: false,
        }
    }
}

/// A known SSH host the terminal driver can connect to by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshHostConfig {
    /// Hostname or address to connect to.
    pub host: String,
    /// Remote username; defaults to the local username when unset.
    #[serde(default)]
    pub user: Option<String>,
    /// SSH port; defaults to 22 when unset.
    #[serde(default)]
    pub port: Option<u16>,
    /// Path to a private key file; falls back to agent-based auth when unset.
    #[serde(default)]
    pub identity_file: Option<String>,
}

/// Terminal driver configuration: default shell, known SSH hosts, and an
/// optional jump host used to reach hosts behind a bastion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Shell binary used for local sessions; defaults to $SHELL or `/bin/sh`
    /// when unset.
    #[serde(default)]
    pub default_shell: Option<String>,
    /// Hosts the agent may open SSH sessions against, addressable by name.
    #[serde(default)]
    pub ssh_hosts: Vec<SshHostConfig>,
    /// Bastion host used to forward connections to hosts that are not
    /// directly reachable.
    #[serde(default)]
    pub jump_host: Option<SshHostConfig>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
