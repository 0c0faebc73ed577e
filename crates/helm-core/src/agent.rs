// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The reactive agent run loop (SPEC_FULL.md §4.8, §5, §6).
//!
//! One [`Agent`] drives one [`Session`] against one [`ModelProvider`] and one
//! [`ToolRegistry`]/[`ToolContext`] pair. `run()` executes the loop described
//! in §4.8: flush supplemental user input, compress history once the
//! compression budget is exceeded, stream one model turn, gate risky tool
//! calls behind a confirmation (C6), dispatch the rest, update reflection
//! bookkeeping, repeat until the model stops calling tools or the run is
//! aborted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::{mpsc, oneshot, Notify};
use uuid::Uuid;

use helm_config::AgentConfig;
use helm_model::{
    CompletionRequest, FunctionCall, Message, MessageContent, ModelProvider, ResponseEvent, Role,
};
use helm_tools::{classify, CommandHandling, RiskLevel, ToolCall, ToolContext, ToolRegistry};

use crate::compact::compact_session;
use crate::events::{AgentEvent, AgentStep, PendingConfirmationInfo, StepKind};
use crate::prompts::{system_prompt, PromptContext};
use crate::reflection::ReflectionState;
use crate::runtime_context::AgentRuntimeContext;
use crate::session::Session;

/// A single tool call awaiting user approval (SPEC_FULL.md §3
/// `PendingConfirmation`). The resolver is consumed by exactly one of
/// [`Agent::resolve_confirmation`] or [`Agent::abort`].
pub struct PendingConfirmation {
    pub tool_call_id: String,
    pub tool_name: String,
    pub tool_args: Value,
    pub risk_level: Option<RiskLevel>,
    resolver: oneshot::Sender<(bool, Option<Value>)>,
}

/// A tool call accumulated across streamed deltas, keyed by provider index
/// rather than `id` (SPEC_FULL.md §4.7 — some providers omit `id` on
/// continuation deltas).
#[derive(Debug, Default, Clone)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// One model turn's accumulated output.
struct TurnResult {
    text: String,
    tool_calls: Vec<PendingToolCall>,
}

/// Decide whether a tool call needs user confirmation before it runs
/// (SPEC_FULL.md §4.6 C6). `execute_command` risk is classifier-derived;
/// `write_file` always requires confirmation regardless of configuration.
fn needs_confirmation(tool_name: &str, risk: Option<RiskLevel>, config: &AgentConfig) -> bool {
    match tool_name {
        "write_file" => true,
        "execute_command" => match risk {
            Some(RiskLevel::Blocked) => false, // blocked commands are refused, not confirmed
            Some(RiskLevel::Dangerous) => true,
            Some(RiskLevel::Moderate) => config.strict_mode || !config.auto_execute_moderate,
            Some(RiskLevel::Safe) => config.strict_mode || !config.auto_execute_safe,
            None => true,
        },
        _ => false,
    }
}

/// Drives one agent run to completion or abort.
pub struct Agent {
    id: String,
    session: Mutex<Session>,
    tools: Arc<ToolRegistry>,
    tool_ctx: ToolContext,
    provider: Arc<dyn ModelProvider>,
    config: AgentConfig,
    runtime_ctx: AgentRuntimeContext,
    reflection: Mutex<ReflectionState>,
    aborted: Arc<AtomicBool>,
    cancel: Arc<Notify>,
    pending_confirmation: Mutex<Option<PendingConfirmation>>,
    pending_user_messages: Mutex<Vec<String>>,
    events: mpsc::UnboundedSender<AgentEvent>,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        session: Session,
        tools: Arc<ToolRegistry>,
        tool_ctx: ToolContext,
        provider: Arc<dyn ModelProvider>,
        config: AgentConfig,
        runtime_ctx: AgentRuntimeContext,
    ) -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let agent = Self {
            id: id.into(),
            session: Mutex::new(session),
            tools,
            tool_ctx,
            provider,
            config,
            runtime_ctx,
            reflection: Mutex::new(ReflectionState::new()),
            aborted: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(Notify::new()),
            pending_confirmation: Mutex::new(None),
            pending_user_messages: Mutex::new(Vec::new()),
            events: tx,
        };
        (agent, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a supplemental user message to be folded in at the start of the
    /// next loop iteration (SPEC_FULL.md §4.8 step 1). Safe to call from
    /// outside the task running [`Agent::run`].
    pub async fn push_user_message(&self, text: impl Into<String>) {
        self.pending_user_messages.lock().await.push(text.into());
    }

    /// Resolve the current pending confirmation, if any. Returns `false` if
    /// there was nothing to resolve (already resolved, or none posted).
    pub async fn resolve_confirmation(&self, approved: bool, modified_args: Option<Value>) -> bool {
        let mut guard = self.pending_confirmation.lock().await;
        if let Some(pc) = guard.take() {
            let _ = pc.resolver.send((approved, modified_args));
            true
        } else {
            false
        }
    }

    /// Cancel the run (SPEC_FULL.md §5). Any in-flight model stream is
    /// interrupted and any pending confirmation resolves as rejected.
    pub async fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.cancel.notify_waiters();
        let mut guard = self.pending_confirmation.lock().await;
        if let Some(pc) = guard.take() {
            let _ = pc.resolver.send((false, None));
        }
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    async fn emit_step(&self, kind: StepKind, content: impl Into<String>) -> AgentStep {
        let step = AgentStep::new(Uuid::new_v4().to_string(), kind, content);
        self.emit(step.clone()).await;
        step
    }

    async fn emit(&self, step: AgentStep) {
        let _ = self.events.send(AgentEvent::OnStep { agent_id: self.id.clone(), step });
    }

    async fn build_system_prompt(&self) -> String {
        if let Some(ov) = &self.runtime_ctx.system_prompt_override {
            return ov.clone();
        }
        let profile = self.tool_ctx.host_profile.lock().await.clone();
        let ctx = PromptContext {
            host_profile: Some(&profile),
            append: self.runtime_ctx.append_system_prompt.as_deref(),
            ..Default::default()
        };
        system_prompt(ctx)
    }

    /// Run the agent loop to completion. `initial_message`, if given, is
    /// pushed as a user turn before the loop starts.
    pub async fn run(&self, initial_message: Option<String>) -> anyhow::Result<String> {
        if !self.config.enabled {
            anyhow::bail!("agent is disabled");
        }

        {
            let needs_system_prompt = self.session.lock().await.messages.is_empty();
            if needs_system_prompt {
                let prompt = self.build_system_prompt().await;
                self.session.lock().await.push(Message::system(prompt));
            }
            if let Some(text) = initial_message {
                self.session.lock().await.push(Message::user(text));
            }
        }

        let mut step_count: u32 = 0;
        loop {
            if self.is_aborted() {
                let err = "run aborted".to_string();
                let _ = self.events.send(AgentEvent::OnError { agent_id: self.id.clone(), error: err.clone() });
                anyhow::bail!(err);
            }

            if self.config.max_steps != 0 && step_count >= self.config.max_steps {
                let final_text = "stopped: reached the maximum number of steps for this run".to_string();
                let _ = self
                    .events
                    .send(AgentEvent::OnComplete { agent_id: self.id.clone(), final_text: final_text.clone() });
                return Ok(final_text);
            }

            self.flush_pending_user_messages().await;
            self.maybe_compress(step_count).await;

            let turn = match self.stream_one_turn().await {
                Ok(t) => t,
                Err(e) => {
                    let _ = self
                        .events
                        .send(AgentEvent::OnError { agent_id: self.id.clone(), error: e.to_string() });
                    return Err(e);
                }
            };

            if turn.tool_calls.is_empty() {
                {
                    let mut session = self.session.lock().await;
                    session.push(Message::assistant(turn.text.clone()));
                }
                self.emit_step(StepKind::Message, turn.text.clone()).await;
                let _ = self
                    .events
                    .send(AgentEvent::OnComplete { agent_id: self.id.clone(), final_text: turn.text.clone() });
                return Ok(turn.text);
            }

            if !turn.text.trim().is_empty() {
                self.emit_step(StepKind::Message, turn.text.clone()).await;
            }

            {
                let mut session = self.session.lock().await;
                for tc in &turn.tool_calls {
                    session.push(Message {
                        role: Role::Assistant,
                        content: MessageContent::ToolCall {
                            tool_call_id: tc.id.clone(),
                            function: FunctionCall { name: tc.name.clone(), arguments: tc.arguments.clone() },
                        },
                    });
                }
            }

            for tc in &turn.tool_calls {
                if self.is_aborted() {
                    break;
                }
                let (success, result_text) = self.dispatch_tool_call(tc).await;
                {
                    let mut session = self.session.lock().await;
                    session.push(Message::tool_result(tc.id.clone(), result_text));
                }

                let command = if tc.name == "execute_command" {
                    serde_json::from_str::<Value>(&tc.arguments)
                        .ok()
                        .and_then(|v| v.get("command").and_then(|c| c.as_str()).map(str::to_string))
                } else {
                    None
                };
                let mut reflection = self.reflection.lock().await;
                reflection.record_tool_call(success, command.as_deref());
                reflection.maybe_switch_strategy();
            }

            let should_reflect = self.reflection.lock().await.should_reflect();
            if should_reflect {
                let prompt = {
                    let mut reflection = self.reflection.lock().await;
                    let prompt = reflection.reflection_prompt();
                    reflection.mark_reflected();
                    prompt
                };
                let mut session = self.session.lock().await;
                session.push(Message::user(prompt));
            }

            step_count += 1;
        }
    }

    async fn flush_pending_user_messages(&self) {
        let pending: Vec<String> = {
            let mut guard = self.pending_user_messages.lock().await;
            std::mem::take(&mut *guard)
        };
        if pending.is_empty() {
            return;
        }
        for text in &pending {
            self.emit_step(StepKind::UserSupplement, text.clone()).await;
        }
        let bundled = pending.join("\n");
        let mut session = self.session.lock().await;
        session.push(Message::user(format!("[user supplement]\n{bundled}")));
    }

    async fn maybe_compress(&self, step_count: u32) {
        if step_count <= 3 {
            return;
        }
        let mut session = self.session.lock().await;
        if session.over_compression_budget() {
            let budget = session.compression_budget();
            let compressed = compact_session(&session.messages, budget);
            session.replace_messages(compressed);
        }
    }

    /// Stream one completion turn, accumulating text/thinking/tool-call
    /// deltas and emitting streaming `Message` steps as text arrives.
    async fn stream_one_turn(&self) -> anyhow::Result<TurnResult> {
        let (messages, tool_schemas) = {
            let session = self.session.lock().await;
            let schemas = self
                .tools
                .schemas()
                .into_iter()
                .map(|s| helm_model::ToolSchema { name: s.name, description: s.description, parameters: s.parameters })
                .collect();
            (session.messages.clone(), schemas)
        };

        let req = CompletionRequest { messages, tools: tool_schemas, stream: true, system_dynamic_suffix: None };

        let mut stream = self.provider.complete(req).await?;

        let mut text = String::new();
        let mut tool_calls: Vec<PendingToolCall> = Vec::new();
        let step_id = Uuid::new_v4().to_string();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.notified() => {
                    anyhow::bail!("run aborted");
                }
                item = stream.next() => item,
            };

            let event = match next {
                Some(r) => r?,
                None => break,
            };

            match event {
                ResponseEvent::TextDelta(delta) => {
                    text.push_str(&delta);
                    let step = AgentStep::new(step_id.clone(), StepKind::Message, text.clone()).streaming(true);
                    self.emit(step).await;
                }
                ResponseEvent::ThinkingDelta(delta) => {
                    self.emit_step(StepKind::Thinking, delta).await;
                }
                ResponseEvent::ToolCall { index, id, name, arguments } => {
                    if index >= tool_calls.len() {
                        tool_calls.resize(index + 1, PendingToolCall::default());
                    }
                    let entry = &mut tool_calls[index];
                    if !id.is_empty() {
                        entry.id = id;
                    }
                    if !name.is_empty() {
                        entry.name = name;
                    }
                    entry.arguments.push_str(&arguments);
                }
                ResponseEvent::Usage { .. } => {}
                ResponseEvent::Done => break,
                ResponseEvent::Error(msg) => {
                    anyhow::bail!("model stream error: {msg}");
                }
            }
        }

        // Drop any tool-call slot that never received a name (a provider
        // quirk, not a real call).
        tool_calls.retain(|tc| !tc.name.is_empty());
        for tc in &mut tool_calls {
            if tc.id.is_empty() {
                tc.id = Uuid::new_v4().to_string();
            }
        }

        Ok(TurnResult { text, tool_calls })
    }

    /// Dispatch one accumulated tool call: gate it behind confirmation when
    /// required (C6), then execute it. Returns `(success, result_text)`.
    async fn dispatch_tool_call(&self, tc: &PendingToolCall) -> (bool, String) {
        let mut args: Value = match serde_json::from_str(&tc.arguments) {
            Ok(v) => v,
            Err(e) => {
                let msg = format!("invalid tool arguments for {}: {e}", tc.name);
                self.emit_step(StepKind::Error, msg.clone()).await;
                return (false, msg);
            }
        };

        let mut risk = None;
        let mut rewrite_note = String::new();

        if tc.name == "execute_command" {
            if let Some(command) = args.get("command").and_then(Value::as_str) {
                let (r, handling) = classify(command);
                risk = Some(r);
                match handling {
                    CommandHandling::Block { reason, hint } => {
                        let msg = format!("blocked: {reason} ({hint})");
                        self.emit_step(StepKind::Error, msg.clone()).await;
                        return (false, msg);
                    }
                    CommandHandling::AutoFix { rewritten } => {
                        if let Some(obj) = args.as_object_mut() {
                            obj.insert("command".to_string(), Value::String(rewritten.clone()));
                        }
                        rewrite_note = format!("rewritten to `{rewritten}`");
                    }
                    CommandHandling::FireAndForget { .. }
                    | CommandHandling::TimedExecution { .. }
                    | CommandHandling::Allow => {}
                }
            }
        }

        let mut step = AgentStep::new(Uuid::new_v4().to_string(), StepKind::ToolCall, rewrite_note)
            .with_tool(tc.name.clone(), args.clone());
        if let Some(r) = risk {
            step = step.with_risk(r);
        }
        self.emit(step).await;

        if needs_confirmation(&tc.name, risk, &self.config) {
            let (tx, rx) = oneshot::channel();
            {
                let mut guard = self.pending_confirmation.lock().await;
                *guard = Some(PendingConfirmation {
                    tool_call_id: tc.id.clone(),
                    tool_name: tc.name.clone(),
                    tool_args: args.clone(),
                    risk_level: risk,
                    resolver: tx,
                });
            }
            let _ = self.events.send(AgentEvent::OnNeedConfirm {
                agent_id: self.id.clone(),
                confirmation: PendingConfirmationInfo {
                    tool_call_id: tc.id.clone(),
                    tool_name: tc.name.clone(),
                    tool_args: args.clone(),
                    risk_level: risk,
                },
            });

            let resolution = tokio::select! {
                biased;
                _ = self.cancel.notified() => (false, None),
                r = rx => r.unwrap_or((false, None)),
            };
            let (approved, modified_args) = resolution;
            {
                let mut guard = self.pending_confirmation.lock().await;
                *guard = None;
            }
            if !approved {
                self.emit_step(StepKind::Confirm, "rejected by user").await;
                return (false, "rejected by user".to_string());
            }
            if let Some(m) = modified_args {
                args = m;
            }
        }

        let call = ToolCall { id: tc.id.clone(), name: tc.name.clone(), args };
        let output = self.tools.execute(&call, &self.tool_ctx).await;

        let display = if tc.name == "read_file" && output.content.chars().count() > 500 {
            format!("{}…", output.content.chars().take(500).collect::<String>())
        } else {
            output.content.clone()
        };
        self.emit_step(StepKind::ToolResult, display).await;

        (!output.is_error, output.content)
    }
}

impl Clone for PendingToolCall {
    fn clone(&self) -> Self {
        Self { id: self.id.clone(), name: self.name.clone(), arguments: self.arguments.clone() }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use helm_config::AgentConfig;
    use helm_model::ScriptedMockProvider;
    use helm_term::{
        ControlKey, ExecuteOutcome, HostProfile, LocalProcessStatus, RemoteProcesses,
        TerminalDriver, TerminalKind, TerminalState,
    };
    use std::sync::Arc;
    use std::time::Duration as StdDuration;
    use tokio::sync::{broadcast, Mutex as TokioMutex};

    struct NullDriver {
        tx: broadcast::Sender<Bytes>,
    }

    #[async_trait]
    impl TerminalDriver for NullDriver {
        fn kind(&self) -> TerminalKind {
            TerminalKind::Local
        }
        async fn write(&self, _data: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn resize(&self, _cols: u16, _rows: u16) -> anyhow::Result<()> {
            Ok(())
        }
        fn subscribe(&self) -> broadcast::Receiver<Bytes> {
            self.tx.subscribe()
        }
        async fn execute_in_terminal(&self, _command: &str, _timeout: StdDuration) -> ExecuteOutcome {
            ExecuteOutcome { output: String::new(), duration: StdDuration::ZERO, timed_out: false }
        }
        async fn get_cwd(&self) -> Option<String> {
            None
        }
        async fn get_terminal_status(&self) -> LocalProcessStatus {
            LocalProcessStatus::default()
        }
        async fn get_remote_processes(&self) -> Option<RemoteProcesses> {
            None
        }
        async fn send_control(&self, _key: ControlKey) -> anyhow::Result<()> {
            Ok(())
        }
        async fn dispose(&self) {}
    }

    fn null_driver() -> Arc<dyn TerminalDriver> {
        let (tx, _rx) = broadcast::channel(16);
        Arc::new(NullDriver { tx })
    }

    fn test_ctx() -> ToolContext {
        ToolContext::new(
            null_driver(),
            Arc::new(TokioMutex::new(TerminalState::new("local", TerminalKind::Local, "/tmp"))),
            StdDuration::from_secs(30),
            Arc::new(TokioMutex::new(HostProfile::new("test@host"))),
        )
    }

    fn tools() -> Arc<ToolRegistry> {
        let mut reg = ToolRegistry::new();
        reg.register(helm_tools::ExecuteCommandTool);
        reg.register(helm_tools::ReadFileTool);
        reg.register(helm_tools::WriteFileTool);
        reg.register(helm_tools::GetTerminalContextTool);
        reg.register(helm_tools::CheckTerminalStatusTool);
        reg.register(helm_tools::SendControlKeyTool);
        reg.register(helm_tools::RememberInfoTool);
        Arc::new(reg)
    }

    #[tokio::test]
    async fn text_only_turn_completes_without_tool_calls() {
        let provider = Arc::new(ScriptedMockProvider::always_text("all done"));
        let (agent, mut rx) = Agent::new(
            "a1",
            Session::new("s1", 32_000),
            tools(),
            test_ctx(),
            provider,
            AgentConfig::default(),
            AgentRuntimeContext::new(),
        );

        let result = agent.run(Some("do the thing".to_string())).await.unwrap();
        assert_eq!(result, "all done");

        let mut saw_complete = false;
        while let Ok(ev) = rx.try_recv() {
            if let AgentEvent::OnComplete { final_text, .. } = ev {
                assert_eq!(final_text, "all done");
                saw_complete = true;
            }
        }
        assert!(saw_complete);
    }

    #[tokio::test]
    async fn safe_command_auto_executes_without_confirmation() {
        let provider = Arc::new(ScriptedMockProvider::tool_then_text(
            "call-1",
            "execute_command",
            serde_json::json!({"command": "ls"}).to_string(),
            "listed",
        ));
        let (agent, mut rx) = Agent::new(
            "a1",
            Session::new("s1", 32_000),
            tools(),
            test_ctx(),
            provider,
            AgentConfig::default(),
            AgentRuntimeContext::new(),
        );

        let result = agent.run(Some("list files".to_string())).await.unwrap();
        assert_eq!(result, "listed");

        let mut saw_need_confirm = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, AgentEvent::OnNeedConfirm { .. }) {
                saw_need_confirm = true;
            }
        }
        assert!(!saw_need_confirm, "a safe auto-executable command must not pause for confirmation");
    }

    #[tokio::test]
    async fn write_file_always_requires_confirmation() {
        let provider = Arc::new(ScriptedMockProvider::tool_then_text(
            "call-1",
            "write_file",
            serde_json::json!({"path": "/tmp/x", "content": "hi"}).to_string(),
            "wrote it",
        ));
        let (agent, mut rx) = Agent::new(
            "a1",
            Session::new("s1", 32_000),
            tools(),
            test_ctx(),
            provider,
            AgentConfig::default(),
            AgentRuntimeContext::new(),
        );

        let agent = Arc::new(agent);
        let run_agent = agent.clone();
        let handle = tokio::spawn(async move { run_agent.run(None).await });

        let mut confirmed = false;
        while let Some(ev) = rx.recv().await {
            if let AgentEvent::OnNeedConfirm { confirmation, .. } = ev {
                assert_eq!(confirmation.tool_name, "write_file");
                agent.resolve_confirmation(true, None).await;
                confirmed = true;
                break;
            }
        }
        assert!(confirmed);
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, "wrote it");
    }

    #[tokio::test]
    async fn rejecting_confirmation_feeds_failure_back_to_model() {
        let provider = Arc::new(ScriptedMockProvider::tool_then_text(
            "call-1",
            "write_file",
            serde_json::json!({"path": "/tmp/x", "content": "hi"}).to_string(),
            "acknowledged rejection",
        ));
        let (agent, mut rx) = Agent::new(
            "a1",
            Session::new("s1", 32_000),
            tools(),
            test_ctx(),
            provider,
            AgentConfig::default(),
            AgentRuntimeContext::new(),
        );
        let agent = Arc::new(agent);
        let run_agent = agent.clone();
        let handle = tokio::spawn(async move { run_agent.run(None).await });

        while let Some(ev) = rx.recv().await {
            if matches!(ev, AgentEvent::OnNeedConfirm { .. }) {
                agent.resolve_confirmation(false, None).await;
                break;
            }
        }
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, "acknowledged rejection");
    }

    #[tokio::test]
    async fn abort_stops_the_run() {
        let provider = Arc::new(ScriptedMockProvider::tool_then_text(
            "call-1",
            "write_file",
            serde_json::json!({"path": "/tmp/x", "content": "hi"}).to_string(),
            "unreachable",
        ));
        let (agent, mut rx) = Agent::new(
            "a1",
            Session::new("s1", 32_000),
            tools(),
            test_ctx(),
            provider,
            AgentConfig::default(),
            AgentRuntimeContext::new(),
        );
        let agent = Arc::new(agent);
        let run_agent = agent.clone();
        let handle = tokio::spawn(async move { run_agent.run(None).await });

        while let Some(ev) = rx.recv().await {
            if matches!(ev, AgentEvent::OnNeedConfirm { .. }) {
                agent.abort().await;
                break;
            }
        }
        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn strict_mode_requires_confirmation_for_safe_commands() {
        let mut config = AgentConfig::default();
        config.strict_mode = true;
        let provider = Arc::new(ScriptedMockProvider::tool_then_text(
            "call-1",
            "execute_command",
            serde_json::json!({"command": "ls"}).to_string(),
            "done",
        ));
        let (agent, mut rx) = Agent::new(
            "a1",
            Session::new("s1", 32_000),
            tools(),
            test_ctx(),
            provider,
            config,
            AgentRuntimeContext::new(),
        );
        let agent = Arc::new(agent);
        let run_agent = agent.clone();
        let handle = tokio::spawn(async move { run_agent.run(None).await });

        let mut saw_need_confirm = false;
        while let Some(ev) = rx.recv().await {
            if matches!(ev, AgentEvent::OnNeedConfirm { .. }) {
                saw_need_confirm = true;
                agent.resolve_confirmation(true, None).await;
                break;
            }
        }
        assert!(saw_need_confirm);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn max_steps_reached_stops_the_loop() {
        let mut config = AgentConfig::default();
        config.max_steps = 1;
        let provider = Arc::new(ScriptedMockProvider::tool_then_text(
            "call-1",
            "execute_command",
            serde_json::json!({"command": "ls"}).to_string(),
            "done",
        ));
        let (agent, _rx) = Agent::new(
            "a1",
            Session::new("s1", 32_000),
            tools(),
            test_ctx(),
            provider,
            config,
            AgentRuntimeContext::new(),
        );
        let result = agent.run(None).await.unwrap();
        assert!(result.contains("maximum number of steps"));
    }
}
