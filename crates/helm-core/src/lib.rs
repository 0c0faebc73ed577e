// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod agent;
mod compact;
mod events;
mod prompts;
mod reflection;
mod runtime_context;
mod session;

pub use agent::{Agent, PendingConfirmation};
pub use compact::{compact_session, emergency_compact, smart_truncate};
pub use events::{AgentEvent, AgentStep, PendingConfirmationInfo, StepKind};
pub use prompts::{system_prompt, PromptContext};
pub use reflection::{Issue, QualityScore, ReflectionState, Strategy};
pub use runtime_context::AgentRuntimeContext;
pub use session::Session;
