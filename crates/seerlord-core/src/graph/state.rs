//! Shared execution state flowing through a graph

use serde_json::Value;
use uuid::Uuid;

use crate::llm::{Message, MessageRole, latest_user_message};

/// Mutable state threaded through every node of a graph invocation.
///
/// Carries the cross-cutting context the kernel guarantees downstream:
/// conversation, tenant/user scope, agent identity, injected skill and
/// memory context. Implementation-specific nodes stash anything else under
/// `extra` without the framework caring.
#[derive(Debug, Clone)]
pub struct GraphState {
    /// The conversation so far, instructions included
    pub messages: Vec<Message>,
    /// Mandatory isolation scope
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub session_id: String,
    /// Identity of the agent currently executing
    pub agent_name: String,
    /// Persona description passed to skill evolution
    pub agent_description: String,
    /// Injected skill prompt context, when the skill-loading node ran
    pub skills_context: Option<String>,
    /// Ids of the skills injected into this execution, for feedback loops
    pub used_skill_ids: Vec<String>,
    /// Injected memory context, when the memory-loading node ran
    pub memory_context: Option<String>,
    /// Critique feedback accumulated across refine rounds
    pub feedback_history: Vec<String>,
    /// Completed critique rounds; checked against the configured bound
    pub critique_rounds: u32,
    /// Implementation-specific keys tolerated without erroring
    pub extra: serde_json::Map<String, Value>,
}

impl GraphState {
    /// Create state for one graph run
    pub fn new(messages: Vec<Message>, tenant_id: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            messages,
            tenant_id: tenant_id.into(),
            user_id,
            session_id: Uuid::new_v4().to_string(),
            agent_name: String::new(),
            agent_description: String::new(),
            skills_context: None,
            used_skill_ids: Vec::new(),
            memory_context: None,
            feedback_history: Vec::new(),
            critique_rounds: 0,
            extra: serde_json::Map::new(),
        }
    }

    /// Set the executing agent's identity
    pub fn with_agent(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self.agent_description = description.into();
        self
    }

    /// Pin the session id (defaults to a fresh one)
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// The latest real user message, skipping injected critic feedback
    pub fn latest_user_text(&self) -> String {
        latest_user_message(&self.messages)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    /// The last assistant message, i.e. the current final answer
    pub fn final_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Append a system instruction
    pub fn push_system(&mut self, content: impl Into<String>) {
        self.messages.push(Message::system(content));
    }

    /// Append an assistant reply
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Stash an implementation-specific value
    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) {
        self.extra.insert(key.into(), value);
    }

    /// Read an implementation-specific value
    pub fn get_extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}
