//! Skill lifecycle events
//!
//! Advisory observability events emitted by the dynamic skill manager so a
//! caller streaming progress to an end user can surface "thinking" steps.
//! Dropping every event never affects retrieval correctness.

use serde::Serialize;
use tokio::sync::mpsc;

use super::types::{Skill, SkillLevel};

/// A named skill lifecycle event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SkillEvent {
    /// Retrieval completed (fires on every path, fallback included)
    #[serde(rename = "skill_retrieved")]
    Retrieved {
        id: String,
        name: String,
        level: SkillLevel,
        description: String,
        reason: String,
    },
    /// Evolution is about to run for a query with no specific-enough skill
    #[serde(rename = "skill_evolution_start")]
    EvolutionStarted { query: String },
    /// Evolution produced and persisted a new skill
    #[serde(rename = "skill_evolved")]
    Evolved {
        id: String,
        name: String,
        level: SkillLevel,
        description: String,
    },
    /// An existing skill was refined from execution feedback
    #[serde(rename = "skill_refined")]
    Refined { name: String, description: String },
}

impl SkillEvent {
    /// Build a retrieval event from a skill and its retrieval reason
    pub fn retrieved(skill: &Skill, reason: &str) -> Self {
        Self::Retrieved {
            id: skill.id.clone(),
            name: skill.name.clone(),
            level: skill.level,
            description: skill.description.clone(),
            reason: reason.to_string(),
        }
    }

    /// Build an evolved event from a freshly persisted skill
    pub fn evolved(skill: &Skill) -> Self {
        Self::Evolved {
            id: skill.id.clone(),
            name: skill.name.clone(),
            level: skill.level,
            description: skill.description.clone(),
        }
    }
}

/// Observer interface for skill lifecycle events.
///
/// Implementations must not block: events fire from hot retrieval paths.
pub trait SkillEventSink: Send + Sync {
    fn emit(&self, event: SkillEvent);
}

/// Sink that discards every event
pub struct NullEventSink;

impl SkillEventSink for NullEventSink {
    fn emit(&self, _event: SkillEvent) {}
}

/// Sink that forwards events into an unbounded channel.
///
/// The send is fire-and-forget; a dropped receiver just discards events.
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<SkillEvent>,
}

impl ChannelEventSink {
    /// Create a sink together with its receiving half
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<SkillEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl SkillEventSink for ChannelEventSink {
    fn emit(&self, event: SkillEvent) {
        let _ = self.sender.send(event);
    }
}
