//! Graph node trait and shared execution context

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::GraphConfig;
use crate::error::Result;
use crate::llm::ChatModel;
use crate::memory::MemoryStore;
use crate::skills::DynamicSkillManager;

use super::state::GraphState;

/// Services every node can reach, injected once at dispatch time
#[derive(Clone)]
pub struct GraphContext {
    pub chat: Arc<dyn ChatModel>,
    pub skills: Arc<DynamicSkillManager>,
    pub memory: Arc<MemoryStore>,
    pub config: GraphConfig,
}

/// Where execution goes after a node finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Continue with the next node in declaration order
    Next,
    /// Jump to a named node (loop edges use this)
    Goto(String),
    /// Terminate the graph successfully
    End,
}

/// One step of a plugin's execution graph.
///
/// Nodes mutate the shared state and pick a transition; the executor
/// enforces the step budget, so loop edges do not need their own counters
/// beyond any domain bound they already check.
#[async_trait]
pub trait GraphNode: Send + Sync {
    /// Unique name within the graph; `Goto` targets resolve against it
    fn name(&self) -> &str;

    async fn run(&self, state: &mut GraphState, ctx: &GraphContext) -> Result<Transition>;
}
