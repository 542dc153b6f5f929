//! Graph executor
//!
//! Runs a linear node list with named jump edges. Every invocation is
//! bounded by the configured step budget, so any conditional loop a graph
//! declares terminates even if its own exit condition is buggy.

use futures_core::Stream;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::node::{GraphContext, GraphNode, Transition};
use super::state::GraphState;

/// Incremental notification from a streaming graph invocation
#[derive(Debug)]
pub enum GraphEvent {
    /// A node is about to run
    NodeStarted { node: String },
    /// A node finished and chose a transition
    NodeCompleted { node: String },
    /// The graph terminated; carries the final state
    Finished(Box<GraphState>),
    /// The graph failed at a node
    Failed { node: String, error: Error },
}

/// A compiled, invokable execution graph
#[derive(Clone)]
pub struct ExecutionGraph {
    name: String,
    nodes: Vec<Arc<dyn GraphNode>>,
}

impl ExecutionGraph {
    /// Create an empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    /// Append a node; execution order follows declaration order
    pub fn add_node(mut self, node: Arc<dyn GraphNode>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Graph name, used in errors and traces
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared node names in order
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name()).collect()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name() == name)
    }

    /// Run the graph to completion and return the final state.
    ///
    /// Fails when a node errors, a `Goto` targets an unknown node, or the
    /// step budget is exhausted.
    pub async fn invoke(&self, mut state: GraphState, ctx: &GraphContext) -> Result<GraphState> {
        let mut index = 0usize;
        let mut steps = 0u32;

        while index < self.nodes.len() {
            if steps >= ctx.config.step_budget {
                warn!(graph = %self.name, steps = steps, "Step budget exhausted");
                return Err(Error::GraphBudgetExceeded(
                    self.name.clone(),
                    ctx.config.step_budget,
                ));
            }
            steps += 1;

            let node = &self.nodes[index];
            debug!(graph = %self.name, node = %node.name(), step = steps, "Running node");

            match node.run(&mut state, ctx).await? {
                Transition::Next => index += 1,
                Transition::Goto(target) => {
                    index = self.index_of(&target).ok_or_else(|| {
                        Error::NodeFailed(
                            node.name().to_string(),
                            format!("jump to unknown node '{}'", target),
                        )
                    })?;
                }
                Transition::End => break,
            }
        }

        Ok(state)
    }

    /// Run the graph, yielding step events as it goes.
    ///
    /// The stream ends with either `Finished` or `Failed`; correctness never
    /// depends on the consumer reading any of it.
    pub fn stream(
        &self,
        state: GraphState,
        ctx: &GraphContext,
    ) -> impl Stream<Item = GraphEvent> + Send + use<> {
        let graph = self.clone();
        let ctx = ctx.clone();

        async_stream::stream! {
            let mut state = state;
            let mut index = 0usize;
            let mut steps = 0u32;

            while index < graph.nodes.len() {
                let node = graph.nodes[index].clone();
                let node_name = node.name().to_string();

                if steps >= ctx.config.step_budget {
                    yield GraphEvent::Failed {
                        node: node_name,
                        error: Error::GraphBudgetExceeded(
                            graph.name.clone(),
                            ctx.config.step_budget,
                        ),
                    };
                    return;
                }
                steps += 1;

                yield GraphEvent::NodeStarted { node: node_name.clone() };

                match node.run(&mut state, &ctx).await {
                    Ok(Transition::Next) => {
                        yield GraphEvent::NodeCompleted { node: node_name };
                        index += 1;
                    }
                    Ok(Transition::Goto(target)) => {
                        yield GraphEvent::NodeCompleted { node: node_name.clone() };
                        match graph.index_of(&target) {
                            Some(target_index) => index = target_index,
                            None => {
                                yield GraphEvent::Failed {
                                    node: node_name.clone(),
                                    error: Error::NodeFailed(
                                        node_name,
                                        format!("jump to unknown node '{}'", target),
                                    ),
                                };
                                return;
                            }
                        }
                    }
                    Ok(Transition::End) => {
                        yield GraphEvent::NodeCompleted { node: node_name };
                        break;
                    }
                    Err(error) => {
                        yield GraphEvent::Failed { node: node_name, error };
                        return;
                    }
                }
            }

            yield GraphEvent::Finished(Box::new(state));
        }
    }
}

impl std::fmt::Debug for ExecutionGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGraph")
            .field("name", &self.name)
            .field("nodes", &self.node_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::Message;
    use crate::skills::{DynamicSkillManager, EvolutionEngine, NullEventSink, SkillStore};
    use crate::memory::MemoryStore;
    use crate::storage::Database;
    use crate::testing::{StubChatModel, StubEmbedder};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use futures_util::pin_mut;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingNode {
        name: String,
        runs: AtomicU32,
        transition: Transition,
    }

    impl CountingNode {
        fn next(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                runs: AtomicU32::new(0),
                transition: Transition::Next,
            })
        }

        fn looping(name: &str, target: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                runs: AtomicU32::new(0),
                transition: Transition::Goto(target.to_string()),
            })
        }
    }

    #[async_trait]
    impl GraphNode for CountingNode {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, _state: &mut GraphState, _ctx: &GraphContext) -> Result<Transition> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(self.transition.clone())
        }
    }

    async fn test_context() -> GraphContext {
        let db = Database::in_memory().await.unwrap();
        let embedder = Arc::new(StubEmbedder::new());
        let store = Arc::new(SkillStore::new(
            db.pool().clone(),
            embedder.clone(),
            Config::default().skills,
        ));
        GraphContext {
            chat: Arc::new(StubChatModel::new("ok")),
            skills: Arc::new(DynamicSkillManager::new(
                store,
                EvolutionEngine::new(Arc::new(StubChatModel::new("ok"))),
                Arc::new(NullEventSink),
                Config::default().skills,
            )),
            memory: Arc::new(MemoryStore::new(db.pool().clone(), embedder)),
            config: Config::default().graph,
        }
    }

    #[tokio::test]
    async fn test_linear_execution() {
        let a = CountingNode::next("a");
        let b = CountingNode::next("b");
        let graph = ExecutionGraph::new("test")
            .add_node(a.clone())
            .add_node(b.clone());

        let ctx = test_context().await;
        let state = GraphState::new(vec![Message::user("go")], "tenant-a", None);
        graph.invoke(state, &ctx).await.unwrap();

        assert_eq!(a.runs.load(Ordering::SeqCst), 1);
        assert_eq!(b.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_graph_terminates() {
        let graph = ExecutionGraph::new("empty");
        let ctx = test_context().await;
        let state = GraphState::new(vec![], "tenant-a", None);
        assert!(graph.invoke(state, &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_infinite_loop_hits_step_budget() {
        // A node that always jumps back to itself must be stopped by the
        // executor's budget, not run forever
        let looper = CountingNode::looping("loop", "loop");
        let graph = ExecutionGraph::new("loops").add_node(looper.clone());

        let mut ctx = test_context().await;
        ctx.config.step_budget = 10;

        let state = GraphState::new(vec![], "tenant-a", None);
        let result = graph.invoke(state, &ctx).await;

        assert!(matches!(result, Err(Error::GraphBudgetExceeded(_, 10))));
        assert_eq!(looper.runs.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_unknown_goto_target_fails() {
        let jumper = CountingNode::looping("jump", "nowhere");
        let graph = ExecutionGraph::new("bad").add_node(jumper);

        let ctx = test_context().await;
        let state = GraphState::new(vec![], "tenant-a", None);
        let result = graph.invoke(state, &ctx).await;
        assert!(matches!(result, Err(Error::NodeFailed(..))));
    }

    #[tokio::test]
    async fn test_stream_yields_events_and_final_state() {
        let graph = ExecutionGraph::new("test")
            .add_node(CountingNode::next("a"))
            .add_node(CountingNode::next("b"));

        let ctx = test_context().await;
        let state = GraphState::new(vec![Message::user("go")], "tenant-a", None);

        let stream = graph.stream(state, &ctx);
        pin_mut!(stream);
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }

        assert_eq!(events.len(), 5);
        assert!(matches!(&events[0], GraphEvent::NodeStarted { node } if node == "a"));
        assert!(matches!(&events[3], GraphEvent::NodeCompleted { node } if node == "b"));
        assert!(matches!(&events[4], GraphEvent::Finished(_)));
    }

    #[tokio::test]
    async fn test_stream_reports_failure() {
        struct FailingNode;

        #[async_trait]
        impl GraphNode for FailingNode {
            fn name(&self) -> &str {
                "boom"
            }

            async fn run(
                &self,
                _state: &mut GraphState,
                _ctx: &GraphContext,
            ) -> Result<Transition> {
                Err(Error::NodeFailed("boom".into(), "exploded".into()))
            }
        }

        let graph = ExecutionGraph::new("failing").add_node(Arc::new(FailingNode));
        let ctx = test_context().await;
        let state = GraphState::new(vec![], "tenant-a", None);

        let stream = graph.stream(state, &ctx);
        pin_mut!(stream);
        let mut last = None;
        while let Some(event) = stream.next().await {
            last = Some(event);
        }
        assert!(matches!(last, Some(GraphEvent::Failed { .. })));
    }
}
