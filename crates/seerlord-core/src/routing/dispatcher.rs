//! Plan dispatcher
//!
//! Executes a master plan sequentially in planner-emitted order, collecting
//! per-task outcomes into a shared results map keyed by task id. A task
//! whose prerequisites failed is skipped and reported, never silently
//! treated as succeeded; sibling tasks without that dependency still run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::graph::{GraphContext, GraphState};
use crate::llm::{ChatOptions, Message};
use crate::plugins::PluginRegistry;

use super::router::RouteRequest;
use super::types::{CHITCHAT_TARGET, MasterPlan, PlanTask};

/// Terminal state of one dispatched task
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed { output: String },
    Failed { error: String },
    Skipped { reason: String },
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// One task's slot in the results map
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: u32,
    pub plugin_name: String,
    pub outcome: TaskOutcome,
}

/// Outcome of dispatching a whole plan
#[derive(Debug)]
pub struct DispatchReport {
    /// Per-task results keyed by task id
    pub results: BTreeMap<u32, TaskResult>,
    /// Output of the last completed task, the user-facing answer
    pub final_output: Option<String>,
}

impl DispatchReport {
    /// Whether every task in the plan completed
    pub fn all_completed(&self) -> bool {
        self.results.values().all(|r| r.outcome.is_completed())
    }
}

/// Executes plans against the registered plugins
pub struct PlanDispatcher {
    registry: Arc<PluginRegistry>,
    ctx: GraphContext,
}

impl PlanDispatcher {
    pub fn new(registry: Arc<PluginRegistry>, ctx: GraphContext) -> Self {
        Self { registry, ctx }
    }

    /// Run every task of the plan in order.
    ///
    /// Individual task failures are contained in their result slot; this
    /// method only errors on infrastructure failures outside task execution
    /// (e.g. the memory store during write-back).
    pub async fn run(&self, plan: &MasterPlan, request: &RouteRequest) -> Result<DispatchReport> {
        let session_id = Uuid::new_v4().to_string();
        let mut results: BTreeMap<u32, TaskResult> = BTreeMap::new();
        let mut conversation = request.messages.clone();
        let mut last_completed: Option<(String, String)> = None;

        for task in &plan.tasks {
            if let Some(reason) = self.unmet_prerequisite(task, &results) {
                warn!(task_id = task.id, reason = %reason, "Skipping task");
                results.insert(
                    task.id,
                    TaskResult {
                        task_id: task.id,
                        plugin_name: task.plugin_name.clone(),
                        outcome: TaskOutcome::Skipped { reason },
                    },
                );
                continue;
            }

            info!(
                task_id = task.id,
                plugin = %task.plugin_name,
                description = %task.description,
                "Dispatching task"
            );

            let instruction = if task.instruction.is_empty() {
                task.description.clone()
            } else {
                task.instruction.clone()
            };
            conversation.push(Message::system(format!(
                "[Task {}] Execute: {}",
                task.id, instruction
            )));

            let outcome = if task.plugin_name == CHITCHAT_TARGET {
                self.run_chitchat(&conversation).await
            } else {
                self.run_plugin_task(task, &conversation, request, &session_id)
                    .await
            };

            if let TaskOutcome::Completed { output } = &outcome {
                conversation.push(Message::assistant(output.clone()));
                last_completed = Some((task.plugin_name.clone(), output.clone()));
            }
            results.insert(
                task.id,
                TaskResult {
                    task_id: task.id,
                    plugin_name: task.plugin_name.clone(),
                    outcome,
                },
            );
        }

        let final_output = last_completed.as_ref().map(|(_, output)| output.clone());
        self.save_interaction(request, &session_id, &last_completed)
            .await?;

        Ok(DispatchReport {
            results,
            final_output,
        })
    }

    /// First unmet prerequisite of a task, if any
    fn unmet_prerequisite(
        &self,
        task: &PlanTask,
        results: &BTreeMap<u32, TaskResult>,
    ) -> Option<String> {
        task.context.iter().find_map(|prerequisite| {
            match results.get(prerequisite) {
                Some(result) if result.outcome.is_completed() => None,
                Some(_) => Some(format!("prerequisite task {} did not complete", prerequisite)),
                None => Some(format!("prerequisite task {} never ran", prerequisite)),
            }
        })
    }

    /// Plain conversational reply, no plugin graph involved
    async fn run_chitchat(&self, conversation: &[Message]) -> TaskOutcome {
        let duration = Duration::from_secs(self.ctx.config.task_timeout_secs);
        let call = self
            .ctx
            .chat
            .complete(conversation.to_vec(), ChatOptions::default());

        match timeout(duration, call).await {
            Ok(Ok(response)) => TaskOutcome::Completed {
                output: response.content,
            },
            Ok(Err(e)) => TaskOutcome::Failed {
                error: e.to_string(),
            },
            Err(_) => TaskOutcome::Failed {
                error: format!("timed out after {}s", self.ctx.config.task_timeout_secs),
            },
        }
    }

    /// Run one plugin's graph under the per-task timeout
    async fn run_plugin_task(
        &self,
        task: &PlanTask,
        conversation: &[Message],
        request: &RouteRequest,
        session_id: &str,
    ) -> TaskOutcome {
        let Some(plugin) = self.registry.get(&task.plugin_name) else {
            return TaskOutcome::Failed {
                error: format!("plugin '{}' is not registered", task.plugin_name),
            };
        };

        let graph = plugin.build_graph();
        let state = GraphState::new(
            conversation.to_vec(),
            request.tenant_id.clone(),
            request.user_id.clone(),
        )
        .with_agent(plugin.name(), plugin.description())
        .with_session(session_id);

        let duration = Duration::from_secs(self.ctx.config.task_timeout_secs);
        let final_state = match timeout(duration, graph.invoke(state, &self.ctx)).await {
            Ok(Ok(final_state)) => final_state,
            Ok(Err(e)) => {
                return TaskOutcome::Failed {
                    error: e.to_string(),
                };
            }
            Err(_) => {
                return TaskOutcome::Failed {
                    error: format!("timed out after {}s", self.ctx.config.task_timeout_secs),
                };
            }
        };

        let output = final_state.final_answer().map(str::to_string);
        let produced_output = output.is_some();

        // Usage accounting for every skill this execution injected
        for skill_id in &final_state.used_skill_ids {
            if let Err(e) = self
                .ctx
                .skills
                .store()
                .record_usage(skill_id, produced_output)
                .await
            {
                warn!(skill_id = %skill_id, error = %e, "Failed to record skill usage");
            }
        }

        match output {
            Some(output) => TaskOutcome::Completed { output },
            None => TaskOutcome::Failed {
                error: "plugin produced no output".to_string(),
            },
        }
    }

    /// Persist the final user/assistant exchange so later planning runs can
    /// retrieve it as memory.
    async fn save_interaction(
        &self,
        request: &RouteRequest,
        session_id: &str,
        last_completed: &Option<(String, String)>,
    ) -> Result<()> {
        let Some((agent_name, output)) = last_completed else {
            return Ok(());
        };
        let user_input = request.user_input();
        if user_input.is_empty() {
            return Ok(());
        }

        self.ctx
            .memory
            .save_experience(
                &format!("User: {}\nAI: {}", user_input, output),
                &request.tenant_id,
                request.user_id.as_deref(),
                agent_name,
                session_id,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GraphConfig, SkillConfig};
    use crate::error::Error;
    use crate::graph::{ExecutionGraph, GraphNode, Transition};
    use crate::memory::MemoryStore;
    use crate::plugins::AgentPlugin;
    use crate::skills::{DynamicSkillManager, EvolutionEngine, NullEventSink, SkillStore};
    use crate::storage::Database;
    use crate::testing::{StubChatModel, StubEmbedder};
    use async_trait::async_trait;

    struct EchoNode;

    #[async_trait]
    impl GraphNode for EchoNode {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(&self, state: &mut GraphState, _ctx: &GraphContext) -> crate::error::Result<Transition> {
            let text = state.latest_user_text();
            state.push_assistant(format!("[{}] {}", state.agent_name, text));
            Ok(Transition::Next)
        }
    }

    struct BoomNode;

    #[async_trait]
    impl GraphNode for BoomNode {
        fn name(&self) -> &str {
            "boom"
        }

        async fn run(&self, _state: &mut GraphState, _ctx: &GraphContext) -> crate::error::Result<Transition> {
            Err(Error::NodeFailed("boom".into(), "tool exploded".into()))
        }
    }

    struct SleepNode;

    #[async_trait]
    impl GraphNode for SleepNode {
        fn name(&self) -> &str {
            "sleep"
        }

        async fn run(&self, _state: &mut GraphState, _ctx: &GraphContext) -> crate::error::Result<Transition> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Transition::Next)
        }
    }

    enum TestBehavior {
        Echo,
        Fail,
        Hang,
    }

    struct TestPlugin {
        name: &'static str,
        behavior: TestBehavior,
    }

    impl AgentPlugin for TestPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test plugin"
        }

        fn build_graph(&self) -> ExecutionGraph {
            let graph = ExecutionGraph::new(self.name);
            match self.behavior {
                TestBehavior::Echo => graph.add_node(Arc::new(EchoNode)),
                TestBehavior::Fail => graph.add_node(Arc::new(BoomNode)),
                TestBehavior::Hang => graph.add_node(Arc::new(SleepNode)),
            }
        }
    }

    async fn setup(chat: Arc<StubChatModel>, graph_config: GraphConfig) -> PlanDispatcher {
        let db = Database::in_memory().await.unwrap();
        let embedder = Arc::new(StubEmbedder::new());
        let skill_config = SkillConfig {
            min_score: 0.1,
            ..Config::default().skills
        };
        let store = Arc::new(SkillStore::new(
            db.pool().clone(),
            embedder.clone(),
            skill_config.clone(),
        ));
        let ctx = GraphContext {
            chat: chat.clone(),
            skills: Arc::new(DynamicSkillManager::new(
                store,
                EvolutionEngine::new(chat),
                Arc::new(NullEventSink),
                skill_config,
            )),
            memory: Arc::new(MemoryStore::new(db.pool().clone(), embedder)),
            config: graph_config,
        };

        let mut registry = crate::plugins::PluginRegistry::new();
        registry.register(Arc::new(TestPlugin {
            name: "echoer",
            behavior: TestBehavior::Echo,
        }));
        registry.register(Arc::new(TestPlugin {
            name: "exploder",
            behavior: TestBehavior::Fail,
        }));
        registry.register(Arc::new(TestPlugin {
            name: "sleeper",
            behavior: TestBehavior::Hang,
        }));

        PlanDispatcher::new(Arc::new(registry), ctx)
    }

    fn plan(tasks: Vec<PlanTask>) -> MasterPlan {
        MasterPlan {
            tasks,
            original_request: String::new(),
        }
    }

    fn task(id: u32, plugin: &str, context: Vec<u32>) -> PlanTask {
        PlanTask {
            id,
            plugin_name: plugin.to_string(),
            description: format!("step {}", id),
            instruction: String::new(),
            context,
        }
    }

    fn request(text: &str) -> RouteRequest {
        RouteRequest::new(vec![Message::user(text)], "tenant-t")
    }

    #[tokio::test]
    async fn test_single_task_completes() {
        let dispatcher = setup(
            Arc::new(StubChatModel::new("unused")),
            Config::default().graph,
        )
        .await;

        let report = dispatcher
            .run(&plan(vec![task(1, "echoer", vec![])]), &request("hello"))
            .await
            .unwrap();

        assert!(report.all_completed());
        assert_eq!(report.final_output.as_deref(), Some("[echoer] hello"));
    }

    #[tokio::test]
    async fn test_failed_prerequisite_skips_dependents_only() {
        let dispatcher = setup(
            Arc::new(StubChatModel::new("unused")),
            Config::default().graph,
        )
        .await;

        let report = dispatcher
            .run(
                &plan(vec![
                    task(1, "exploder", vec![]),
                    task(2, "echoer", vec![1]),
                    task(3, "echoer", vec![]),
                ]),
                &request("hello"),
            )
            .await
            .unwrap();

        assert!(matches!(
            report.results[&1].outcome,
            TaskOutcome::Failed { .. }
        ));
        assert!(matches!(
            report.results[&2].outcome,
            TaskOutcome::Skipped { .. }
        ));
        assert!(matches!(
            report.results[&3].outcome,
            TaskOutcome::Completed { .. }
        ));
        // The sibling's output is still the final answer
        assert!(report.final_output.is_some());
        assert!(!report.all_completed());
    }

    #[tokio::test]
    async fn test_unknown_plugin_fails_its_slot() {
        let dispatcher = setup(
            Arc::new(StubChatModel::new("unused")),
            Config::default().graph,
        )
        .await;

        let report = dispatcher
            .run(&plan(vec![task(1, "ghost_plugin", vec![])]), &request("hi"))
            .await
            .unwrap();

        match &report.results[&1].outcome {
            TaskOutcome::Failed { error } => assert!(error.contains("not registered")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chitchat_handled_directly() {
        let dispatcher = setup(
            Arc::new(StubChatModel::new("Hello! How can I help?")),
            Config::default().graph,
        )
        .await;

        let report = dispatcher
            .run(&plan(vec![task(1, CHITCHAT_TARGET, vec![])]), &request("hi"))
            .await
            .unwrap();

        assert_eq!(report.final_output.as_deref(), Some("Hello! How can I help?"));
    }

    #[tokio::test]
    async fn test_task_timeout_is_contained() {
        let config = GraphConfig {
            task_timeout_secs: 0,
            ..Config::default().graph
        };
        let dispatcher = setup(Arc::new(StubChatModel::new("unused")), config).await;

        let report = dispatcher
            .run(
                &plan(vec![task(1, "sleeper", vec![]), task(2, "echoer", vec![])]),
                &request("hello"),
            )
            .await
            .unwrap();

        match &report.results[&1].outcome {
            TaskOutcome::Failed { error } => assert!(error.contains("timed out")),
            other => panic!("expected timeout failure, got {:?}", other),
        }
        // The sibling without a dependency still ran
        assert!(report.results[&2].outcome.is_completed());
    }

    #[tokio::test]
    async fn test_completed_run_writes_memory() {
        let dispatcher = setup(
            Arc::new(StubChatModel::new("unused")),
            Config::default().graph,
        )
        .await;

        dispatcher
            .run(&plan(vec![task(1, "echoer", vec![])]), &request("remember this"))
            .await
            .unwrap();

        assert_eq!(dispatcher.ctx.memory.count("tenant-t").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_later_task_sees_earlier_output() {
        let dispatcher = setup(
            Arc::new(StubChatModel::new("unused")),
            Config::default().graph,
        )
        .await;

        let report = dispatcher
            .run(
                &plan(vec![task(1, "echoer", vec![]), task(2, "echoer", vec![1])]),
                &request("hello"),
            )
            .await
            .unwrap();

        // Task 2 echoes the same user message but ran after task 1 completed
        assert!(report.all_completed());
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.final_output.as_deref(), Some("[echoer] hello"));
    }
}
