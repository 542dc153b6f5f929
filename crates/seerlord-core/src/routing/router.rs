//! Master planner / router
//!
//! Decides, per request, which plugin(s) handle it. Manual mode routes
//! directly to a named plugin without any model call and strictly dominates
//! automatic mode; automatic mode asks the model for a structured plan over
//! the non-system plugin menu.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::json::extract_json_object;
use crate::llm::{ChatModel, ChatOptions, Message, latest_user_message};
use crate::memory::MemoryStore;
use crate::plugins::PluginRegistry;

use super::types::{AUTO_TARGET, CHITCHAT_TARGET, MasterPlan};

/// How many trailing conversation messages the planner sees
const PLANNER_CONTEXT_MESSAGES: usize = 5;
/// How many memories are surfaced into the planning prompt
const PLANNER_MEMORY_LIMIT: usize = 3;
/// Similarity floor for planner memories
const PLANNER_MEMORY_MIN_SCORE: f32 = 0.25;

/// An incoming request to route
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub messages: Vec<Message>,
    pub tenant_id: String,
    pub user_id: Option<String>,
    /// A specific plugin name forces manual mode; `None` or `"auto"` plans
    pub target_plugin: Option<String>,
}

impl RouteRequest {
    pub fn new(messages: Vec<Message>, tenant_id: impl Into<String>) -> Self {
        Self {
            messages,
            tenant_id: tenant_id.into(),
            user_id: None,
            target_plugin: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_plugin = Some(target.into());
        self
    }

    /// The latest real user message text
    pub fn user_input(&self) -> String {
        latest_user_message(&self.messages)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

/// The master router
pub struct MasterRouter {
    registry: Arc<PluginRegistry>,
    chat: Arc<dyn ChatModel>,
    memory: Arc<MemoryStore>,
}

impl MasterRouter {
    pub fn new(
        registry: Arc<PluginRegistry>,
        chat: Arc<dyn ChatModel>,
        memory: Arc<MemoryStore>,
    ) -> Self {
        Self {
            registry,
            chat,
            memory,
        }
    }

    /// Produce a plan for the request.
    ///
    /// Manual mode: a named, registered target yields a single-task plan
    /// with no model call, regardless of message content. An unregistered
    /// target falls through to automatic mode rather than erroring.
    ///
    /// Automatic mode failures (model error, unparsable output, zero tasks)
    /// surface as `PlanningFailed`; they are never converted into a silent
    /// default route.
    pub async fn plan(&self, request: &RouteRequest) -> Result<MasterPlan> {
        if let Some(target) = &request.target_plugin
            && target != AUTO_TARGET
        {
            if self.registry.get(target).is_some() {
                info!(plugin = %target, "Manual routing to named plugin");
                return Ok(MasterPlan::single_task(target.clone(), request.user_input()));
            }
            warn!(plugin = %target, "Manual target not registered, falling back to planning");
        }

        self.plan_automatic(request).await
    }

    async fn plan_automatic(&self, request: &RouteRequest) -> Result<MasterPlan> {
        let user_input = request.user_input();
        if user_input.is_empty() {
            return Err(Error::InvalidInput(
                "request carries no user message to plan from".to_string(),
            ));
        }

        let memory_context = self.memory_context(request, &user_input).await?;
        let plugin_menu = self.plugin_menu();

        let system_prompt = format!(
            "You are the senior planner of a multi-agent system.\n\
             Break the user's request into a sequence of executable tasks.\n\
             {}\
             Available plugins:\n{}\n\
             - {}: use this for greetings and general conversation, or when no plugin fits.\n\n\
             Rules:\n\
             1. A simple request gets a single task.\n\
             2. A compound request is decomposed; later tasks list the ids of \
                earlier tasks whose results they need in \"context\".\n\
             3. Use ONLY the plugins listed above or '{}'.\n\
             4. Task ids start at 1 and increase; \"context\" may only reference earlier ids.\n\n\
             Return ONLY a JSON object:\n\
             {{\"tasks\": [{{\"id\": 1, \"plugin_name\": \"...\", \"description\": \"...\", \
             \"instruction\": \"...\", \"context\": []}}], \"original_request\": \"...\"}}",
            memory_context, plugin_menu, CHITCHAT_TARGET, CHITCHAT_TARGET
        );

        let mut messages = vec![Message::system(system_prompt)];
        let tail = request
            .messages
            .len()
            .saturating_sub(PLANNER_CONTEXT_MESSAGES);
        messages.extend(request.messages[tail..].iter().cloned());

        let response = self
            .chat
            .complete(messages, ChatOptions::structured())
            .await
            .map_err(|e| Error::PlanningFailed(format!("planner model call failed: {}", e)))?;

        let json = extract_json_object(&response.content).ok_or_else(|| {
            Error::PlanningFailed("planner returned no JSON plan".to_string())
        })?;
        let mut plan: MasterPlan = serde_json::from_str(json)
            .map_err(|e| Error::PlanningFailed(format!("plan did not match schema: {}", e)))?;

        if plan.tasks.is_empty() {
            return Err(Error::PlanningFailed(
                "planner produced zero tasks".to_string(),
            ));
        }
        if plan.original_request.is_empty() {
            plan.original_request = user_input;
        }
        plan.validate()?;

        info!(tasks = plan.tasks.len(), "Plan generated");
        Ok(plan)
    }

    async fn memory_context(&self, request: &RouteRequest, user_input: &str) -> Result<String> {
        let memories = self
            .memory
            .retrieve_relevant(
                user_input,
                &request.tenant_id,
                request.user_id.as_deref(),
                None,
                PLANNER_MEMORY_LIMIT,
                PLANNER_MEMORY_MIN_SCORE,
            )
            .await?;

        if memories.is_empty() {
            return Ok(String::new());
        }
        let lines = memories
            .iter()
            .map(|m| format!("- {}", m.content))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("Relevant memories:\n{}\n\n", lines))
    }

    /// The planner's plugin menu: name and description of every non-system
    /// plugin, verbatim.
    fn plugin_menu(&self) -> String {
        self.registry
            .visible_plugins()
            .iter()
            .map(|p| format!("- {}: {}", p.name(), p.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ExecutionGraph;
    use crate::plugins::AgentPlugin;
    use crate::storage::Database;
    use crate::testing::{StubChatModel, StubEmbedder};

    struct TestPlugin {
        name: &'static str,
        description: &'static str,
    }

    impl AgentPlugin for TestPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            self.description
        }

        fn build_graph(&self) -> ExecutionGraph {
            ExecutionGraph::new(self.name)
        }
    }

    fn test_registry() -> Arc<PluginRegistry> {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(TestPlugin {
            name: "news_reporter",
            description: "Gathers and summarizes current news",
        }));
        registry.register(Arc::new(TestPlugin {
            name: "tutorial_generator",
            description: "Writes structured tutorials on any topic",
        }));
        registry.register(Arc::new(TestPlugin {
            name: "_mail_service",
            description: "Sends mail on behalf of other agents",
        }));
        Arc::new(registry)
    }

    async fn test_router(chat: Arc<StubChatModel>) -> MasterRouter {
        let db = Database::in_memory().await.unwrap();
        MasterRouter::new(
            test_registry(),
            chat,
            Arc::new(MemoryStore::new(
                db.pool().clone(),
                Arc::new(StubEmbedder::new()),
            )),
        )
    }

    fn request(text: &str) -> RouteRequest {
        RouteRequest::new(vec![Message::user(text)], "tenant-t")
    }

    #[tokio::test]
    async fn test_manual_mode_dominates_content() {
        let chat = Arc::new(StubChatModel::new("should not be called"));
        let router = test_router(chat.clone()).await;

        // The message content screams "news", but the manual target wins
        let req = request("Tell me today's news headlines")
            .with_target("tutorial_generator");
        let plan = router.plan(&req).await.unwrap();

        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].plugin_name, "tutorial_generator");
        assert_eq!(chat.call_count(), 0, "manual mode must not call the model");
    }

    #[tokio::test]
    async fn test_manual_mode_missing_target_falls_through() {
        let chat = Arc::new(StubChatModel::new(
            r#"{"tasks": [{"id": 1, "plugin_name": "chitchat", "description": "Reply"}]}"#,
        ));
        let router = test_router(chat.clone()).await;

        let req = request("hello").with_target("nonexistent_plugin");
        let plan = router.plan(&req).await.unwrap();

        assert_eq!(plan.tasks[0].plugin_name, "chitchat");
        assert_eq!(chat.call_count(), 1, "should have fallen through to planning");
    }

    #[tokio::test]
    async fn test_auto_sentinel_plans() {
        let chat = Arc::new(StubChatModel::new(
            r#"{"tasks": [{"id": 1, "plugin_name": "news_reporter", "description": "Gather news"}]}"#,
        ));
        let router = test_router(chat.clone()).await;

        let req = request("what happened today?").with_target(AUTO_TARGET);
        let plan = router.plan(&req).await.unwrap();

        assert_eq!(plan.tasks[0].plugin_name, "news_reporter");
        assert_eq!(plan.original_request, "what happened today?");
    }

    #[tokio::test]
    async fn test_planner_menu_excludes_system_plugins() {
        let chat = Arc::new(StubChatModel::new(
            r#"{"tasks": [{"id": 1, "plugin_name": "chitchat", "description": "Reply"}]}"#,
        ));
        let router = test_router(chat.clone()).await;

        router.plan(&request("hi there")).await.unwrap();

        let prompt = &chat.recorded_calls()[0][0].content;
        assert!(prompt.contains("news_reporter"));
        assert!(prompt.contains("tutorial_generator"));
        assert!(!prompt.contains("_mail_service"));
    }

    #[tokio::test]
    async fn test_zero_tasks_is_planning_failure() {
        let chat = Arc::new(StubChatModel::new(r#"{"tasks": []}"#));
        let router = test_router(chat).await;

        let result = router.plan(&request("do something impossible")).await;
        assert!(matches!(result, Err(Error::PlanningFailed(_))));
    }

    #[tokio::test]
    async fn test_model_error_is_planning_failure() {
        let router = test_router(Arc::new(StubChatModel::failing())).await;

        let result = router.plan(&request("anything")).await;
        assert!(matches!(result, Err(Error::PlanningFailed(_))));
    }

    #[tokio::test]
    async fn test_unparsable_plan_is_planning_failure() {
        let chat = Arc::new(StubChatModel::new("I'd rather chat about the weather."));
        let router = test_router(chat).await;

        let result = router.plan(&request("anything")).await;
        assert!(matches!(result, Err(Error::PlanningFailed(_))));
    }

    #[tokio::test]
    async fn test_multi_task_plan_with_dependencies() {
        let chat = Arc::new(StubChatModel::new(
            r#"Here is the plan:
            {"tasks": [
                {"id": 1, "plugin_name": "news_reporter", "description": "Gather AI news", "instruction": "Find today's AI news"},
                {"id": 2, "plugin_name": "tutorial_generator", "description": "Write a digest", "instruction": "Summarize into a digest", "context": [1]}
            ]}"#,
        ));
        let router = test_router(chat).await;

        let plan = router
            .plan(&request("research AI news and write a digest"))
            .await
            .unwrap();

        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[1].context, vec![1]);
    }

    #[tokio::test]
    async fn test_invalid_dependency_plan_rejected() {
        // Forward reference: task 1 depends on task 2
        let chat = Arc::new(StubChatModel::new(
            r#"{"tasks": [
                {"id": 1, "plugin_name": "news_reporter", "description": "x", "context": [2]},
                {"id": 2, "plugin_name": "tutorial_generator", "description": "y"}
            ]}"#,
        ));
        let router = test_router(chat).await;

        let result = router.plan(&request("anything")).await;
        assert!(matches!(result, Err(Error::InvalidPlan(_))));
    }

    #[tokio::test]
    async fn test_no_user_message_is_invalid_input() {
        let router = test_router(Arc::new(StubChatModel::new("unused"))).await;
        let req = RouteRequest::new(vec![Message::assistant("hello")], "tenant-t");
        assert!(matches!(router.plan(&req).await, Err(Error::InvalidInput(_))));
    }
}
