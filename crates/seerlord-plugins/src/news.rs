//! News reporter plugin
//!
//! Gathers and summarizes current news into a journalistic briefing. Source
//! fetching happens in external tool servers; this graph owns selection,
//! summarization, and the quality loop.

use std::sync::Arc;

use async_trait::async_trait;

use seerlord_core::error::Result;
use seerlord_core::graph::{
    CritiqueNode, ExecutionGraph, GraphContext, GraphNode, GraphState, LoadMemoryNode,
    LoadSkillsNode, RefineSkillsNode, Transition,
};
use seerlord_core::llm::{ChatOptions, Message};
use seerlord_core::plugins::AgentPlugin;

/// Composes the briefing; critique loops re-enter here
struct BriefingNode;

#[async_trait]
impl GraphNode for BriefingNode {
    fn name(&self) -> &str {
        "briefing"
    }

    async fn run(&self, state: &mut GraphState, ctx: &GraphContext) -> Result<Transition> {
        let mut messages = vec![Message::system(
            "You are a private intelligence officer writing a news briefing.\n\
             Cover who, what, when, where, and why for each story, cite your \
             sources, and keep the tone objective and journalistic.",
        )];
        messages.extend(state.messages.iter().cloned());

        let response = ctx.chat.complete(messages, ChatOptions::default()).await?;
        state.push_assistant(response.content);
        Ok(Transition::Next)
    }
}

/// The news reporter plugin
pub struct NewsReporterPlugin;

impl AgentPlugin for NewsReporterPlugin {
    fn name(&self) -> &str {
        "news_reporter"
    }

    fn description(&self) -> &str {
        "Fetches current news, summarizes it, and produces an objective briefing. \
         Use this for any request about recent events or headlines."
    }

    fn enable_skills(&self) -> bool {
        true
    }

    fn critique_instructions(&self) -> String {
        "- Must cite at least 3 distinct sources.\n\
         - Tone must be objective and journalistic.\n\
         - Summary must cover key 'Who, What, When, Where, Why' elements."
            .to_string()
    }

    fn build_graph(&self) -> ExecutionGraph {
        ExecutionGraph::new(self.name())
            .add_node(Arc::new(LoadSkillsNode))
            .add_node(Arc::new(LoadMemoryNode))
            .add_node(Arc::new(BriefingNode))
            .add_node(Arc::new(CritiqueNode::new(
                self.critique_instructions(),
                "briefing",
            )))
            .add_node(Arc::new(RefineSkillsNode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::test_context;
    use seerlord_core::testing::StubChatModel;

    #[test]
    fn test_graph_shape() {
        let graph = NewsReporterPlugin.build_graph();
        assert_eq!(
            graph.node_names(),
            vec![
                "load_skills",
                "load_memory",
                "briefing",
                "critique",
                "refine_skills"
            ]
        );
        assert!(NewsReporterPlugin.enable_skills());
        assert!(NewsReporterPlugin.critique_instructions().contains("sources"));
    }

    #[tokio::test]
    async fn test_critique_loop_revises_briefing() {
        // First draft is rejected once, the revision passes
        let chat = Arc::new(StubChatModel::with_responses(vec![
            "Briefing draft one.",
            r#"{"needs_refinement": true, "feedback": "Only two sources cited"}"#,
            "Briefing draft two, now with three sources.",
            r#"{"needs_refinement": false, "feedback": "good"}"#,
        ]));
        let ctx = test_context(chat, Arc::new(StubChatModel::failing())).await;

        let state = GraphState::new(
            vec![Message::user("What happened in tech today?")],
            "tenant-t",
            None,
        )
        .with_agent("news_reporter", NewsReporterPlugin.description());

        let final_state = NewsReporterPlugin
            .build_graph()
            .invoke(state, &ctx)
            .await
            .unwrap();

        assert!(final_state.final_answer().unwrap().contains("draft two"));
        assert_eq!(final_state.critique_rounds, 1);
        assert_eq!(final_state.feedback_history.len(), 1);
    }
}
