//! Tutorial generator plugin
//!
//! Generates structured learning plans and tutorials. The graph follows the
//! full shared shape: skill loading, memory loading, an outline step, a
//! section-writing step, and a bounded critique loop that feeds refinements
//! back into the skill store.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::debug;

use seerlord_core::error::{Error, Result};
use seerlord_core::graph::{
    CritiqueNode, ExecutionGraph, GraphContext, GraphNode, GraphState, LoadMemoryNode,
    LoadSkillsNode, RefineSkillsNode, Transition,
};
use seerlord_core::llm::{ChatOptions, Message};
use seerlord_core::plugins::AgentPlugin;

/// Sections used when the outline model call produces nothing usable
const DEFAULT_SECTIONS: [&str; 3] = ["Fundamentals", "Practice", "Next steps"];

/// Structured outline produced before writing
#[derive(Debug, Deserialize)]
struct Outline {
    sections: Vec<String>,
}

/// Plans the tutorial's section structure
struct OutlineNode;

#[async_trait]
impl GraphNode for OutlineNode {
    fn name(&self) -> &str {
        "outline"
    }

    async fn run(&self, state: &mut GraphState, ctx: &GraphContext) -> Result<Transition> {
        let topic = state.latest_user_text();
        let messages = vec![Message::system(format!(
            "You are a curriculum designer. Plan a tutorial for: {}\n\
             Return ONLY a JSON object: {{\"sections\": [\"...\", \"...\"]}} \
             with 3 to 6 section titles in teaching order.",
            topic
        ))];

        let sections = match ctx.chat.complete(messages, ChatOptions::structured()).await {
            Ok(response) => serde_json::from_str::<Outline>(response.content.trim())
                .map(|o| o.sections)
                .unwrap_or_default(),
            // A missing outline degrades to the default structure; the
            // writing step still produces a tutorial
            Err(_) => Vec::new(),
        };

        let sections = if sections.is_empty() {
            DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect()
        } else {
            sections
        };

        debug!(sections = sections.len(), "Tutorial outline ready");
        state.set_extra("outline", serde_json::json!(sections));
        Ok(Transition::Next)
    }
}

/// Writes the tutorial sections; critique loops re-enter here.
///
/// Sections are independent, so they are written concurrently under the
/// configured sub-task concurrency cap. The cap throttles upstream rate
/// limits, it is not needed for correctness.
struct WriteSectionsNode;

#[async_trait]
impl GraphNode for WriteSectionsNode {
    fn name(&self) -> &str {
        "write"
    }

    async fn run(&self, state: &mut GraphState, ctx: &GraphContext) -> Result<Transition> {
        let topic = state.latest_user_text();
        let sections: Vec<String> = state
            .get_extra("outline")
            .and_then(|v| v.as_array())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|s| s.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let semaphore = Arc::new(Semaphore::new(ctx.config.subtask_concurrency));
        let context_messages: Vec<Message> = state.messages.clone();

        let section_futures = sections.iter().enumerate().map(|(index, title)| {
            let semaphore = semaphore.clone();
            let chat = ctx.chat.clone();
            let title = title.clone();
            let topic = topic.clone();
            let mut messages = vec![Message::system(format!(
                "You are an expert educational content generator writing one \
                 section of a tutorial on '{}'.\n\
                 Section: {}\n\
                 State the section's learning goal and an estimated time, then \
                 teach it.",
                topic, title
            ))];
            messages.extend(context_messages.iter().cloned());

            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| Error::Other("section semaphore closed".to_string()))?;
                let response = chat.complete(messages, ChatOptions::default()).await?;
                Ok::<_, Error>((index, title, response.content))
            }
        });

        let mut written = futures_util::future::try_join_all(section_futures).await?;
        written.sort_by_key(|(index, _, _)| *index);

        let mut tutorial = format!("# Tutorial: {}\n", topic);
        for (_, title, body) in written {
            tutorial.push_str(&format!("\n## {}\n{}\n", title, body));
        }
        state.push_assistant(tutorial);
        Ok(Transition::Next)
    }
}

/// The tutorial generator plugin
pub struct TutorialGeneratorPlugin;

impl AgentPlugin for TutorialGeneratorPlugin {
    fn name(&self) -> &str {
        "tutorial_generator"
    }

    fn description(&self) -> &str {
        "Generates comprehensive learning plans, tutorials, and structured educational \
         content. Use this for any request related to learning a new skill, language, or subject."
    }

    fn enable_skills(&self) -> bool {
        true
    }

    fn critique_instructions(&self) -> String {
        "- Plan must be broken down into clear steps or modules.\n\
         - Learning goals for each module must be specific.\n\
         - Must include estimated time for each section."
            .to_string()
    }

    fn build_graph(&self) -> ExecutionGraph {
        ExecutionGraph::new(self.name())
            .add_node(Arc::new(LoadSkillsNode))
            .add_node(Arc::new(LoadMemoryNode))
            .add_node(Arc::new(OutlineNode))
            .add_node(Arc::new(WriteSectionsNode))
            .add_node(Arc::new(CritiqueNode::new(
                self.critique_instructions(),
                "write",
            )))
            .add_node(Arc::new(RefineSkillsNode))
    }
}
