//! Shared graph nodes
//!
//! Every domain plugin's graph follows a common shape: conditionally
//! `load_skills`, then `load_memory`, then domain nodes, then an optional
//! bounded `critique` loop closed by `refine_skills`. The nodes here are
//! those shared stages; domain logic lives with each plugin.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::json::extract_json_object;
use crate::llm::{ChatOptions, Message};

use super::node::{GraphContext, GraphNode, Transition};
use super::state::GraphState;

/// Default number of memories injected by `load_memory`
const MEMORY_CONTEXT_LIMIT: usize = 3;
/// Minimum similarity for a memory to be considered relevant
const MEMORY_MIN_SCORE: f32 = 0.25;

/// Retrieves (or evolves) the best skill for the latest user message and
/// injects it as instruction context for every downstream model call.
pub struct LoadSkillsNode;

#[async_trait]
impl GraphNode for LoadSkillsNode {
    fn name(&self) -> &str {
        "load_skills"
    }

    async fn run(&self, state: &mut GraphState, ctx: &GraphContext) -> Result<Transition> {
        let query = state.latest_user_text();
        if query.is_empty() {
            return Ok(Transition::Next);
        }

        let retrieved = ctx
            .skills
            .get_or_evolve_skill(
                &query,
                &state.tenant_id,
                state.user_id.as_deref(),
                Some(&state.agent_name),
                &state.agent_description,
                state.messages.clone(),
            )
            .await?;

        let skill = &retrieved.skill;
        let mut context = format!(
            "--- EXPERT SKILL: {} ---\n{}",
            skill.name, skill.content.prompt_template
        );
        if !skill.content.knowledge_base.is_empty() {
            context.push_str("\nKey knowledge:");
            for fact in &skill.content.knowledge_base {
                context.push_str(&format!("\n- {}", fact));
            }
        }

        state.push_system(format!(
            "[DYNAMIC SKILLS ACTIVE]\nThe following expert skill has been retrieved for the \
             current task. Adopt its methodology and knowledge:\n\n{}\n\n[END SKILLS]",
            context
        ));
        state.skills_context = Some(context);
        state.used_skill_ids.push(skill.id.clone());

        info!(
            skill = %skill.name,
            level = %skill.level,
            reason = %retrieved.reason,
            agent = %state.agent_name,
            "Skill context injected"
        );
        Ok(Transition::Next)
    }
}

/// Loads tenant-scoped relevant memories and injects them as context
pub struct LoadMemoryNode;

#[async_trait]
impl GraphNode for LoadMemoryNode {
    fn name(&self) -> &str {
        "load_memory"
    }

    async fn run(&self, state: &mut GraphState, ctx: &GraphContext) -> Result<Transition> {
        let query = state.latest_user_text();
        if query.is_empty() {
            return Ok(Transition::Next);
        }

        let agent_filter = (!state.agent_name.is_empty()).then_some(state.agent_name.as_str());
        let hits = ctx
            .memory
            .retrieve_relevant(
                &query,
                &state.tenant_id,
                state.user_id.as_deref(),
                agent_filter,
                MEMORY_CONTEXT_LIMIT,
                MEMORY_MIN_SCORE,
            )
            .await?;

        if hits.is_empty() {
            return Ok(Transition::Next);
        }

        let context = hits
            .iter()
            .map(|h| format!("- {}", h.content))
            .collect::<Vec<_>>()
            .join("\n");
        state.push_system(format!("Relevant memories:\n{}", context));
        state.memory_context = Some(context);

        debug!(count = hits.len(), agent = %state.agent_name, "Memory context injected");
        Ok(Transition::Next)
    }
}

/// Structured verdict returned by the critique model call
#[derive(Debug, Deserialize)]
struct CritiqueVerdict {
    needs_refinement: bool,
    #[serde(default)]
    feedback: String,
}

/// Evaluates the current answer against the task and the plugin's rubric.
///
/// When refinement is needed, feedback is appended to the conversation and
/// execution jumps back to `revise_target`. The loop is bounded by the
/// configured `max_critique_rounds`; once exhausted the node passes the
/// answer through unchanged.
pub struct CritiqueNode {
    /// Plugin-specific rubric, may be empty
    instructions: String,
    /// Node to jump back to when the answer needs work
    revise_target: String,
}

impl CritiqueNode {
    pub fn new(instructions: impl Into<String>, revise_target: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            revise_target: revise_target.into(),
        }
    }
}

#[async_trait]
impl GraphNode for CritiqueNode {
    fn name(&self) -> &str {
        "critique"
    }

    async fn run(&self, state: &mut GraphState, ctx: &GraphContext) -> Result<Transition> {
        if state.critique_rounds >= ctx.config.max_critique_rounds {
            warn!(
                rounds = state.critique_rounds,
                "Critique bound reached, accepting current answer"
            );
            return Ok(Transition::Next);
        }

        let Some(answer) = state.final_answer().map(str::to_string) else {
            state.critique_rounds += 1;
            state
                .feedback_history
                .push("No output was produced.".to_string());
            state.messages.push(Message::user(
                "[Critic Feedback] No output was produced. Produce the requested result.",
            ));
            return Ok(Transition::Goto(self.revise_target.clone()));
        };

        let rubric = if self.instructions.is_empty() {
            String::new()
        } else {
            format!("\nPlugin-specific criteria:\n{}\n", self.instructions)
        };
        let messages = vec![Message::system(format!(
            "You are a QA critic evaluating an AI agent's work.\n\
             Task: {}\n\nAgent output:\n{}\n{}\n\
             Return ONLY a JSON object: {{\"needs_refinement\": bool, \"feedback\": string}}.",
            state.latest_user_text(),
            answer,
            rubric
        ))];

        let verdict = match ctx.chat.complete(messages, ChatOptions::structured()).await {
            Ok(response) => match extract_json_object(&response.content)
                .and_then(|json| serde_json::from_str::<CritiqueVerdict>(json).ok())
            {
                Some(verdict) => verdict,
                None => {
                    // An unreadable critique must not block the answer
                    warn!("Critique verdict unparsable, accepting current answer");
                    return Ok(Transition::Next);
                }
            },
            Err(e) => {
                warn!(error = %e, "Critique call failed, accepting current answer");
                return Ok(Transition::Next);
            }
        };

        if verdict.needs_refinement {
            info!(
                round = state.critique_rounds + 1,
                feedback = %verdict.feedback,
                "Critique requested refinement"
            );
            state.critique_rounds += 1;
            state.feedback_history.push(verdict.feedback.clone());
            state
                .messages
                .push(Message::user(format!("[Critic Feedback] {}", verdict.feedback)));
            return Ok(Transition::Goto(self.revise_target.clone()));
        }

        Ok(Transition::Next)
    }
}

/// Feeds accumulated critique feedback back into the shared skill store by
/// refining every skill this execution used.
pub struct RefineSkillsNode;

#[async_trait]
impl GraphNode for RefineSkillsNode {
    fn name(&self) -> &str {
        "refine_skills"
    }

    async fn run(&self, state: &mut GraphState, ctx: &GraphContext) -> Result<Transition> {
        if state.feedback_history.is_empty() || state.used_skill_ids.is_empty() {
            return Ok(Transition::Next);
        }

        let feedback = state.feedback_history.join("\n");
        for skill_id in state.used_skill_ids.clone() {
            let Some(skill) = ctx.skills.store().get(&skill_id).await? else {
                continue;
            };
            if ctx
                .skills
                .refine_existing_skill(
                    skill,
                    &feedback,
                    &state.tenant_id,
                    state.user_id.as_deref(),
                )
                .await?
                .is_none()
            {
                warn!(skill_id = %skill_id, "Refinement produced no usable skill");
            }
        }

        Ok(Transition::Next)
    }
}
