//! Skill evolution engine
//!
//! Synthesizes a new skill, or refines an existing one, via structured LLM
//! generation. Two entry branches exist and exactly one runs per invocation:
//! drafting (analyze the capability gap, then draft a skill definition) when
//! no skill is supplied for refinement, refining otherwise.
//!
//! The engine never propagates errors: every failure mode (transport error,
//! unparsable output, schema violation) collapses into an outcome with no
//! proposed skill and a human-readable report.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::json::extract_json_object;
use crate::llm::{ChatModel, ChatOptions, Message};

use super::types::{Skill, SkillContent, SkillLevel};

/// Target of the refine branch
#[derive(Debug, Clone)]
pub struct RefineTarget {
    /// The skill to refine
    pub skill: Skill,
    /// Description of what went wrong during execution
    pub execution_feedback: String,
}

/// Input to one evolution run
#[derive(Debug, Clone)]
pub struct EvolutionRequest {
    /// The task the missing capability should serve
    pub task: String,
    /// Persona of the consuming agent; the drafted prompt must be tailored
    /// to it, not to a generic assistant
    pub agent_description: String,
    /// Role-tagged conversation leading up to the gap
    pub conversation_history: Vec<Message>,
    /// Skills retrieved as context, typically the Meta fallback
    pub related_skills: Vec<Skill>,
    /// Present iff the refine branch should run
    pub refine: Option<RefineTarget>,
}

impl EvolutionRequest {
    /// Build a draft-branch request
    pub fn draft(task: impl Into<String>, agent_description: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            agent_description: agent_description.into(),
            conversation_history: Vec::new(),
            related_skills: Vec::new(),
            refine: None,
        }
    }

    /// Build a refine-branch request
    pub fn refine(skill: Skill, execution_feedback: impl Into<String>) -> Self {
        let task = skill.name.clone();
        Self {
            task,
            agent_description: String::new(),
            conversation_history: Vec::new(),
            related_skills: Vec::new(),
            refine: Some(RefineTarget {
                skill,
                execution_feedback: execution_feedback.into(),
            }),
        }
    }

    /// Attach conversation history
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.conversation_history = history;
        self
    }

    /// Attach retrieved context skills
    pub fn with_related(mut self, related: Vec<Skill>) -> Self {
        self.related_skills = related;
        self
    }
}

/// Output of one evolution run; always carries a report
#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    /// The synthesized skill, absent on any failure
    pub proposed_skill: Option<Skill>,
    /// Human-readable description of what happened
    pub report: String,
}

/// Why a model response could not become a skill
#[derive(Error, Debug)]
enum SkillParseError {
    #[error("no JSON object found in response")]
    NoJson,
    #[error("response JSON did not match the skill schema: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("drafted skills must be specific or domain level, got '{0}'")]
    MetaDrafted(String),
}

/// Strict-decode shape for a drafted skill definition
#[derive(Debug, Deserialize)]
struct SkillDraft {
    name: String,
    level: String,
    description: String,
    content: SkillContent,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Engine that drafts and refines skills
pub struct EvolutionEngine {
    chat: Arc<dyn ChatModel>,
}

impl EvolutionEngine {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    /// Run one evolution. Exactly one branch executes, chosen by the
    /// presence of a refine target. Infallible by contract.
    pub async fn evolve(&self, request: &EvolutionRequest) -> EvolutionOutcome {
        match &request.refine {
            Some(target) => self.refine_skill(target).await,
            None => self.draft_branch(request).await,
        }
    }

    /// Draft branch: analyze_gap then draft_skill
    async fn draft_branch(&self, request: &EvolutionRequest) -> EvolutionOutcome {
        let analysis = match self.analyze_gap(request).await {
            Ok(analysis) => analysis,
            Err(report) => return EvolutionOutcome {
                proposed_skill: None,
                report,
            },
        };

        debug!(task = %request.task, "Gap analysis complete, drafting skill");
        self.draft_skill(request, &analysis).await
    }

    /// Diagnose what capability is missing, scoped to the consuming agent's
    /// persona. The same query may warrant different skills for different
    /// personas, so the persona is part of the diagnosis.
    async fn analyze_gap(&self, request: &EvolutionRequest) -> std::result::Result<String, String> {
        let history_text = request
            .conversation_history
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let skills_text = request
            .related_skills
            .iter()
            .map(|s| format!("- {} ({}): {}", s.name, s.level, s.description))
            .collect::<Vec<_>>()
            .join("\n");

        let messages = vec![
            Message::system(
                "You are an expert Skill Architect. Analyze the conversation to identify why \
                 the current skills were insufficient for this specific agent.",
            ),
            Message::user(format!(
                "Agent persona:\n{}\n\nTask: {}\n\nConversation history:\n{}\n\n\
                 Related skills available:\n{}\n\n\
                 Describe the missing knowledge or capability, scoped to this agent's persona.",
                request.agent_description, request.task, history_text, skills_text
            )),
        ];

        self.chat
            .complete(messages, ChatOptions::default())
            .await
            .map(|response| response.content)
            .map_err(|e| format!("Evolution failed during gap analysis: {}", e))
    }

    /// Produce a structured skill definition from the gap analysis
    async fn draft_skill(&self, request: &EvolutionRequest, analysis: &str) -> EvolutionOutcome {
        let messages = vec![
            Message::system(
                r#"You are an expert Skill Architect. Create a structured skill definition.
Return ONLY a JSON object with these fields:
- name: PascalCase (e.g. CalculateTax)
- level: "specific" (narrow, directly executable) or "domain" (broader category)
- description: concise summary used for semantic search
- content:
    - prompt_template: the system prompt for the agent performing this skill,
      written for the agent persona given below, not for a generic assistant
    - knowledge_base: list of key facts or rules"#,
            ),
            Message::user(format!(
                "Agent persona:\n{}\n\nGap analysis:\n{}\n\nDraft the skill now.",
                request.agent_description, analysis
            )),
        ];

        let response = match self.chat.complete(messages, ChatOptions::structured()).await {
            Ok(response) => response,
            Err(e) => {
                return EvolutionOutcome {
                    proposed_skill: None,
                    report: format!("Evolution failed during skill drafting: {}", e),
                };
            }
        };

        match parse_skill_draft(&response.content) {
            Ok(draft) => {
                let name = draft.name.clone();
                let mut skill = Skill::new(
                    draft.name,
                    draft.description,
                    SkillLevel::parse(&draft.level),
                    draft.content,
                )
                .with_tags(draft.tags);
                skill.parent_id = draft.parent_id;

                EvolutionOutcome {
                    proposed_skill: Some(skill),
                    report: format!("Skill '{}' drafted successfully.", name),
                }
            }
            Err(e) => {
                warn!(error = %e, "Drafted skill could not be parsed");
                EvolutionOutcome {
                    proposed_skill: None,
                    report: format!("Failed to parse drafted skill: {}", e),
                }
            }
        }
    }

    /// Refine branch: rewrite the prompt template and knowledge base of an
    /// existing skill using execution feedback.
    ///
    /// The refined skill keeps the original's name (unless the model had to
    /// change it) and level, and carries the original's id as `parent_id`
    /// for lineage. Persistence overwrites rather than forks.
    async fn refine_skill(&self, target: &RefineTarget) -> EvolutionOutcome {
        let original_json = serde_json::to_string_pretty(&target.skill).unwrap_or_default();

        let messages = vec![
            Message::system(
                r#"You are an expert Skill Architect refining an underperforming skill.
Return ONLY a JSON object with the same shape as the original skill:
name, level, description, content { prompt_template, knowledge_base }.
Keep the original name unless a change is unavoidable. Focus the changes on
the prompt_template and knowledge_base to address the feedback."#,
            ),
            Message::user(format!(
                "Original skill:\n{}\n\nExecution feedback:\n{}\n\nProduce the refined skill now.",
                original_json, target.execution_feedback
            )),
        ];

        let response = match self.chat.complete(messages, ChatOptions::structured()).await {
            Ok(response) => response,
            Err(e) => {
                return EvolutionOutcome {
                    proposed_skill: None,
                    report: format!("Refinement failed: {}", e),
                };
            }
        };

        match parse_refined_draft(&response.content) {
            Ok(draft) => {
                let name = if draft.name.trim().is_empty() {
                    target.skill.name.clone()
                } else {
                    draft.name
                };
                let mut skill = Skill::new(
                    name.clone(),
                    draft.description,
                    target.skill.level,
                    draft.content,
                )
                .with_parent(target.skill.id.clone());
                skill.tags = if draft.tags.is_empty() {
                    target.skill.tags.clone()
                } else {
                    draft.tags
                };

                EvolutionOutcome {
                    proposed_skill: Some(skill),
                    report: format!("Skill '{}' refined from execution feedback.", name),
                }
            }
            Err(e) => {
                warn!(error = %e, skill = %target.skill.name, "Refined skill could not be parsed");
                EvolutionOutcome {
                    proposed_skill: None,
                    report: format!("Failed to parse refined skill: {}", e),
                }
            }
        }
    }
}

/// Parse a drafted skill, rejecting Meta-level drafts
fn parse_skill_draft(content: &str) -> std::result::Result<SkillDraft, SkillParseError> {
    let json = extract_json_object(content).ok_or(SkillParseError::NoJson)?;
    let draft: SkillDraft = serde_json::from_str(json)?;

    if SkillLevel::parse(&draft.level) == SkillLevel::Meta {
        return Err(SkillParseError::MetaDrafted(draft.level));
    }
    Ok(draft)
}

/// Parse a refined skill (level is taken from the original, so any level
/// string in the response is accepted)
fn parse_refined_draft(content: &str) -> std::result::Result<SkillDraft, SkillParseError> {
    let json = extract_json_object(content).ok_or(SkillParseError::NoJson)?;
    Ok(serde_json::from_str(json)?)
}
