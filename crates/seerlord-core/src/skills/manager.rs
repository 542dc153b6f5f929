//! Dynamic skill manager
//!
//! The single orchestration point combining skill-store retrieval with the
//! evolution engine. Evolution fires if and only if retrieval bottoms out at
//! the Meta level, meaning no specific-enough skill exists for the query.
//!
//! Concurrency note: the manager is typically invoked once per incoming
//! request. Concurrent invocations for the same query and tenant may race to
//! evolve near-identical skills. That race is accepted: writes are upserts
//! keyed by id and name, so duplicates degrade retrieval quality at worst,
//! they never corrupt state.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SkillConfig;
use crate::error::Result;
use crate::llm::Message;

use super::events::{SkillEvent, SkillEventSink};
use super::evolution::{EvolutionEngine, EvolutionRequest};
use super::store::{RetrievedSkill, SkillStore};
use super::types::{GLOBAL_TENANT, Skill, SkillLevel};

/// How many related skills are fed to the evolution engine as context
const RELATED_CONTEXT_LIMIT: usize = 3;

/// Orchestrates retrieval, evolution, and persistence of skills
pub struct DynamicSkillManager {
    store: Arc<SkillStore>,
    engine: EvolutionEngine,
    events: Arc<dyn SkillEventSink>,
    config: SkillConfig,
}

impl DynamicSkillManager {
    pub fn new(
        store: Arc<SkillStore>,
        engine: EvolutionEngine,
        events: Arc<dyn SkillEventSink>,
        config: SkillConfig,
    ) -> Self {
        Self {
            store,
            engine,
            events,
            config,
        }
    }

    /// Access the underlying store
    pub fn store(&self) -> &Arc<SkillStore> {
        &self.store
    }

    /// Retrieve the best skill for a query, evolving a new one when only the
    /// Meta fallback is available.
    ///
    /// Degrades gracefully: a failed evolution returns the Meta skill with
    /// its original retrieval reason. Store and embedder failures propagate.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_or_evolve_skill(
        &self,
        query: &str,
        tenant_id: &str,
        user_id: Option<&str>,
        agent_name: Option<&str>,
        agent_description: &str,
        conversation_history: Vec<Message>,
    ) -> Result<RetrievedSkill> {
        let retrieved = self
            .store
            .retrieve_best_skill(query, tenant_id, user_id, agent_name, self.config.min_score)
            .await?;

        info!(
            skill = %retrieved.skill.name,
            level = %retrieved.skill.level,
            reason = %retrieved.reason,
            "Skill retrieval complete"
        );
        self.events
            .emit(SkillEvent::retrieved(&retrieved.skill, &retrieved.reason));

        // The evolution trigger: only when retrieval bottomed out at Meta
        if retrieved.skill.level != SkillLevel::Meta {
            return Ok(retrieved);
        }
        if !self.config.evolution_enabled {
            return Ok(retrieved);
        }

        info!(query = %query, "Only a Meta skill found, triggering evolution");
        self.events.emit(SkillEvent::EvolutionStarted {
            query: query.to_string(),
        });

        let mut related = self
            .store
            .retrieve_related(query, tenant_id, RELATED_CONTEXT_LIMIT)
            .await?;
        related.push(retrieved.skill.clone());

        let history = if conversation_history.is_empty() {
            vec![Message::user(query)]
        } else {
            conversation_history
        };
        let request = EvolutionRequest::draft(query, agent_description)
            .with_history(history)
            .with_related(related);

        let outcome = self.engine.evolve(&request).await;

        match outcome.proposed_skill {
            Some(mut skill) => {
                // Skills are collectively improved: evolved skills persist
                // under the shared global scope so every tenant benefits.
                self.store
                    .add_skill(&mut skill, GLOBAL_TENANT, user_id, "Evolved from query")
                    .await?;

                info!(
                    skill_id = %skill.id,
                    skill_name = %skill.name,
                    level = %skill.level,
                    "Evolution complete, new skill persisted"
                );
                self.events.emit(SkillEvent::evolved(&skill));

                Ok(RetrievedSkill {
                    skill,
                    reason: "evolved new skill".to_string(),
                })
            }
            None => {
                warn!(report = %outcome.report, "Evolution produced no skill, keeping Meta fallback");
                Ok(retrieved)
            }
        }
    }

    /// Refine an existing skill from execution feedback and persist the
    /// result.
    ///
    /// Returns `Ok(None)` when refinement produced nothing usable; store
    /// failures during persistence propagate as errors.
    pub async fn refine_existing_skill(
        &self,
        skill: Skill,
        feedback: &str,
        tenant_id: &str,
        user_id: Option<&str>,
    ) -> Result<Option<Skill>> {
        let original_name = skill.name.clone();
        let request = EvolutionRequest::refine(skill, feedback);
        let outcome = self.engine.evolve(&request).await;

        match outcome.proposed_skill {
            Some(mut refined) => {
                self.store
                    .add_skill(&mut refined, tenant_id, user_id, "Refined from feedback")
                    .await?;

                info!(
                    skill_id = %refined.id,
                    skill_name = %refined.name,
                    "Skill refined and persisted"
                );
                self.events.emit(SkillEvent::Refined {
                    name: refined.name.clone(),
                    description: refined.description.clone(),
                });

                Ok(Some(refined))
            }
            None => {
                warn!(
                    skill = %original_name,
                    report = %outcome.report,
                    "Refinement produced no skill"
                );
                Ok(None)
            }
        }
    }
}
