//! Skill storage and retrieval
//!
//! Persists skills in SQLite (typed columns + JSON payload) alongside a
//! parallel vector index used for similarity-filtered retrieval. Every write
//! touches both stores inside one transaction; a partial write is surfaced as
//! an error rather than leaving the index inconsistent.
//!
//! Retrieval precedence: candidates are returned in pure vector-rank order.
//! Skill level never reorders them; Specific/Domain/Meta precedence emerges
//! from embedding similarity alone.

use std::sync::Arc;

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SkillConfig;
use crate::error::{Error, Result};
use crate::llm::{Embedder, cosine_similarity, embedding_from_bytes, embedding_to_bytes};

use super::types::{GLOBAL_TENANT, Skill, builtin_meta_skills, default_meta_skill};

/// A retrieval outcome: always a skill, never absent
#[derive(Debug, Clone)]
pub struct RetrievedSkill {
    pub skill: Skill,
    /// Human-readable reason: which path produced this skill
    pub reason: String,
}

impl RetrievedSkill {
    /// Whether the skill came from a fallback path rather than a vector match
    pub fn is_fallback(&self) -> bool {
        self.reason.starts_with("fallback")
    }
}

/// Store for persisting and retrieving hierarchical skills
#[derive(Clone)]
pub struct SkillStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    config: SkillConfig,
}

impl SkillStore {
    /// Create a new skill store over the given pool and embedder
    pub fn new(pool: SqlitePool, embedder: Arc<dyn Embedder>, config: SkillConfig) -> Self {
        Self {
            pool,
            embedder,
            config,
        }
    }

    /// Seed the built-in Meta skills into the global scope.
    ///
    /// Idempotent: name-based dedup turns repeat seeding into overwrites of
    /// the same rows. Guarantees every tenant sees at least one Meta skill.
    pub async fn ensure_builtin_skills(&self) -> Result<()> {
        for mut skill in builtin_meta_skills() {
            self.add_skill(&mut skill, GLOBAL_TENANT, None, "Built-in seed")
                .await?;
        }
        Ok(())
    }

    /// Upsert a skill into relational storage and the vector index.
    ///
    /// Dedup order: by id first, then by name. When an existing record is
    /// matched, the incoming skill adopts its id (so the vector index updates
    /// the same record), a history snapshot of the prior payload is written,
    /// and the row's version is bumped.
    ///
    /// Both writes commit or roll back together; the embedding is computed
    /// before the transaction opens so an embedder failure leaves no partial
    /// state.
    pub async fn add_skill(
        &self,
        skill: &mut Skill,
        tenant_id: &str,
        user_id: Option<&str>,
        change_reason: &str,
    ) -> Result<()> {
        let embedding = self.embedder.embed(&skill.embedding_text()).await?;

        let mut tx = self.pool.begin().await?;

        let existing: Option<SkillRow> = sqlx::query_as("SELECT * FROM skills WHERE id = ?")
            .bind(&skill.id)
            .fetch_optional(&mut *tx)
            .await?;

        let existing = match existing {
            Some(row) => Some(row),
            None => {
                // Name dedup spans all tenants: skills are collectively
                // improved, so a same-named skill is an update, not a twin.
                let by_name: Option<SkillRow> = sqlx::query_as("SELECT * FROM skills WHERE name = ?")
                    .bind(&skill.name)
                    .fetch_optional(&mut *tx)
                    .await?;
                if let Some(row) = &by_name {
                    warn!(
                        skill_name = %skill.name,
                        existing_id = %row.id,
                        "Skill name already exists, updating in place"
                    );
                    skill.id = row.id.clone();
                }
                by_name
            }
        };

        let now = Utc::now().to_rfc3339();
        let payload = serde_json::to_string(skill)
            .map_err(|e| Error::Other(format!("Failed to serialize skill: {}", e)))?;

        if let Some(row) = existing {
            sqlx::query(
                r#"
                INSERT INTO skill_history (id, skill_id, version, pre_content_json, change_reason, actor)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&row.id)
            .bind(row.version)
            .bind(&row.content_json)
            .bind(change_reason)
            .bind(user_id.unwrap_or("system"))
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE skills
                SET name = ?, description = ?, level = ?, content_json = ?,
                    version = version + 1, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&skill.name)
            .bind(&skill.description)
            .bind(skill.level.as_str())
            .bind(&payload)
            .bind(&now)
            .bind(&skill.id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO skills (id, name, description, level, tenant_id, user_id, content_json, version, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                "#,
            )
            .bind(&skill.id)
            .bind(&skill.name)
            .bind(&skill.description)
            .bind(skill.level.as_str())
            .bind(tenant_id)
            .bind(user_id)
            .bind(&payload)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO skill_vectors (id, skill_id, tenant_id, user_id, level, embedding, dimensions, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(skill_id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                user_id = excluded.user_id,
                level = excluded.level,
                embedding = excluded.embedding,
                dimensions = excluded.dimensions,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&skill.id)
        .bind(tenant_id)
        .bind(user_id)
        .bind(skill.level.as_str())
        .bind(embedding_to_bytes(&embedding))
        .bind(embedding.len() as i32)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            skill_id = %skill.id,
            skill_name = %skill.name,
            level = %skill.level,
            tenant_id = %tenant_id,
            "Skill saved"
        );
        Ok(())
    }

    /// Get a skill by id
    pub async fn get(&self, id: &str) -> Result<Option<Skill>> {
        let row: Option<SkillRow> = sqlx::query_as("SELECT * FROM skills WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_skill()).transpose()
    }

    /// List all skills visible to a tenant (its own plus global scope)
    pub async fn list(&self, tenant_id: &str) -> Result<Vec<Skill>> {
        let rows: Vec<SkillRow> = sqlx::query_as(
            r#"
            SELECT * FROM skills
            WHERE tenant_id IN (?, ?)
            ORDER BY level, name
            "#,
        )
        .bind(tenant_id)
        .bind(GLOBAL_TENANT)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_skill()).collect()
    }

    /// Retrieve the best-matching skill for a query.
    ///
    /// Never fails on "no match": the built-in Meta default is returned with
    /// a fallback reason. Only infrastructure failures (store or embedder
    /// unreachable) surface as errors.
    pub async fn retrieve_best_skill(
        &self,
        query: &str,
        tenant_id: &str,
        user_id: Option<&str>,
        agent_name: Option<&str>,
        min_score: f32,
    ) -> Result<RetrievedSkill> {
        debug!(
            query = %query,
            tenant_id = %tenant_id,
            user_id = ?user_id,
            agent_name = ?agent_name,
            "Searching for best skill"
        );

        let candidates = self
            .vector_search(query, tenant_id, self.config.max_candidates, min_score)
            .await?;

        if candidates.is_empty() {
            return Ok(RetrievedSkill {
                skill: default_meta_skill(),
                reason: "fallback (no skill found)".to_string(),
            });
        }

        // Hydrate in vector-rank order; the first full record wins.
        for (skill_id, score) in &candidates {
            match self.get(skill_id).await? {
                Some(skill) => {
                    let reason = format!("vector match ({})", skill.level);
                    debug!(skill_id = %skill.id, score = score, reason = %reason, "Skill retrieved");
                    return Ok(RetrievedSkill { skill, reason });
                }
                None => {
                    warn!(skill_id = %skill_id, "Vector index references a missing skill record");
                    continue;
                }
            }
        }

        Ok(RetrievedSkill {
            skill: default_meta_skill(),
            reason: "fallback (store sync error)".to_string(),
        })
    }

    /// Retrieve up to `limit` related skills without fallback injection.
    ///
    /// Used to give the evolution engine context beyond the Meta default.
    pub async fn retrieve_related(
        &self,
        query: &str,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<Skill>> {
        let candidates = self
            .vector_search(query, tenant_id, limit, self.config.related_threshold)
            .await?;

        let mut skills = Vec::with_capacity(candidates.len());
        for (skill_id, _) in candidates {
            if let Some(skill) = self.get(&skill_id).await? {
                skills.push(skill);
            }
        }
        Ok(skills)
    }

    /// Record one execution attempt against a skill's usage counters
    pub async fn record_usage(&self, skill_id: &str, success: bool) -> Result<()> {
        let Some(mut skill) = self.get(skill_id).await? else {
            return Err(Error::SkillNotFound(skill_id.to_string()));
        };

        skill.stats.record(success);
        let payload = serde_json::to_string(&skill)
            .map_err(|e| Error::Other(format!("Failed to serialize skill: {}", e)))?;

        sqlx::query("UPDATE skills SET content_json = ?, updated_at = ? WHERE id = ?")
            .bind(&payload)
            .bind(Utc::now().to_rfc3339())
            .bind(skill_id)
            .execute(&self.pool)
            .await?;

        debug!(skill_id = %skill_id, success = success, "Recorded skill usage");
        Ok(())
    }

    /// Administratively delete a skill and its vector record
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM skill_vectors WHERE skill_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM skills WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(skill_id = %id, "Skill deleted");
        }
        Ok(deleted)
    }

    /// Count stored skills
    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM skills")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Tenant-filtered cosine search over the vector index.
    ///
    /// Returns `(skill_id, score)` pairs in descending score order. The
    /// tenant filter admits the caller's scope and the global scope, nothing
    /// else.
    async fn vector_search(
        &self,
        query: &str,
        tenant_id: &str,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<(String, f32)>> {
        let query_vector = self.embedder.embed(query).await?;

        let rows: Vec<VectorRow> = sqlx::query_as(
            r#"
            SELECT skill_id, tenant_id, level, embedding, dimensions
            FROM skill_vectors
            WHERE tenant_id IN (?, ?)
            "#,
        )
        .bind(tenant_id)
        .bind(GLOBAL_TENANT)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(String, f32)> = rows
            .into_iter()
            .filter_map(|row| {
                let embedding = embedding_from_bytes(&row.embedding);
                let score = cosine_similarity(&query_vector, &embedding);
                (score >= min_score).then_some((row.skill_id, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

/// Database row for the skills table
#[derive(Debug, FromRow)]
struct SkillRow {
    id: String,
    #[allow(dead_code)]
    name: String,
    #[allow(dead_code)]
    description: String,
    #[allow(dead_code)]
    level: String,
    #[allow(dead_code)]
    tenant_id: String,
    #[allow(dead_code)]
    user_id: Option<String>,
    content_json: String,
    version: i64,
    #[allow(dead_code)]
    created_at: String,
    #[allow(dead_code)]
    updated_at: String,
}

impl SkillRow {
    fn into_skill(self) -> Result<Skill> {
        let mut skill: Skill = serde_json::from_str(&self.content_json)
            .map_err(|e| Error::StoreInconsistent(format!("Bad skill payload {}: {}", self.id, e)))?;
        // Columns are authoritative for identity
        skill.id = self.id;
        Ok(skill)
    }
}

/// Database row for the skill_vectors table
#[derive(Debug, FromRow)]
struct VectorRow {
    skill_id: String,
    #[allow(dead_code)]
    tenant_id: String,
    #[allow(dead_code)]
    level: String,
    embedding: Vec<u8>,
    #[allow(dead_code)]
    dimensions: i32,
}
