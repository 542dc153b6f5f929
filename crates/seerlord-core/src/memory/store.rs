//! Experience memory store
//!
//! Long-term memory of past interactions, retrieved by embedding similarity.
//! Memories are strictly tenant-scoped: unlike skills, there is no shared
//! global scope, and every query filters on the caller's tenant.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::llm::{Embedder, cosine_similarity, embedding_from_bytes, embedding_to_bytes};

/// A memory retrieved for a query
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub id: String,
    pub content: String,
    pub agent_name: String,
    pub score: f32,
    pub created_at: DateTime<Utc>,
}

/// Tenant-scoped store of experience fragments
#[derive(Clone)]
pub struct MemoryStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl MemoryStore {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn Embedder>) -> Self {
        Self { pool, embedder }
    }

    /// Save a text fragment with its tenant, user, agent, and session context
    pub async fn save_experience(
        &self,
        content: &str,
        tenant_id: &str,
        user_id: Option<&str>,
        agent_name: &str,
        session_id: &str,
    ) -> Result<String> {
        let embedding = self.embedder.embed(content).await?;
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO memories (id, tenant_id, user_id, agent_name, session_id, content, embedding, dimensions, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(user_id)
        .bind(agent_name)
        .bind(session_id)
        .bind(content)
        .bind(embedding_to_bytes(&embedding))
        .bind(embedding.len() as i32)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(memory_id = %id, tenant_id = %tenant_id, agent_name = %agent_name, "Experience saved");
        Ok(id)
    }

    /// Retrieve the `k` most relevant memories for a query.
    ///
    /// Absence is an empty vector, never an error. The tenant filter is
    /// mandatory; user and agent filters narrow further when given.
    pub async fn retrieve_relevant(
        &self,
        query: &str,
        tenant_id: &str,
        user_id: Option<&str>,
        agent_name: Option<&str>,
        k: usize,
        min_score: f32,
    ) -> Result<Vec<MemoryHit>> {
        let query_vector = self.embedder.embed(query).await?;

        let rows: Vec<MemoryRow> = match (user_id, agent_name) {
            (Some(user), Some(agent)) => {
                sqlx::query_as(
                    "SELECT * FROM memories WHERE tenant_id = ? AND user_id = ? AND agent_name = ?",
                )
                .bind(tenant_id)
                .bind(user)
                .bind(agent)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(user), None) => {
                sqlx::query_as("SELECT * FROM memories WHERE tenant_id = ? AND user_id = ?")
                    .bind(tenant_id)
                    .bind(user)
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, Some(agent)) => {
                sqlx::query_as("SELECT * FROM memories WHERE tenant_id = ? AND agent_name = ?")
                    .bind(tenant_id)
                    .bind(agent)
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, None) => {
                sqlx::query_as("SELECT * FROM memories WHERE tenant_id = ?")
                    .bind(tenant_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut hits: Vec<MemoryHit> = rows
            .into_iter()
            .filter_map(|row| {
                let embedding = embedding_from_bytes(&row.embedding);
                let score = cosine_similarity(&query_vector, &embedding);
                (score >= min_score).then(|| row.into_hit(score))
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    /// Count memories held for a tenant
    pub async fn count(&self, tenant_id: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM memories WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

/// Database row for the memories table
#[derive(Debug, FromRow)]
struct MemoryRow {
    id: String,
    #[allow(dead_code)]
    tenant_id: String,
    #[allow(dead_code)]
    user_id: Option<String>,
    agent_name: String,
    #[allow(dead_code)]
    session_id: String,
    content: String,
    embedding: Vec<u8>,
    #[allow(dead_code)]
    dimensions: i32,
    created_at: String,
}

impl MemoryRow {
    fn into_hit(self, score: f32) -> MemoryHit {
        MemoryHit {
            id: self.id,
            content: self.content,
            agent_name: self.agent_name,
            score,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}
