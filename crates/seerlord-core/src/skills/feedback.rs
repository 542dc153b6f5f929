//! Skill feedback loop
//!
//! Persists user ratings against skills and triggers refinement when a
//! skill's average rating drops below the configured threshold. Closes the
//! loop between execution quality and the shared skill store.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SkillConfig;
use crate::error::{Error, Result};

use super::manager::DynamicSkillManager;

/// A single rating submitted against a skill
#[derive(Debug, Clone)]
pub struct SkillFeedback {
    pub id: String,
    pub skill_id: String,
    /// 1 (unusable) to 5 (excellent)
    pub rating: u8,
    pub comment: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of one feedback submission
#[derive(Debug, Clone)]
pub struct FeedbackOutcome {
    /// Average rating across all reviews of the skill
    pub average_rating: f64,
    /// Total number of reviews on record
    pub review_count: usize,
    /// Whether this submission pushed the skill into refinement
    pub refinement_triggered: bool,
}

/// Records ratings and drives rating-based refinement
pub struct FeedbackService {
    pool: SqlitePool,
    manager: Arc<DynamicSkillManager>,
    config: SkillConfig,
}

impl FeedbackService {
    pub fn new(pool: SqlitePool, manager: Arc<DynamicSkillManager>, config: SkillConfig) -> Self {
        Self {
            pool,
            manager,
            config,
        }
    }

    /// Submit a rating for a skill.
    ///
    /// When the running average falls to or below the configured threshold
    /// (and enough reviews exist), the skill is sent through
    /// `refine_existing_skill` with the aggregated complaints. A refinement
    /// that produces nothing usable is logged, not raised.
    pub async fn submit(
        &self,
        skill_id: &str,
        rating: u8,
        comment: &str,
        tenant_id: &str,
        user_id: Option<&str>,
    ) -> Result<FeedbackOutcome> {
        if !(1..=5).contains(&rating) {
            return Err(Error::InvalidInput(format!(
                "Rating must be between 1 and 5, got {}",
                rating
            )));
        }

        let Some(skill) = self.manager.store().get(skill_id).await? else {
            return Err(Error::SkillNotFound(skill_id.to_string()));
        };

        sqlx::query(
            r#"
            INSERT INTO skill_feedback (id, skill_id, rating, comment, user_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(skill_id)
        .bind(rating as i32)
        .bind(comment)
        .bind(user_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let (average_rating, review_count) = self.average_rating(skill_id).await?;
        info!(
            skill_id = %skill_id,
            rating = rating,
            average = average_rating,
            reviews = review_count,
            "Feedback recorded"
        );

        let should_refine = review_count >= self.config.feedback_min_reviews
            && average_rating <= self.config.feedback_refine_threshold;

        if should_refine {
            warn!(
                skill_id = %skill_id,
                average = average_rating,
                "Skill is underperforming, triggering refinement"
            );

            let complaints = self.recent_complaints(skill_id, 5).await?;
            let aggregated = format!(
                "Average user rating {:.2} across {} reviews. Reported issues:\n{}",
                average_rating,
                review_count,
                complaints.join("\n")
            );

            if self
                .manager
                .refine_existing_skill(skill, &aggregated, tenant_id, user_id)
                .await?
                .is_none()
            {
                warn!(skill_id = %skill_id, "Refinement produced no usable skill");
            }
        }

        Ok(FeedbackOutcome {
            average_rating,
            review_count,
            refinement_triggered: should_refine,
        })
    }

    /// List all feedback on record for a skill, newest first
    pub async fn list_for_skill(&self, skill_id: &str) -> Result<Vec<SkillFeedback>> {
        let rows: Vec<FeedbackRow> = sqlx::query_as(
            r#"
            SELECT * FROM skill_feedback
            WHERE skill_id = ?
            ORDER BY created_at DESC, rating ASC
            "#,
        )
        .bind(skill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedbackRow::into_feedback).collect())
    }

    async fn average_rating(&self, skill_id: &str) -> Result<(f64, usize)> {
        let (average, count): (Option<f64>, i64) = sqlx::query_as(
            "SELECT AVG(rating), COUNT(*) FROM skill_feedback WHERE skill_id = ?",
        )
        .bind(skill_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((average.unwrap_or(0.0), count as usize))
    }

    async fn recent_complaints(&self, skill_id: &str, limit: usize) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT comment FROM skill_feedback
            WHERE skill_id = ? AND comment != ''
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(skill_id)
        .bind(limit as i32)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(c,)| format!("- {}", c)).collect())
    }
}

/// Database row for the skill_feedback table
#[derive(Debug, FromRow)]
struct FeedbackRow {
    id: String,
    skill_id: String,
    rating: i64,
    comment: String,
    user_id: Option<String>,
    created_at: String,
}

impl FeedbackRow {
    fn into_feedback(self) -> SkillFeedback {
        SkillFeedback {
            id: self.id,
            skill_id: self.skill_id,
            rating: self.rating as u8,
            comment: self.comment,
            user_id: self.user_id,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}
