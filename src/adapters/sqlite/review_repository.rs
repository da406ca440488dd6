//! SQLite implementation of the ReviewRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Review, ReviewVerdict};
use crate::domain::ports::ReviewRepository;

use super::agent_repository::{parse_timestamp, parse_uuid};

#[derive(Clone)]
pub struct SqliteReviewRepository {
    pool: SqlitePool,
}

impl SqliteReviewRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewRepository for SqliteReviewRepository {
    async fn upsert(&self, review: &Review) -> DomainResult<bool> {
        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM reviews WHERE stream_id = ? AND reviewer_id = ?",
        )
        .bind(review.stream_id.to_string())
        .bind(review.reviewer_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        let newly_created = existing.is_none();

        // karma_awarded is sticky across overwrites so the review
        // award can never fire twice for one (stream, reviewer).
        sqlx::query(
            r#"INSERT INTO reviews (id, stream_id, reviewer_id, verdict, feedback, tested,
               is_human, is_maintainer, karma_awarded, reviewed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (stream_id, reviewer_id) DO UPDATE SET
                   verdict = excluded.verdict,
                   feedback = excluded.feedback,
                   tested = excluded.tested,
                   is_human = excluded.is_human,
                   is_maintainer = excluded.is_maintainer,
                   karma_awarded = reviews.karma_awarded OR excluded.karma_awarded,
                   reviewed_at = excluded.reviewed_at"#,
        )
        .bind(review.id.to_string())
        .bind(review.stream_id.to_string())
        .bind(review.reviewer_id.to_string())
        .bind(review.verdict.as_str())
        .bind(&review.feedback)
        .bind(review.tested)
        .bind(review.is_human)
        .bind(review.is_maintainer)
        .bind(review.karma_awarded)
        .bind(review.reviewed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(newly_created)
    }

    async fn get(&self, stream_id: Uuid, reviewer_id: Uuid) -> DomainResult<Option<Review>> {
        let row: Option<ReviewRow> =
            sqlx::query_as("SELECT * FROM reviews WHERE stream_id = ? AND reviewer_id = ?")
                .bind(stream_id.to_string())
                .bind(reviewer_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_for_stream(&self, stream_id: Uuid) -> DomainResult<Vec<Review>> {
        let rows: Vec<ReviewRow> =
            sqlx::query_as("SELECT * FROM reviews WHERE stream_id = ? ORDER BY reviewed_at")
                .bind(stream_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn mark_karma_awarded(&self, stream_id: Uuid, reviewer_id: Uuid) -> DomainResult<()> {
        sqlx::query(
            "UPDATE reviews SET karma_awarded = 1 WHERE stream_id = ? AND reviewer_id = ?",
        )
        .bind(stream_id.to_string())
        .bind(reviewer_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: String,
    stream_id: String,
    reviewer_id: String,
    verdict: String,
    feedback: Option<String>,
    tested: bool,
    is_human: bool,
    is_maintainer: bool,
    karma_awarded: bool,
    reviewed_at: String,
}

impl TryFrom<ReviewRow> for Review {
    type Error = DomainError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        Ok(Review {
            id: parse_uuid(&row.id, "review")?,
            stream_id: parse_uuid(&row.stream_id, "stream")?,
            reviewer_id: parse_uuid(&row.reviewer_id, "agent")?,
            verdict: ReviewVerdict::from_str(&row.verdict)
                .ok_or_else(|| DomainError::Internal(format!("bad verdict: {}", row.verdict)))?,
            feedback: row.feedback,
            tested: row.tested,
            is_human: row.is_human,
            is_maintainer: row.is_maintainer,
            karma_awarded: row.karma_awarded,
            reviewed_at: parse_timestamp(&row.reviewed_at)?,
        })
    }
}
