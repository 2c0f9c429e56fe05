use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tokio::sync::OnceCell;

use eduloop_core::domain::feedback::{FeedbackId, FeedbackRecord, FeedbackType, NewFeedback};

use super::{decode_error, format_timestamp, parse_timestamp, FeedbackRepository, RepositoryError};
use crate::{schema, DbPool};

pub struct SqlFeedbackRepository {
    pool: DbPool,
    schema_ready: OnceCell<()>,
}

impl SqlFeedbackRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, schema_ready: OnceCell::new() }
    }

    async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        self.schema_ready.get_or_try_init(|| schema::ensure_feedback(&self.pool)).await?;
        Ok(())
    }
}

fn row_to_feedback(row: &SqliteRow) -> Result<FeedbackRecord, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let student_id: String = row.try_get("student_id").map_err(decode_error)?;
    let recommendation_id: String = row.try_get("recommendation_id").map_err(decode_error)?;
    let feedback_type_str: String = row.try_get("feedback_type").map_err(decode_error)?;
    let comments: Option<String> = row.try_get("comments").map_err(decode_error)?;
    let rating: Option<i64> = row.try_get("rating").map_err(decode_error)?;
    let timestamp_str: String = row.try_get("timestamp").map_err(decode_error)?;

    let feedback_type = feedback_type_str
        .parse::<FeedbackType>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(FeedbackRecord {
        id: FeedbackId(id),
        student_id,
        recommendation_id,
        feedback_type,
        comments: comments.unwrap_or_default(),
        rating,
        timestamp: parse_timestamp("timestamp", &timestamp_str)?,
    })
}

#[async_trait::async_trait]
impl FeedbackRepository for SqlFeedbackRepository {
    async fn insert(&self, feedback: NewFeedback) -> Result<FeedbackRecord, RepositoryError> {
        self.ensure_schema().await?;

        let result = sqlx::query(
            "INSERT INTO feedback
                (student_id, recommendation_id, feedback_type, comments, rating, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&feedback.student_id)
        .bind(&feedback.recommendation_id)
        .bind(feedback.feedback_type.as_str())
        .bind(&feedback.comments)
        .bind(feedback.rating.map(i64::from))
        .bind(format_timestamp(&feedback.timestamp))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, student_id, recommendation_id, feedback_type, comments, rating, timestamp
             FROM feedback WHERE id = ?",
        )
        .bind(result.last_insert_rowid())
        .fetch_one(&self.pool)
        .await?;

        row_to_feedback(&row)
    }

    async fn history_for_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError> {
        self.ensure_schema().await?;

        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT id, student_id, recommendation_id, feedback_type, comments, rating, timestamp
             FROM feedback
             WHERE student_id = ?
             ORDER BY julianday(timestamp) DESC, id DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_feedback).collect::<Result<Vec<_>, _>>()
    }

    async fn average_rating(
        &self,
        recommendation_id: &str,
    ) -> Result<Option<f64>, RepositoryError> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            "SELECT AVG(rating) AS avg_rating
             FROM feedback
             WHERE recommendation_id = ? AND rating IS NOT NULL",
        )
        .bind(recommendation_id)
        .fetch_one(&self.pool)
        .await?;

        row.try_get::<Option<f64>, _>("avg_rating").map_err(decode_error)
    }
}
