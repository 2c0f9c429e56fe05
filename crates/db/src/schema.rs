//! Table definitions for the review workflow.
//!
//! Every statement is idempotent. Repositories run their table's statements
//! on first use; `ensure_all` creates everything up front.

use tracing::debug;

use crate::DbPool;

pub const MANAGED_TABLES: [&str; 2] = ["approval_requests", "feedback"];

pub const APPROVAL_REQUESTS_TABLE: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS approval_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id TEXT NOT NULL,
        decision_type TEXT NOT NULL,
        decision_data TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        priority TEXT NOT NULL DEFAULT 'normal',
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        reviewed_at TEXT,
        reviewer_id TEXT,
        reviewer_comments TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_approval_requests_queue
        ON approval_requests (status, priority, created_at)",
];

pub const FEEDBACK_TABLE: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS feedback (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id TEXT NOT NULL,
        recommendation_id TEXT NOT NULL,
        feedback_type TEXT NOT NULL,
        comments TEXT,
        rating INTEGER,
        timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_feedback_student_id ON feedback (student_id)",
    "CREATE INDEX IF NOT EXISTS idx_feedback_recommendation_id ON feedback (recommendation_id)",
];

pub async fn ensure_approval_requests(pool: &DbPool) -> Result<(), sqlx::Error> {
    apply(pool, "approval_requests", APPROVAL_REQUESTS_TABLE).await
}

pub async fn ensure_feedback(pool: &DbPool) -> Result<(), sqlx::Error> {
    apply(pool, "feedback", FEEDBACK_TABLE).await
}

pub async fn ensure_all(pool: &DbPool) -> Result<(), sqlx::Error> {
    ensure_approval_requests(pool).await?;
    ensure_feedback(pool).await
}

/// Workflow tables not yet present in the database.
pub async fn missing_tables(pool: &DbPool) -> Result<Vec<&'static str>, sqlx::Error> {
    let present: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name IN ('approval_requests', 'feedback')",
    )
    .fetch_all(pool)
    .await?;

    Ok(MANAGED_TABLES
        .into_iter()
        .filter(|table| !present.iter().any(|name| name == table))
        .collect())
}

async fn apply(pool: &DbPool, table: &str, statements: &[&str]) -> Result<(), sqlx::Error> {
    for statement in statements {
        sqlx::query(*statement).execute(pool).await?;
    }
    debug!(table, "schema ensured");
    Ok(())
}
