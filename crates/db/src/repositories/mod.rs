use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;

use eduloop_core::domain::approval::{
    ApprovalRequest, ApprovalRequestId, NewApprovalRequest, ReviewDecision, TransitionPolicy,
};
use eduloop_core::domain::feedback::{FeedbackRecord, NewFeedback};
use eduloop_core::errors::DomainError;

pub mod approval;
pub mod feedback;
pub mod memory;

pub use approval::SqlApprovalRepository;
pub use feedback::SqlFeedbackRepository;
pub use memory::{InMemoryApprovalRepository, InMemoryFeedbackRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

/// Result of applying a review to a stored request.
#[derive(Clone, Debug, PartialEq)]
pub enum TransitionOutcome {
    Applied(ApprovalRequest),
    NotFound,
    Refused(DomainError),
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn insert(&self, request: NewApprovalRequest)
        -> Result<ApprovalRequestId, RepositoryError>;

    async fn find_by_id(
        &self,
        id: ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError>;

    /// Pending requests, oldest first, optionally restricted to one priority.
    async fn list_pending(
        &self,
        priority: Option<&str>,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError>;

    /// Checks `policy` against the current status and writes the review as a
    /// single unit; a refused or unknown request is left untouched.
    async fn apply_review(
        &self,
        id: ApprovalRequestId,
        decision: &ReviewDecision,
        policy: TransitionPolicy,
    ) -> Result<TransitionOutcome, RepositoryError>;
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    async fn insert(&self, feedback: NewFeedback) -> Result<FeedbackRecord, RepositoryError>;

    /// Feedback left for a student, newest first.
    async fn history_for_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError>;

    /// Mean of the non-null ratings for a recommendation, `None` when unrated.
    async fn average_rating(&self, recommendation_id: &str)
        -> Result<Option<f64>, RepositoryError>;
}

pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` layout.
pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|error| RepositoryError::Decode(format!("{column} `{raw}`: {error}")))
}

pub(crate) fn decode_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
