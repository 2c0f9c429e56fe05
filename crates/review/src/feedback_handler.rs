use std::sync::Arc;

use tracing::{error, info, warn};

use eduloop_core::domain::feedback::{FeedbackRecord, NewFeedback};
use eduloop_core::errors::ApplicationError;
use eduloop_db::{DbPool, FeedbackRepository, SqlFeedbackRepository};

use crate::persistence;

pub struct FeedbackHandler {
    repository: Arc<dyn FeedbackRepository>,
}

impl FeedbackHandler {
    pub fn new(repository: Arc<dyn FeedbackRepository>) -> Self {
        Self { repository }
    }

    pub fn sqlite(pool: DbPool) -> Self {
        Self::new(Arc::new(SqlFeedbackRepository::new(pool)))
    }

    /// Stores feedback after checking the type and rating; nothing is
    /// written when either is invalid.
    pub async fn submit_feedback(
        &self,
        subject_id: &str,
        recommendation_id: &str,
        feedback_type: &str,
        comments: &str,
        rating: Option<i64>,
    ) -> Result<FeedbackRecord, ApplicationError> {
        let feedback =
            NewFeedback::new(subject_id, recommendation_id, feedback_type, comments, rating)
                .map_err(|domain| {
                    warn!(
                        event_name = "feedback.submit.rejected",
                        student_id = subject_id,
                        recommendation_id,
                        error = %domain,
                        "feedback failed validation"
                    );
                    ApplicationError::from(domain)
                })?;

        let record = self.repository.insert(feedback).await.map_err(|repository| {
            error!(
                event_name = "feedback.submit.failed",
                student_id = subject_id,
                recommendation_id,
                error = %repository,
                "failed to store feedback"
            );
            persistence(repository)
        })?;

        info!(
            event_name = "feedback.recorded",
            feedback_id = record.id.0,
            student_id = subject_id,
            recommendation_id,
            feedback_type = record.feedback_type.as_str(),
            "feedback recorded"
        );
        Ok(record)
    }

    pub async fn get_feedback_history(
        &self,
        subject_id: &str,
    ) -> Result<Vec<FeedbackRecord>, ApplicationError> {
        self.repository.history_for_student(subject_id).await.map_err(|repository| {
            error!(
                event_name = "feedback.history.failed",
                student_id = subject_id,
                error = %repository,
                "failed to load feedback history"
            );
            persistence(repository)
        })
    }

    /// `Ok(None)` means no rated feedback exists yet.
    pub async fn get_average_rating(
        &self,
        recommendation_id: &str,
    ) -> Result<Option<f64>, ApplicationError> {
        self.repository.average_rating(recommendation_id).await.map_err(|repository| {
            error!(
                event_name = "feedback.average.failed",
                recommendation_id,
                error = %repository,
                "failed to compute average rating"
            );
            persistence(repository)
        })
    }
}
