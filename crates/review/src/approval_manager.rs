use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use eduloop_core::domain::approval::{
    ApprovalRequest, ApprovalRequestId, NewApprovalRequest, ReviewAction, ReviewDecision,
    TransitionPolicy, DEFAULT_PRIORITY,
};
use eduloop_core::errors::ApplicationError;
use eduloop_db::{ApprovalRepository, DbPool, SqlApprovalRepository, TransitionOutcome};

use crate::persistence;

const ENTITY: &str = "approval request";

/// Queue of automated decisions awaiting a human verdict.
pub struct ApprovalManager {
    repository: Arc<dyn ApprovalRepository>,
    policy: TransitionPolicy,
}

impl ApprovalManager {
    pub fn new(repository: Arc<dyn ApprovalRepository>, policy: TransitionPolicy) -> Self {
        Self { repository, policy }
    }

    pub fn sqlite(pool: DbPool, policy: TransitionPolicy) -> Self {
        Self::new(Arc::new(SqlApprovalRepository::new(pool)), policy)
    }

    /// Queues a decision for review. `priority` falls back to `"normal"`.
    pub async fn create_approval_request(
        &self,
        subject_id: &str,
        decision_type: &str,
        decision_data: Value,
        priority: Option<&str>,
    ) -> Result<ApprovalRequestId, ApplicationError> {
        let priority = priority.unwrap_or(DEFAULT_PRIORITY);
        let request =
            NewApprovalRequest::new(subject_id, decision_type, decision_data, priority)
                .map_err(|domain| {
                    warn!(
                        event_name = "approval.create.rejected",
                        student_id = subject_id,
                        error = %domain,
                        "approval request failed validation"
                    );
                    ApplicationError::from(domain)
                })?;

        let id = self.repository.insert(request).await.map_err(|repository| {
            error!(
                event_name = "approval.create.failed",
                student_id = subject_id,
                error = %repository,
                "failed to store approval request"
            );
            persistence(repository)
        })?;

        info!(
            event_name = "approval.created",
            request_id = %id,
            student_id = subject_id,
            decision_type,
            priority,
            "approval request queued"
        );
        Ok(id)
    }

    pub async fn approve_request(
        &self,
        id: ApprovalRequestId,
        reviewer_id: &str,
        comments: &str,
    ) -> Result<ApprovalRequest, ApplicationError> {
        self.transition(id, ReviewAction::Approve, reviewer_id, comments).await
    }

    pub async fn reject_request(
        &self,
        id: ApprovalRequestId,
        reviewer_id: &str,
        comments: &str,
    ) -> Result<ApprovalRequest, ApplicationError> {
        self.transition(id, ReviewAction::Reject, reviewer_id, comments).await
    }

    pub async fn request_revision(
        &self,
        id: ApprovalRequestId,
        reviewer_id: &str,
        comments: &str,
    ) -> Result<ApprovalRequest, ApplicationError> {
        self.transition(id, ReviewAction::RequestRevision, reviewer_id, comments).await
    }

    /// Pending requests in arrival order, optionally for one exact priority.
    pub async fn get_pending_requests(
        &self,
        priority: Option<&str>,
    ) -> Result<Vec<ApprovalRequest>, ApplicationError> {
        self.repository.list_pending(priority).await.map_err(|repository| {
            error!(
                event_name = "approval.pending.failed",
                priority = priority.unwrap_or("*"),
                error = %repository,
                "failed to list pending approval requests"
            );
            persistence(repository)
        })
    }

    pub async fn get_request_status(
        &self,
        id: ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, ApplicationError> {
        self.repository.find_by_id(id).await.map_err(|repository| {
            error!(
                event_name = "approval.status.failed",
                request_id = %id,
                error = %repository,
                "failed to load approval request"
            );
            persistence(repository)
        })
    }

    async fn transition(
        &self,
        id: ApprovalRequestId,
        action: ReviewAction,
        reviewer_id: &str,
        comments: &str,
    ) -> Result<ApprovalRequest, ApplicationError> {
        let target = action.target_status();
        let decision = ReviewDecision::new(action, reviewer_id, comments).map_err(|domain| {
            warn!(
                event_name = "approval.review.rejected",
                request_id = %id,
                status = %target,
                error = %domain,
                "review failed validation"
            );
            ApplicationError::from(domain)
        })?;

        let outcome =
            self.repository.apply_review(id, &decision, self.policy).await.map_err(|repository| {
                error!(
                    event_name = "approval.review.failed",
                    request_id = %id,
                    status = %target,
                    error = %repository,
                    "failed to store review"
                );
                persistence(repository)
            })?;

        match outcome {
            TransitionOutcome::Applied(updated) => {
                info!(
                    event_name = "approval.reviewed",
                    request_id = %id,
                    status = %updated.status,
                    reviewer_id,
                    "approval request reviewed"
                );
                Ok(updated)
            }
            TransitionOutcome::NotFound => {
                warn!(
                    event_name = "approval.review.not_found",
                    request_id = %id,
                    status = %target,
                    "review targeted an unknown approval request"
                );
                Err(ApplicationError::NotFound { entity: ENTITY, id: id.to_string() })
            }
            TransitionOutcome::Refused(refusal) => {
                warn!(
                    event_name = "approval.review.refused",
                    request_id = %id,
                    policy = self.policy.as_str(),
                    error = %refusal,
                    "review refused by transition policy"
                );
                Err(ApplicationError::from(refusal))
            }
        }
    }
}
