use std::collections::BTreeMap;

use tokio::sync::RwLock;

use eduloop_core::domain::approval::{
    ApprovalRequest, ApprovalRequestId, ApprovalStatus, NewApprovalRequest, ReviewDecision,
    TransitionPolicy,
};
use eduloop_core::domain::feedback::{FeedbackId, FeedbackRecord, NewFeedback};

use super::{ApprovalRepository, FeedbackRepository, RepositoryError, TransitionOutcome};

#[derive(Default)]
pub struct InMemoryApprovalRepository {
    requests: RwLock<BTreeMap<i64, ApprovalRequest>>,
}

#[async_trait::async_trait]
impl ApprovalRepository for InMemoryApprovalRepository {
    async fn insert(
        &self,
        request: NewApprovalRequest,
    ) -> Result<ApprovalRequestId, RepositoryError> {
        let mut requests = self.requests.write().await;
        let id = ApprovalRequestId(requests.keys().next_back().copied().unwrap_or(0) + 1);
        requests.insert(
            id.0,
            ApprovalRequest {
                id,
                student_id: request.student_id,
                decision_type: request.decision_type,
                decision_data: request.decision_data,
                status: ApprovalStatus::Pending,
                priority: request.priority,
                created_at: request.created_at,
                reviewed_at: None,
                reviewer_id: None,
                reviewer_comments: None,
            },
        );
        Ok(id)
    }

    async fn find_by_id(
        &self,
        id: ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn list_pending(
        &self,
        priority: Option<&str>,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut pending: Vec<ApprovalRequest> = requests
            .values()
            .filter(|request| request.status == ApprovalStatus::Pending)
            .filter(|request| priority.map_or(true, |wanted| request.priority == wanted))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn apply_review(
        &self,
        id: ApprovalRequestId,
        decision: &ReviewDecision,
        policy: TransitionPolicy,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut requests = self.requests.write().await;
        let Some(request) = requests.get_mut(&id.0) else {
            return Ok(TransitionOutcome::NotFound);
        };

        if let Err(refusal) = policy.check(request.status, decision.action) {
            return Ok(TransitionOutcome::Refused(refusal));
        }

        request.status = decision.action.target_status();
        request.reviewed_at = Some(decision.reviewed_at);
        request.reviewer_id = Some(decision.reviewer_id.clone());
        request.reviewer_comments = Some(decision.comments.clone());
        Ok(TransitionOutcome::Applied(request.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryFeedbackRepository {
    records: RwLock<Vec<FeedbackRecord>>,
}

#[async_trait::async_trait]
impl FeedbackRepository for InMemoryFeedbackRepository {
    async fn insert(&self, feedback: NewFeedback) -> Result<FeedbackRecord, RepositoryError> {
        let mut records = self.records.write().await;
        let record = FeedbackRecord {
            id: FeedbackId(records.len() as i64 + 1),
            student_id: feedback.student_id,
            recommendation_id: feedback.recommendation_id,
            feedback_type: feedback.feedback_type,
            comments: feedback.comments,
            rating: feedback.rating.map(i64::from),
            timestamp: feedback.timestamp,
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn history_for_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError> {
        let records = self.records.read().await;
        let mut history: Vec<FeedbackRecord> =
            records.iter().filter(|record| record.student_id == student_id).cloned().collect();
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(history)
    }

    async fn average_rating(
        &self,
        recommendation_id: &str,
    ) -> Result<Option<f64>, RepositoryError> {
        let records = self.records.read().await;
        let ratings: Vec<i64> = records
            .iter()
            .filter(|record| record.recommendation_id == recommendation_id)
            .filter_map(|record| record.rating)
            .collect();

        if ratings.is_empty() {
            return Ok(None);
        }
        Ok(Some(ratings.iter().sum::<i64>() as f64 / ratings.len() as f64))
    }
}
