use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tokio::sync::OnceCell;

use eduloop_core::domain::approval::{
    ApprovalRequest, ApprovalRequestId, ApprovalStatus, DecisionPayload, NewApprovalRequest,
    ReviewDecision, TransitionPolicy,
};

use super::{
    decode_error, format_timestamp, parse_timestamp, ApprovalRepository, RepositoryError,
    TransitionOutcome,
};
use crate::{schema, DbPool};

const FIND_BY_ID_SQL: &str = "SELECT id, student_id, decision_type, decision_data, status, priority,
        created_at, reviewed_at, reviewer_id, reviewer_comments
 FROM approval_requests WHERE id = ?";

pub struct SqlApprovalRepository {
    pool: DbPool,
    schema_ready: OnceCell<()>,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, schema_ready: OnceCell::new() }
    }

    async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        self.schema_ready
            .get_or_try_init(|| schema::ensure_approval_requests(&self.pool))
            .await?;
        Ok(())
    }
}

fn row_to_approval(row: &SqliteRow) -> Result<ApprovalRequest, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let student_id: String = row.try_get("student_id").map_err(decode_error)?;
    let decision_type: String = row.try_get("decision_type").map_err(decode_error)?;
    let decision_text: String = row.try_get("decision_data").map_err(decode_error)?;
    let status_str: String = row.try_get("status").map_err(decode_error)?;
    let priority: String = row.try_get("priority").map_err(decode_error)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode_error)?;
    let reviewed_at_str: Option<String> = row.try_get("reviewed_at").map_err(decode_error)?;
    let reviewer_id: Option<String> = row.try_get("reviewer_id").map_err(decode_error)?;
    let reviewer_comments: Option<String> =
        row.try_get("reviewer_comments").map_err(decode_error)?;

    let decision_data = DecisionPayload::from_text(&decision_text).map_err(|error| {
        RepositoryError::Decode(format!("decision_data of approval request {id}: {error}"))
    })?;
    let status = status_str
        .parse::<ApprovalStatus>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let created_at = parse_timestamp("created_at", &created_at_str)?;
    let reviewed_at =
        reviewed_at_str.map(|raw| parse_timestamp("reviewed_at", &raw)).transpose()?;

    Ok(ApprovalRequest {
        id: ApprovalRequestId(id),
        student_id,
        decision_type,
        decision_data,
        status,
        priority,
        created_at,
        reviewed_at,
        reviewer_id,
        reviewer_comments,
    })
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn insert(
        &self,
        request: NewApprovalRequest,
    ) -> Result<ApprovalRequestId, RepositoryError> {
        self.ensure_schema().await?;
        let decision_text = request
            .decision_data
            .to_text()
            .map_err(|error| RepositoryError::Encode(error.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO approval_requests
                (student_id, decision_type, decision_data, status, priority, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.student_id)
        .bind(&request.decision_type)
        .bind(&decision_text)
        .bind(ApprovalStatus::Pending.as_str())
        .bind(&request.priority)
        .bind(format_timestamp(&request.created_at))
        .execute(&self.pool)
        .await?;

        Ok(ApprovalRequestId(result.last_insert_rowid()))
    }

    async fn find_by_id(
        &self,
        id: ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        self.ensure_schema().await?;
        let row = sqlx::query(FIND_BY_ID_SQL)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_approval).transpose()
    }

    async fn list_pending(
        &self,
        priority: Option<&str>,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        self.ensure_schema().await?;
        let rows: Vec<SqliteRow> = if let Some(priority) = priority {
            sqlx::query(
                "SELECT id, student_id, decision_type, decision_data, status, priority,
                        created_at, reviewed_at, reviewer_id, reviewer_comments
                 FROM approval_requests
                 WHERE status = 'pending' AND priority = ?
                 ORDER BY julianday(created_at) ASC, id ASC",
            )
            .bind(priority)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, student_id, decision_type, decision_data, status, priority,
                        created_at, reviewed_at, reviewer_id, reviewer_comments
                 FROM approval_requests
                 WHERE status = 'pending'
                 ORDER BY julianday(created_at) ASC, id ASC",
            )
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(row_to_approval).collect::<Result<Vec<_>, _>>()
    }

    async fn apply_review(
        &self,
        id: ApprovalRequestId,
        decision: &ReviewDecision,
        policy: TransitionPolicy,
    ) -> Result<TransitionOutcome, RepositoryError> {
        self.ensure_schema().await?;
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM approval_requests WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(current) = current else {
            return Ok(TransitionOutcome::NotFound);
        };
        let current = current
            .parse::<ApprovalStatus>()
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        if let Err(refusal) = policy.check(current, decision.action) {
            return Ok(TransitionOutcome::Refused(refusal));
        }

        sqlx::query(
            "UPDATE approval_requests
             SET status = ?, reviewed_at = ?, reviewer_id = ?, reviewer_comments = ?
             WHERE id = ?",
        )
        .bind(decision.action.target_status().as_str())
        .bind(format_timestamp(&decision.reviewed_at))
        .bind(&decision.reviewer_id)
        .bind(&decision.comments)
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(FIND_BY_ID_SQL)
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await?;
        let updated = row_to_approval(&row)?;
        tx.commit().await?;

        Ok(TransitionOutcome::Applied(updated))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use eduloop_core::domain::approval::{
        ApprovalRequestId, ApprovalStatus, NewApprovalRequest, ReviewAction, ReviewDecision,
        TransitionPolicy,
    };
    use eduloop_core::errors::DomainError;

    use super::SqlApprovalRepository;
    use crate::connect_with_settings;
    use crate::repositories::{ApprovalRepository, TransitionOutcome};

    async fn setup() -> sqlx::SqlitePool {
        connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect")
    }

    fn sample_request(student_id: &str, priority: &str) -> NewApprovalRequest {
        NewApprovalRequest::new(
            student_id,
            "learning_path",
            json!({"topic": "algebra", "weeks": 6}),
            priority,
        )
        .expect("valid request")
    }

    fn review(action: ReviewAction, reviewer: &str, comments: &str) -> ReviewDecision {
        ReviewDecision::new(action, reviewer, comments).expect("valid review")
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids_and_starts_pending() {
        let repo = SqlApprovalRepository::new(setup().await);

        let first = repo.insert(sample_request("S1", "high")).await.expect("insert 1");
        let second = repo.insert(sample_request("S2", "normal")).await.expect("insert 2");
        assert_eq!(first, ApprovalRequestId(1));
        assert_eq!(second, ApprovalRequestId(2));

        let found = repo.find_by_id(first).await.expect("find").expect("should exist");
        assert_eq!(found.status, ApprovalStatus::Pending);
        assert_eq!(found.student_id, "S1");
        assert_eq!(found.priority, "high");
        assert_eq!(found.decision_data.data, json!({"topic": "algebra", "weeks": 6}));
        assert_eq!(found.reviewed_at, None);
        assert_eq!(found.reviewer_id, None);
    }

    #[tokio::test]
    async fn reads_before_any_write_see_an_empty_store() {
        let repo = SqlApprovalRepository::new(setup().await);

        assert!(repo.list_pending(None).await.expect("list").is_empty());
        assert_eq!(repo.find_by_id(ApprovalRequestId(1)).await.expect("find"), None);
    }

    #[tokio::test]
    async fn list_pending_filters_by_status_and_priority_in_fifo_order() {
        let repo = SqlApprovalRepository::new(setup().await);

        let first = repo.insert(sample_request("S1", "high")).await.expect("insert 1");
        let second = repo.insert(sample_request("S2", "normal")).await.expect("insert 2");
        let third = repo.insert(sample_request("S3", "high")).await.expect("insert 3");
        let reviewed = repo.insert(sample_request("S4", "high")).await.expect("insert 4");

        repo.apply_review(
            reviewed,
            &review(ReviewAction::Approve, "R1", ""),
            TransitionPolicy::Permissive,
        )
        .await
        .expect("review");

        let all_pending = repo.list_pending(None).await.expect("list all");
        let ids: Vec<_> = all_pending.iter().map(|request| request.id).collect();
        assert_eq!(ids, vec![first, second, third]);

        let high = repo.list_pending(Some("high")).await.expect("list high");
        let ids: Vec<_> = high.iter().map(|request| request.id).collect();
        assert_eq!(ids, vec![first, third]);
        assert!(high.iter().all(|request| request.priority == "high"));

        assert!(repo.list_pending(Some("HIGH")).await.expect("list exact").is_empty());
    }

    #[tokio::test]
    async fn apply_review_stamps_reviewer_fields() {
        let repo = SqlApprovalRepository::new(setup().await);
        let id = repo.insert(sample_request("S1", "normal")).await.expect("insert");

        let outcome = repo
            .apply_review(
                id,
                &review(ReviewAction::RequestRevision, "R7", "add geometry"),
                TransitionPolicy::Permissive,
            )
            .await
            .expect("review");

        let TransitionOutcome::Applied(updated) = outcome else {
            panic!("review should apply, got {outcome:?}");
        };
        assert_eq!(updated.status, ApprovalStatus::NeedsRevision);
        assert_eq!(updated.reviewer_id.as_deref(), Some("R7"));
        assert_eq!(updated.reviewer_comments.as_deref(), Some("add geometry"));
        assert!(updated.reviewed_at.is_some());
    }

    #[tokio::test]
    async fn apply_review_reports_unknown_ids() {
        let repo = SqlApprovalRepository::new(setup().await);

        let outcome = repo
            .apply_review(
                ApprovalRequestId(99),
                &review(ReviewAction::Approve, "R1", ""),
                TransitionPolicy::Permissive,
            )
            .await
            .expect("review");

        assert_eq!(outcome, TransitionOutcome::NotFound);
    }

    #[tokio::test]
    async fn pending_only_policy_leaves_reviewed_request_untouched() {
        let repo = SqlApprovalRepository::new(setup().await);
        let id = repo.insert(sample_request("S1", "normal")).await.expect("insert");

        repo.apply_review(
            id,
            &review(ReviewAction::Approve, "R1", "fine"),
            TransitionPolicy::PendingOnly,
        )
        .await
        .expect("first review");

        let outcome = repo
            .apply_review(
                id,
                &review(ReviewAction::Reject, "R2", "changed my mind"),
                TransitionPolicy::PendingOnly,
            )
            .await
            .expect("second review");
        assert_eq!(
            outcome,
            TransitionOutcome::Refused(DomainError::InvalidStatusTransition {
                from: ApprovalStatus::Approved,
                to: ApprovalStatus::Rejected,
            })
        );

        let stored = repo.find_by_id(id).await.expect("find").expect("exists");
        assert_eq!(stored.status, ApprovalStatus::Approved);
        assert_eq!(stored.reviewer_id.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn legacy_rows_with_bare_payloads_and_sqlite_timestamps_decode() {
        let pool = setup().await;
        let repo = SqlApprovalRepository::new(pool.clone());
        assert!(repo.list_pending(None).await.expect("create schema").is_empty());

        sqlx::query(
            "INSERT INTO approval_requests (student_id, decision_type, decision_data, priority)
             VALUES ('S9', 'dismissal', '{\"reason\": \"attendance\"}', 'low')",
        )
        .execute(&pool)
        .await
        .expect("insert legacy row");

        let pending = repo.list_pending(Some("low")).await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].decision_data.schema_version, 0);
        assert_eq!(pending[0].decision_data.data, json!({"reason": "attendance"}));
    }

    #[tokio::test]
    async fn pending_queue_orders_mixed_timestamp_layouts_chronologically() {
        let pool = setup().await;
        let repo = SqlApprovalRepository::new(pool.clone());
        assert!(repo.list_pending(None).await.expect("create schema").is_empty());

        sqlx::query(
            "INSERT INTO approval_requests
                (student_id, decision_type, decision_data, priority, created_at)
             VALUES ('LEGACY', 'dismissal', '{}', 'normal', '2026-03-01 23:00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert legacy row");

        let mut early = sample_request("NEW", "normal");
        early.created_at = Utc.with_ymd_and_hms(2026, 3, 1, 1, 0, 0).unwrap();
        repo.insert(early).await.expect("insert");

        let pending = repo.list_pending(None).await.expect("list");
        let students: Vec<_> =
            pending.iter().map(|request| request.student_id.as_str()).collect();
        assert_eq!(students, vec!["NEW", "LEGACY"]);
    }

    #[tokio::test]
    async fn unknown_stored_status_is_a_decode_error() {
        let pool = setup().await;
        let repo = SqlApprovalRepository::new(pool.clone());
        let id = repo.insert(sample_request("S1", "normal")).await.expect("insert");

        sqlx::query("UPDATE approval_requests SET status = 'escalated' WHERE id = ?")
            .bind(id.0)
            .execute(&pool)
            .await
            .expect("corrupt status");

        assert!(repo.find_by_id(id).await.is_err());
    }
}
