use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::require_non_empty;
use crate::errors::DomainError;

pub const DEFAULT_PRIORITY: &str = "normal";

/// Version written into every new decision payload envelope.
pub const DECISION_SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalRequestId(pub i64);

impl fmt::Display for ApprovalRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ApprovalRequestId {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(DomainError::validation(
                "request_id",
                format!("`{value}` is not a positive integer"),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    NeedsRevision,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::NeedsRevision => "needs_revision",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "needs_revision" => Ok(Self::NeedsRevision),
            other => Err(DomainError::validation(
                "status",
                format!("unknown approval status `{other}`"),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    RequestRevision,
}

impl ReviewAction {
    pub fn target_status(&self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Reject => ApprovalStatus::Rejected,
            Self::RequestRevision => ApprovalStatus::NeedsRevision,
        }
    }
}

/// Decides which status edges a review may take.
///
/// `Permissive` lets any review overwrite the current status and reviewer
/// fields, including on requests that were already reviewed. `PendingOnly`
/// accepts reviews of `pending` requests only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    #[default]
    Permissive,
    PendingOnly,
}

impl TransitionPolicy {
    pub fn check(&self, from: ApprovalStatus, action: ReviewAction) -> Result<(), DomainError> {
        let to = action.target_status();
        match self {
            Self::Permissive => Ok(()),
            Self::PendingOnly if from == ApprovalStatus::Pending => Ok(()),
            Self::PendingOnly => Err(DomainError::InvalidStatusTransition { from, to }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permissive => "permissive",
            Self::PendingOnly => "pending_only",
        }
    }
}

/// Agent decision stored alongside an approval request.
///
/// Persisted as `{"schema_version": N, "data": ...}` so the shape of `data`
/// can evolve. Rows written before the envelope existed decode as version 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionPayload {
    pub schema_version: u32,
    pub data: Value,
}

impl DecisionPayload {
    pub fn new(data: Value) -> Self {
        Self { schema_version: DECISION_SCHEMA_VERSION, data }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        if let Value::Object(map) = &value {
            let version = map.get("schema_version").and_then(Value::as_u64);
            if let (Some(version), Some(data), 2) = (version, map.get("data"), map.len()) {
                if let Ok(schema_version) = u32::try_from(version) {
                    return Ok(Self { schema_version, data: data.clone() });
                }
            }
        }

        Ok(Self { schema_version: 0, data: value })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalRequestId,
    pub student_id: String,
    pub decision_type: String,
    pub decision_data: DecisionPayload,
    pub status: ApprovalStatus,
    pub priority: String,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewer_id: Option<String>,
    pub reviewer_comments: Option<String>,
}

/// A request as submitted, before the store assigns an id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewApprovalRequest {
    pub student_id: String,
    pub decision_type: String,
    pub decision_data: DecisionPayload,
    pub priority: String,
    pub created_at: DateTime<Utc>,
}

impl NewApprovalRequest {
    pub fn new(
        student_id: &str,
        decision_type: &str,
        decision_data: Value,
        priority: &str,
    ) -> Result<Self, DomainError> {
        require_non_empty("student_id", student_id)?;
        require_non_empty("decision_type", decision_type)?;

        Ok(Self {
            student_id: student_id.to_string(),
            decision_type: decision_type.to_string(),
            decision_data: DecisionPayload::new(decision_data),
            priority: priority.to_string(),
            created_at: Utc::now(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewDecision {
    pub action: ReviewAction,
    pub reviewer_id: String,
    pub comments: String,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewDecision {
    pub fn new(action: ReviewAction, reviewer_id: &str, comments: &str) -> Result<Self, DomainError> {
        require_non_empty("reviewer_id", reviewer_id)?;

        Ok(Self {
            action,
            reviewer_id: reviewer_id.to_string(),
            comments: comments.to_string(),
            reviewed_at: Utc::now(),
        })
    }
}
