pub mod config;
pub mod domain;
pub mod errors;

pub use domain::approval::{
    ApprovalRequest, ApprovalRequestId, ApprovalStatus, DecisionPayload, NewApprovalRequest,
    ReviewAction, ReviewDecision, TransitionPolicy, DEFAULT_PRIORITY,
};
pub use domain::feedback::{FeedbackId, FeedbackRecord, FeedbackType, NewFeedback, Rating};
pub use errors::{ApplicationError, DomainError};
