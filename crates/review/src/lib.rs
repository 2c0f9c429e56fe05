//! Human review of automated decisions.
//!
//! [`ApprovalManager`] queues decisions for a reviewer and records the
//! verdict; [`FeedbackHandler`] stores ratings left on recommendations.

pub mod approval_manager;
pub mod feedback_handler;

pub use approval_manager::ApprovalManager;
pub use feedback_handler::FeedbackHandler;

use eduloop_core::errors::ApplicationError;
use eduloop_db::RepositoryError;

pub(crate) fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
