pub mod connection;
pub mod repositories;
pub mod schema;

pub use connection::{connect_with_settings, DbPool};
pub use repositories::{
    ApprovalRepository, FeedbackRepository, InMemoryApprovalRepository,
    InMemoryFeedbackRepository, RepositoryError, SqlApprovalRepository, SqlFeedbackRepository,
    TransitionOutcome,
};
