use thiserror::Error;

use crate::domain::approval::ApprovalStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid `{field}`: {message}")]
    Validation { field: &'static str, message: String },
    #[error("approval request cannot move from `{from}` to `{to}`")]
    InvalidStatusTransition { from: ApprovalStatus, to: ApprovalStatus },
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { field, message: message.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable, machine-readable name for the failure kind.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::Validation { .. }) => "validation",
            Self::Domain(DomainError::InvalidStatusTransition { .. }) => "invalid_transition",
            Self::NotFound { .. } => "not_found",
            Self::Persistence(_) => "storage",
            Self::Configuration(_) => "config_validation",
        }
    }
}
