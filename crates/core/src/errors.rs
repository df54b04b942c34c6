use thiserror::Error;

use crate::commission::validator::ConfigViolation;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("commission configuration is invalid: {}", render_violations(.0))]
    Validation(Vec<ConfigViolation>),
    #[error("{entity} `{key}` was not found")]
    NotFound { entity: &'static str, key: String },
    #[error("computation failed: {0}")]
    Computation(String),
    #[error("rule `{rule_id}` has a malformed period descriptor: {reason}")]
    MalformedRule { rule_id: String, reason: String },
    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition { entity: &'static str, from: String, to: String },
    #[error("invalid upstream record: {0}")]
    InvalidRecord(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound { entity, key: key.into() }
    }

    pub fn violations(&self) -> &[ConfigViolation] {
        match self {
            Self::Validation(violations) => violations,
            _ => &[],
        }
    }
}

fn render_violations(violations: &[ConfigViolation]) -> String {
    violations.iter().map(|violation| violation.message.as_str()).collect::<Vec<_>>().join("; ")
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable class name used in batch summaries and CLI payloads.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::Validation(_)) => "validation",
            Self::Domain(DomainError::NotFound { .. }) => "not_found",
            Self::Domain(DomainError::Computation(_)) => "computation",
            Self::Domain(DomainError::MalformedRule { .. }) => "malformed_rule",
            Self::Domain(DomainError::InvalidTransition { .. }) => "invalid_transition",
            Self::Domain(DomainError::InvalidRecord(_)) => "invalid_record",
            Self::Persistence(_) => "persistence",
            Self::Configuration(_) => "configuration",
        }
    }
}
