//! Domain error model.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic failures of domain logic.
///
/// Record-level data problems are not errors here: the detector turns them
/// into exceptions and the run carries on. `DomainError` is for inputs that
/// cannot be represented at all (a malformed GSTIN, a rate off the slab list)
/// and for commands an entity refuses. Port failures live with their ports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Unparseable id (run/exception/request uuid, empty transaction id).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The command collides with state that already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A status change outside the entity's transition table.
    #[error("illegal {entity} transition: {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn illegal_transition(
        entity: &'static str,
        from: impl core::fmt::Debug,
        to: impl core::fmt::Debug,
    ) -> Self {
        Self::IllegalTransition {
            entity,
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        }
    }
}
