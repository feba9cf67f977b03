//! Bonus domain errors
//!
//! Configuration and lookup errors are raised per definition and absorbed by
//! the calculator; persistence errors abort the whole visit.

use core_kernel::{PortError, TemporalError, VisitId};
use thiserror::Error;

/// Errors that can occur in the bonus domain
#[derive(Debug, Error)]
pub enum BonusError {
    /// The stored pattern kind is not one the engine knows
    #[error("Unknown pattern kind: {0}")]
    UnknownPattern(String),

    /// A pattern configuration could not be interpreted
    #[error("Invalid configuration for pattern {kind}: {message}")]
    InvalidPatternConfig {
        kind: String,
        message: String,
    },

    /// The assembled context violates an invariant
    #[error("Invalid calculation context: {0}")]
    InvalidContext(String),

    /// The visit exists but is not in a calculable state
    #[error("Visit {visit_id} cannot be calculated: {reason}")]
    NotCalculable {
        visit_id: VisitId,
        reason: String,
    },

    /// A read-side collaborator failed
    #[error("Lookup failed: {0}")]
    Lookup(#[source] PortError),

    /// The history store failed while writing
    #[error("Persistence failed: {0}")]
    Persistence(#[source] PortError),

    /// Date arithmetic left the supported range
    #[error("Temporal error: {0}")]
    Temporal(#[from] TemporalError),
}

impl BonusError {
    /// Creates an invalid pattern configuration error
    pub fn invalid_config(kind: impl Into<String>, message: impl Into<String>) -> Self {
        BonusError::InvalidPatternConfig {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid context error
    pub fn invalid_context(message: impl Into<String>) -> Self {
        BonusError::InvalidContext(message.into())
    }

    /// Returns true for errors caused by rule content rather than data access
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BonusError::UnknownPattern(_) | BonusError::InvalidPatternConfig { .. }
        )
    }

    /// Returns true if a collaborator reported a missing entity
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BonusError::Lookup(e) | BonusError::Persistence(e) if e.is_not_found()
        )
    }
}
