//! Error types.
//!
//! [`StoreError`] covers the external collaborators (field storage and the
//! key-value cache); these are transient and are never retried here.
//! [`ResolverError`] is what callers of the resolver see.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::field::FieldWithBoard;
use crate::graph::CyclePath;

/// Result type for storage and cache operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for resolver operations.
pub type ResolverResult<T> = Result<T, ResolverError>;

/// Failures of the field store or the key-value cache.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured deadline.
    #[error("store call `{operation}` timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// A cached value could not be decoded.
    #[error("corrupt cache entry `{key}`: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded for the cache.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The key holds a value of the wrong type.
    #[error("wrong value type at key `{0}`")]
    WrongType(String),
}

/// Which kind of record was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Board,
    Base,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Board => f.write_str("board"),
            EntityKind::Base => f.write_str("base"),
        }
    }
}

/// A circular dependency, with the offending fields resolved for display.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// The cycle as found by the sorter.
    pub path: CyclePath,
    /// Field records on the path, with their boards.
    pub fields: Vec<FieldWithBoard>,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A cycle was detected: {}", self.path)
    }
}

/// Failures surfaced by the resolver.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The board or base does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// The field definitions form a circular dependency.
    #[error("{0}")]
    CycleDetected(Box<CycleReport>),

    /// Stored data violates an invariant the resolver relies on.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// The field store or the cache failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResolverError {
    pub(crate) fn board_not_found(id: impl fmt::Display) -> Self {
        ResolverError::NotFound {
            kind: EntityKind::Board,
            id: id.to_string(),
        }
    }

    pub(crate) fn base_not_found(id: impl fmt::Display) -> Self {
        ResolverError::NotFound {
            kind: EntityKind::Base,
            id: id.to_string(),
        }
    }

    /// Whether the caller can fix this by changing its input.
    pub fn is_user_error(&self) -> bool {
        matches!(self, ResolverError::NotFound { .. } | ResolverError::CycleDetected(_))
    }

    /// The cycle report, if this is a cycle failure.
    pub fn cycle(&self) -> Option<&CycleReport> {
        match self {
            ResolverError::CycleDetected(report) => Some(report),
            _ => None,
        }
    }
}
