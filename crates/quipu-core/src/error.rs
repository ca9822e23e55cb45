//! # Error Types
//!
//! Domain error taxonomy for the numbering authority.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  quipu-core errors (this file)                                         │
//! │  └── SeriesError      - Numbering rule violations                      │
//! │                                                                         │
//! │  quipu-db errors (separate crate)                                      │
//! │  └── DbError          - Wraps SeriesError + infrastructure failures    │
//! │                                                                         │
//! │  Flow: SeriesError → DbError → calling flow decides:                   │
//! │        retry (Stale) / fix configuration (Conflict, MaxReached) /      │
//! │        reject input (InvalidCode, OutOfRange, Rewind)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (branch, code, offending value)
//! 3. Errors are enum variants, never String
//! 4. No error here is fatal to the process; each is scoped to one request

use thiserror::Error;

use crate::types::DocumentType;

// =============================================================================
// Series Error
// =============================================================================

/// Numbering rule violations.
///
/// Everything the registry, allocator and bootstrap can reject. The calling
/// flow matches on the variant to decide between retrying, surfacing a
/// configuration problem, or rejecting bad input.
#[derive(Debug, Error)]
pub enum SeriesError {
    /// The branch has no series configuration at all.
    #[error("branch {branch_id} has no series configuration")]
    ConfigNotFound { branch_id: i64 },

    /// No ACTIVE series with the named code exists in the bucket.
    ///
    /// An inactive series is deliberately indistinguishable from a missing
    /// one here: it may not receive allocations either way.
    #[error("no active series '{code}' for {document_type} in branch {branch_id}")]
    SeriesNotFound {
        branch_id: i64,
        document_type: DocumentType,
        code: String,
    },

    /// No series row with the given id exists in the branch.
    #[error("series {series_id} not found in branch {branch_id}")]
    SeriesIdNotFound { branch_id: i64, series_id: String },

    /// The caller omitted the code and no active series carries the
    /// default flag for that bucket.
    #[error("no default active series for {document_type} in branch {branch_id}")]
    NoDefaultSeries {
        branch_id: i64,
        document_type: DocumentType,
    },

    /// Several active series carry the default flag — a configuration
    /// error surfaced instead of an arbitrary pick.
    #[error(
        "{count} active default series for {document_type} in branch {branch_id}; exactly one expected"
    )]
    AmbiguousDefault {
        branch_id: i64,
        document_type: DocumentType,
        count: usize,
    },

    /// The code fails the format rules for its document type.
    #[error("invalid series code '{code}' for {document_type}: {reason}")]
    InvalidCode {
        code: String,
        document_type: DocumentType,
        reason: String,
    },

    /// Another series in the same bucket already uses the code.
    #[error("series code '{code}' already exists for {document_type}")]
    DuplicateCode {
        code: String,
        document_type: DocumentType,
    },

    /// Deleting or deactivating this series would leave its bucket with no
    /// active series.
    #[error("series '{code}' is the last active series for {document_type}")]
    LastActiveSeries {
        code: String,
        document_type: DocumentType,
    },

    /// Bootstrap attempted on a branch that already has series configured.
    #[error("branch {branch_id} already has series configured")]
    AlreadyInitialized { branch_id: i64 },

    /// A correlativo value falls outside its permitted range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    CorrelativoOutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Manual correction attempted to move `correlativo_actual` backwards,
    /// which would resurrect an already issued number.
    #[error(
        "correlativo of series '{code}' may only move forward: current {current}, requested {requested}"
    )]
    CorrelativoRewind {
        code: String,
        current: i64,
        requested: i64,
    },

    /// Allocation would exceed `correlativo_maximo`. Requires administrative
    /// intervention (raise the bound or open a new series) before any
    /// further allocation on this series.
    #[error("series '{code}' reached its maximum correlativo {maximo}")]
    MaxReached { code: String, maximo: i64 },

    /// The allocation lost its compare-and-swap race too many times in a
    /// row. The caller may safely retry the whole operation.
    #[error("allocation on series '{code}' lost a concurrent update race; retry")]
    Stale { code: String },
}

impl SeriesError {
    /// Whether the caller should simply retry the same operation.
    ///
    /// Only concurrency losses are retryable; everything else needs either
    /// different input or an administrative fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SeriesError::Stale { .. })
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with SeriesError.
pub type SeriesResult<T> = Result<T, SeriesError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SeriesError::CorrelativoRewind {
            code: "F001".to_string(),
            current: 10,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "correlativo of series 'F001' may only move forward: current 10, requested 5"
        );

        let err = SeriesError::MaxReached {
            code: "B001".to_string(),
            maximo: 99_999_999,
        };
        assert_eq!(
            err.to_string(),
            "series 'B001' reached its maximum correlativo 99999999"
        );
    }

    #[test]
    fn test_only_stale_is_retryable() {
        assert!(SeriesError::Stale {
            code: "F001".to_string()
        }
        .is_retryable());

        assert!(!SeriesError::ConfigNotFound { branch_id: 1 }.is_retryable());
        assert!(!SeriesError::MaxReached {
            code: "F001".to_string(),
            maximo: 10
        }
        .is_retryable());
    }
}
