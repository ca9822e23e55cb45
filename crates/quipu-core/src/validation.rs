//! # Validation Module
//!
//! Pure format rules for series codes and correlativo ranges.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Admin frontend (TypeScript)                                  │
//! │  └── Basic format checks, immediate user feedback                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (pure, side-effect free)                         │
//! │  ├── 4-character upper-case alphanumeric codes                         │
//! │  ├── Reserved prefix per document type                                 │
//! │  └── Correlativo range [1, 99_999_999]                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE(branch_id, code)                                           │
//! │  └── CHECK constraints on correlativo columns                          │
//! │                                                                         │
//! │  Defense in depth: this module never touches storage                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use quipu_core::types::DocumentType;
//! use quipu_core::validation::{is_valid_code, validate_code};
//!
//! assert!(is_valid_code("F001", DocumentType::Invoice));
//! assert!(validate_code("B001", DocumentType::Invoice).is_err());
//! ```

use crate::error::{SeriesError, SeriesResult};
use crate::types::DocumentType;
use crate::{MAX_CORRELATIVO, MIN_CORRELATIVO, SERIES_CODE_LEN};

// =============================================================================
// Series Code Validators
// =============================================================================

/// Generic format rule: exactly 4 upper-case ASCII alphanumeric characters.
///
/// This is the fallback rule applied when no document-type prefix applies;
/// [`validate_code`] layers the reserved-prefix check on top.
pub fn is_well_formed(code: &str) -> bool {
    code.len() == SERIES_CODE_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Validates a series code against the rules of a document type.
///
/// ## Rules
/// - exactly 4 characters, upper-case ASCII letters and digits only
/// - must start with a reserved prefix: invoices `F`, receipts `B`,
///   credit notes `FC`/`BC`, debit notes `FD`/`BD`
///
/// ## Example
/// ```rust
/// use quipu_core::types::DocumentType;
/// use quipu_core::validation::validate_code;
///
/// assert!(validate_code("F001", DocumentType::Invoice).is_ok());
/// assert!(validate_code("FC01", DocumentType::CreditNote).is_ok());
/// assert!(validate_code("ZZZZ", DocumentType::Invoice).is_err());
/// assert!(validate_code("f001", DocumentType::Invoice).is_err());
/// ```
pub fn validate_code(code: &str, document_type: DocumentType) -> SeriesResult<()> {
    if code.len() != SERIES_CODE_LEN {
        return Err(invalid(
            code,
            document_type,
            format!("must be exactly {SERIES_CODE_LEN} characters"),
        ));
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(invalid(
            code,
            document_type,
            "must contain only upper-case letters and digits".to_string(),
        ));
    }

    let prefixes = document_type.code_prefixes();
    if !prefixes.iter().any(|p| code.starts_with(p)) {
        return Err(invalid(
            code,
            document_type,
            format!("must start with {}", prefixes.join(" or ")),
        ));
    }

    Ok(())
}

/// Boolean convenience wrapper over [`validate_code`].
pub fn is_valid_code(code: &str, document_type: DocumentType) -> bool {
    validate_code(code, document_type).is_ok()
}

fn invalid(code: &str, document_type: DocumentType, reason: String) -> SeriesError {
    SeriesError::InvalidCode {
        code: code.to_string(),
        document_type,
        reason,
    }
}

// =============================================================================
// Correlativo Validators
// =============================================================================

/// Validates the first number a new series will issue.
///
/// ## Rules
/// - must lie in `[1, 99_999_999]` (8-digit regulatory numbering)
pub fn validate_correlativo_inicial(value: i64) -> SeriesResult<()> {
    validate_correlativo("correlativo_inicial", value)
}

/// Validates a manually corrected `correlativo_actual` value.
///
/// The forward-only rule (no rewind past an issued number) is checked by the
/// registry against stored state; this only covers the static range.
pub fn validate_correlativo_actual(value: i64) -> SeriesResult<()> {
    validate_correlativo("correlativo_actual", value)
}

/// Validates a series upper bound.
pub fn validate_correlativo_maximo(value: i64) -> SeriesResult<()> {
    validate_correlativo("correlativo_maximo", value)
}

fn validate_correlativo(field: &'static str, value: i64) -> SeriesResult<()> {
    if !(MIN_CORRELATIVO..=MAX_CORRELATIVO).contains(&value) {
        return Err(SeriesError::CorrelativoOutOfRange {
            field,
            value,
            min: MIN_CORRELATIVO,
            max: MAX_CORRELATIVO,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
