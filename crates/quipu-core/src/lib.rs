//! # quipu-core: Pure Numbering Rules for Quipu
//!
//! This crate is the **heart** of the Quipu numbering authority. Every sale
//! document (factura, boleta, nota de crédito, nota de débito) must carry a
//! monotonically increasing, never-duplicated correlativo within its
//! (branch, document type, series) scope — the tax authority validates that
//! identity, so the rules live here as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Quipu Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │       Sale / invoice creation flow + admin configuration        │   │
//! │  │       (HTTP routing, permissions — external collaborators)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    quipu-db (Database Layer)                    │   │
//! │  │        SeriesRepository, CorrelativoAllocator, Bootstrap        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ quipu-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐     ┌────────────┐     ┌────────────┐          │   │
//! │  │   │   types   │     │ validation │     │   error    │          │   │
//! │  │   │  Series   │     │ code rules │     │ taxonomy   │          │   │
//! │  │   │ DocType   │     │ ranges     │     │            │          │   │
//! │  │   └───────────┘     └────────────┘     └────────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (DocumentType, Series, SeriesCollection, ...)
//! - [`validation`] - Series code and correlativo range rules
//! - [`error`] - Domain error taxonomy
//!
//! ## Example Usage
//!
//! ```rust
//! use quipu_core::types::DocumentType;
//! use quipu_core::validation::is_valid_code;
//!
//! // Invoice series must start with the reserved 'F' prefix
//! assert!(is_valid_code("F001", DocumentType::Invoice));
//! assert!(!is_valid_code("ZZZZ", DocumentType::Invoice));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use quipu_core::Series` instead of
// `use quipu_core::types::Series`

pub use error::{SeriesError, SeriesResult};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Required length of a series code (e.g. "F001").
///
/// The tax authority validates series codes as exactly four upper-case
/// alphanumeric characters; longer or shorter labels are rejected outright.
pub const SERIES_CODE_LEN: usize = 4;

/// Smallest correlativo a series may start at or issue.
pub const MIN_CORRELATIVO: i64 = 1;

/// Largest correlativo representable on a regulated document (8 digits).
///
/// Both `correlativo_inicial` and any manually corrected
/// `correlativo_actual` must stay within `[MIN_CORRELATIVO, MAX_CORRELATIVO]`.
pub const MAX_CORRELATIVO: i64 = 99_999_999;

/// Default upper bound for newly created series.
///
/// Issuance past a series' `correlativo_maximo` fails and never wraps; the
/// administrative remedy is raising the bound or opening a new series.
pub const DEFAULT_CORRELATIVO_MAXIMO: i64 = MAX_CORRELATIVO;
