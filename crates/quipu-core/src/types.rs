//! # Domain Types
//!
//! Core domain types for the series/correlativo numbering authority.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────┐   │
//! │  │     Series      │   │  SeriesCollection   │   │  DocumentType   │   │
//! │  │  ─────────────  │   │  ─────────────────  │   │  ─────────────  │   │
//! │  │  id (UUID)      │   │  branch_id          │   │  Invoice   (F)  │   │
//! │  │  code "F001"    │   │  buckets:           │   │  Receipt   (B)  │   │
//! │  │  correlativo_*  │   │    doc type →       │   │  CreditNote(FC) │   │
//! │  │  active/default │   │    ordered series   │   │  DebitNote (FD) │   │
//! │  │  version        │   │                     │   │                 │   │
//! │  └─────────────────┘   └─────────────────────┘   └─────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │   SeriesPatch   │   │   Allocation    │                             │
//! │  │  partial update │   │  consumed value │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every series has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - `code`: regulatory label ("F001") - the identity the tax authority sees

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;

use crate::error::{SeriesError, SeriesResult};
use crate::DEFAULT_CORRELATIVO_MAXIMO;

// =============================================================================
// Document Type
// =============================================================================

/// The category of sales document a series numbers.
///
/// Closed enumeration; the regulatory domain names are FACTURA, BOLETA,
/// NOTA_CREDITO and NOTA_DEBITO. Each variant maps to exactly one bucket
/// name (its snake_case token) and to the reserved series-code prefixes the
/// tax authority assigns to that document class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Factura (invoice), series prefix `F`.
    Invoice,
    /// Boleta de venta (receipt), series prefix `B`.
    Receipt,
    /// Nota de crédito (credit note), series prefixes `FC`/`BC`.
    CreditNote,
    /// Nota de débito (debit note), series prefixes `FD`/`BD`.
    DebitNote,
}

impl DocumentType {
    /// All document types, in bucket order.
    pub const ALL: [DocumentType; 4] = [
        DocumentType::Invoice,
        DocumentType::Receipt,
        DocumentType::CreditNote,
        DocumentType::DebitNote,
    ];

    /// The internal bucket name this document type maps to.
    pub const fn bucket_name(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Receipt => "receipt",
            DocumentType::CreditNote => "credit_note",
            DocumentType::DebitNote => "debit_note",
        }
    }

    /// Reserved series-code prefixes for this document type.
    ///
    /// A valid code must start with one of these. Invoices and receipts use
    /// a single reserved letter; credit/debit notes use two-letter prefixes
    /// tied to the document class they amend.
    pub const fn code_prefixes(&self) -> &'static [&'static str] {
        match self {
            DocumentType::Invoice => &["F"],
            DocumentType::Receipt => &["B"],
            DocumentType::CreditNote => &["FC", "BC"],
            DocumentType::DebitNote => &["FD", "BD"],
        }
    }

    /// Canonical code for the bootstrap default series of this type.
    ///
    /// Single-letter prefixes pad with "001"; two-letter prefixes pad with
    /// "01" to keep the regulatory 4-character length.
    pub const fn default_code(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "F001",
            DocumentType::Receipt => "B001",
            DocumentType::CreditNote => "FC01",
            DocumentType::DebitNote => "FD01",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bucket_name())
    }
}

// =============================================================================
// Series
// =============================================================================

/// A numbering lane for one document type within one branch.
///
/// The pair (`branch_id`, `code`) is the regulatory identity (e.g. branch 1,
/// "F001"); `correlativo_actual` is the last number issued on that lane and
/// must never decrease or repeat.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Series {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Branch this series belongs to (external entity, referenced by id).
    pub branch_id: i64,

    /// Document type this series numbers.
    pub document_type: DocumentType,

    /// Regulatory 4-character code ("F001").
    pub code: String,

    /// Optional operator-facing description.
    pub description: Option<String>,

    /// First number ever issued on this series. Immutable after creation.
    pub correlativo_inicial: i64,

    /// Last number issued (or `correlativo_inicial` before any issuance).
    ///
    /// Invariant: `correlativo_actual >= correlativo_inicial`, monotonically
    /// non-decreasing over the series' lifetime.
    pub correlativo_actual: i64,

    /// Upper bound; issuance past it fails with MaxReached, never wraps.
    pub correlativo_maximo: i64,

    /// Inactive series may not receive new allocations.
    pub active: bool,

    /// Used when the caller does not name a series code explicitly.
    /// At most one active series per (branch, document type) carries it.
    pub is_default: bool,

    /// Optimistic-concurrency stamp, incremented on every row mutation.
    pub version: i64,

    /// When the series was created.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// When the series was last updated.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Series {
    /// The value the next successful allocation would return.
    #[inline]
    pub fn next_correlativo(&self) -> i64 {
        self.correlativo_actual + 1
    }

    /// Whether the series has issued its last permitted number.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.correlativo_actual >= self.correlativo_maximo
    }

    /// How many numbers remain before the series is exhausted.
    #[inline]
    pub fn remaining(&self) -> i64 {
        (self.correlativo_maximo - self.correlativo_actual).max(0)
    }
}

// =============================================================================
// Series Collection
// =============================================================================

/// Per-branch view of all configured series, bucketed by document type.
///
/// Assembled from independently addressable series rows; this is a READ
/// model. Mutations go through the repository row by row — the collection is
/// never written back wholesale (that pattern loses concurrent increments).
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct SeriesCollection {
    /// Branch that owns this configuration.
    pub branch_id: i64,

    /// Bucket name order follows [`DocumentType::ALL`]; series within a
    /// bucket keep their creation order.
    pub buckets: BTreeMap<DocumentType, Vec<Series>>,
}

impl SeriesCollection {
    /// Groups a flat list of series rows into buckets.
    pub fn from_rows(branch_id: i64, rows: Vec<Series>) -> Self {
        let mut buckets: BTreeMap<DocumentType, Vec<Series>> = BTreeMap::new();
        for series in rows {
            buckets.entry(series.document_type).or_default().push(series);
        }
        SeriesCollection { branch_id, buckets }
    }

    /// All series of one bucket, in creation order.
    pub fn bucket(&self, document_type: DocumentType) -> &[Series] {
        self.buckets
            .get(&document_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterates every series across all buckets.
    pub fn iter(&self) -> impl Iterator<Item = &Series> {
        self.buckets.values().flatten()
    }

    /// Total number of series across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// True when no bucket holds any series.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a code is already taken within a bucket.
    ///
    /// No two series in the same bucket may share a code.
    pub fn contains_code(&self, document_type: DocumentType, code: &str) -> bool {
        self.bucket(document_type).iter().any(|s| s.code == code)
    }

    /// Finds a series by id across all buckets.
    pub fn find_by_id(&self, series_id: &str) -> Option<&Series> {
        self.iter().find(|s| s.id == series_id)
    }

    /// Finds the ACTIVE series with the given code in a bucket.
    pub fn find_active_by_code(&self, document_type: DocumentType, code: &str) -> Option<&Series> {
        self.bucket(document_type)
            .iter()
            .find(|s| s.active && s.code == code)
    }

    /// Number of active series in a bucket.
    pub fn active_count(&self, document_type: DocumentType) -> usize {
        self.bucket(document_type).iter().filter(|s| s.active).count()
    }

    /// Whether the given series is the only active series of its bucket.
    ///
    /// Deleting or deactivating such a series is rejected: numbering must
    /// never go dark for a document type that still requires it.
    pub fn is_last_active(&self, series: &Series) -> bool {
        series.active && self.active_count(series.document_type) == 1
    }

    /// Resolves the default active series of a bucket.
    ///
    /// Exactly one active series per bucket should carry `is_default`; zero
    /// and several are distinct configuration errors — never an arbitrary
    /// pick.
    pub fn resolve_default(&self, document_type: DocumentType) -> SeriesResult<&Series> {
        let mut defaults = self
            .bucket(document_type)
            .iter()
            .filter(|s| s.active && s.is_default);

        match (defaults.next(), defaults.next()) {
            (Some(series), None) => Ok(series),
            (None, _) => Err(SeriesError::NoDefaultSeries {
                branch_id: self.branch_id,
                document_type,
            }),
            (Some(_), Some(_)) => Err(SeriesError::AmbiguousDefault {
                branch_id: self.branch_id,
                document_type,
                count: self
                    .bucket(document_type)
                    .iter()
                    .filter(|s| s.active && s.is_default)
                    .count(),
            }),
        }
    }
}

// =============================================================================
// Series Patch
// =============================================================================

/// Partial update applied to a series by the registry.
///
/// `correlativo_inicial` is deliberately absent: the first issued number is
/// part of the regulatory identity and immutable after creation.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
pub struct SeriesPatch {
    /// New operator-facing description.
    pub description: Option<String>,

    /// Activate or deactivate the series. Deactivating the last active
    /// series of a bucket is rejected.
    pub active: Option<bool>,

    /// Mark or unmark as the bucket default. Marking clears the flag on the
    /// bucket's other series.
    pub is_default: Option<bool>,

    /// Manual forward correction of the last issued number. Moving it
    /// backwards would resurrect an already issued number and is rejected.
    pub correlativo_actual: Option<i64>,

    /// Adjust the upper bound (the administrative remedy for MaxReached).
    /// Never below the current `correlativo_actual`.
    pub correlativo_maximo: Option<i64>,
}

impl SeriesPatch {
    /// True when the patch carries no change at all.
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.active.is_none()
            && self.is_default.is_none()
            && self.correlativo_actual.is_none()
            && self.correlativo_maximo.is_none()
    }
}

// =============================================================================
// Allocation Results
// =============================================================================

/// Read-only preview of the next correlativo on a series.
///
/// Informational only — NEVER a reservation. Two peeks may observe the same
/// value; only [`Allocation`] consumes one.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct NextCorrelativo {
    /// The resolved series (snapshot at read time).
    pub series: Series,

    /// `correlativo_actual + 1` at read time, not persisted.
    pub next_value: i64,
}

/// A consumed correlativo: the one operation that advances the sequence.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct Allocation {
    /// The series after the increment was persisted.
    pub series: Series,

    /// The value issued to the caller. Unique for all time on this series.
    pub allocated_value: i64,
}

// =============================================================================
// Construction Helpers
// =============================================================================

/// Builds a fresh series entity (not yet persisted).
///
/// New series start with `correlativo_actual = correlativo_inicial`,
/// `active = true` and the default upper bound; the registry decides the
/// `is_default` flag from the bucket's current state.
pub fn new_series(
    id: String,
    branch_id: i64,
    document_type: DocumentType,
    code: String,
    correlativo_inicial: i64,
    description: Option<String>,
    is_default: bool,
    now: DateTime<Utc>,
) -> Series {
    Series {
        id,
        branch_id,
        document_type,
        code,
        description,
        correlativo_inicial,
        correlativo_actual: correlativo_inicial,
        correlativo_maximo: DEFAULT_CORRELATIVO_MAXIMO,
        active: true,
        is_default,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn series(document_type: DocumentType, code: &str, active: bool, is_default: bool) -> Series {
        let mut s = new_series(
            format!("id-{code}"),
            1,
            document_type,
            code.to_string(),
            1,
            None,
            is_default,
            Utc::now(),
        );
        s.active = active;
        s
    }

    #[test]
    fn test_bucket_names_are_distinct() {
        let names: std::collections::BTreeSet<_> =
            DocumentType::ALL.iter().map(|t| t.bucket_name()).collect();
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn test_default_codes_match_prefixes() {
        for dt in DocumentType::ALL {
            let code = dt.default_code();
            assert_eq!(code.len(), 4);
            assert!(dt.code_prefixes().iter().any(|p| code.starts_with(p)));
        }
    }

    #[test]
    fn test_next_correlativo_and_exhaustion() {
        let mut s = series(DocumentType::Invoice, "F001", true, true);
        assert_eq!(s.next_correlativo(), 2);
        assert!(!s.is_exhausted());

        s.correlativo_actual = s.correlativo_maximo;
        assert!(s.is_exhausted());
        assert_eq!(s.remaining(), 0);
    }

    #[test]
    fn test_collection_grouping_and_lookup() {
        let rows = vec![
            series(DocumentType::Invoice, "F001", true, true),
            series(DocumentType::Invoice, "F002", true, false),
            series(DocumentType::Receipt, "B001", true, true),
        ];
        let collection = SeriesCollection::from_rows(1, rows);

        assert_eq!(collection.len(), 3);
        assert_eq!(collection.bucket(DocumentType::Invoice).len(), 2);
        assert!(collection.contains_code(DocumentType::Invoice, "F002"));
        assert!(!collection.contains_code(DocumentType::Receipt, "F002"));
        assert!(collection
            .find_active_by_code(DocumentType::Receipt, "B001")
            .is_some());
        assert!(collection.bucket(DocumentType::CreditNote).is_empty());
    }

    #[test]
    fn test_last_active_detection() {
        let rows = vec![
            series(DocumentType::Invoice, "F001", true, true),
            series(DocumentType::Invoice, "F002", false, false),
        ];
        let collection = SeriesCollection::from_rows(1, rows);

        let only_active = collection
            .find_active_by_code(DocumentType::Invoice, "F001")
            .unwrap();
        assert!(collection.is_last_active(only_active));
    }

    #[test]
    fn test_resolve_default_exactly_one() {
        let rows = vec![
            series(DocumentType::Invoice, "F001", true, true),
            series(DocumentType::Invoice, "F002", true, false),
        ];
        let collection = SeriesCollection::from_rows(1, rows);

        let resolved = collection.resolve_default(DocumentType::Invoice).unwrap();
        assert_eq!(resolved.code, "F001");
    }

    #[test]
    fn test_resolve_default_none() {
        let rows = vec![series(DocumentType::Invoice, "F001", true, false)];
        let collection = SeriesCollection::from_rows(1, rows);

        let err = collection
            .resolve_default(DocumentType::Invoice)
            .unwrap_err();
        assert!(matches!(err, SeriesError::NoDefaultSeries { .. }));
    }

    #[test]
    fn test_resolve_default_ambiguous() {
        let rows = vec![
            series(DocumentType::Invoice, "F001", true, true),
            series(DocumentType::Invoice, "F002", true, true),
        ];
        let collection = SeriesCollection::from_rows(1, rows);

        let err = collection
            .resolve_default(DocumentType::Invoice)
            .unwrap_err();
        assert!(matches!(err, SeriesError::AmbiguousDefault { count: 2, .. }));
    }

    #[test]
    fn test_inactive_default_is_not_resolved() {
        let rows = vec![
            series(DocumentType::Invoice, "F001", false, true),
            series(DocumentType::Invoice, "F002", true, false),
        ];
        let collection = SeriesCollection::from_rows(1, rows);

        let err = collection
            .resolve_default(DocumentType::Invoice)
            .unwrap_err();
        assert!(matches!(err, SeriesError::NoDefaultSeries { .. }));
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(SeriesPatch::default().is_empty());
        let patch = SeriesPatch {
            active: Some(false),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
