//! # Correlativo Allocator
//!
//! The one component permitted to consume a number.
//!
//! ## The Lost-Update Hazard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two cashiers finalize sales in the same branch at the same instant.   │
//! │                                                                         │
//! │  Naive read-compute-write over a shared record:                        │
//! │                                                                         │
//! │    Cashier A: read actual=7 ──► write actual=8 ──► issues 8            │
//! │    Cashier B: read actual=7 ─────► write actual=8 ──► issues 8  ✗✗✗    │
//! │                                                                         │
//! │  The second write clobbers the first increment and the SAME number     │
//! │  goes to two documents — a regulatory violation the tax authority      │
//! │  will reject.                                                          │
//! │                                                                         │
//! │  This allocator instead issues ONE conditional UPDATE per attempt:     │
//! │                                                                         │
//! │    UPDATE series SET correlativo_actual = correlativo_actual + 1,      │
//! │                      version = version + 1                             │
//! │    WHERE id = ? AND active = 1                                         │
//! │      AND correlativo_actual = <value we read>                          │
//! │      AND correlativo_actual < correlativo_maximo                       │
//! │                                                                         │
//! │    Cashier A: CAS(7→8) succeeds ──► issues 8                           │
//! │    Cashier B: CAS(7→8) matches 0 rows ──► re-read ──► CAS(8→9) ──► 9   │
//! │                                                                         │
//! │  No two successful allocations ever return the same value, and no      │
//! │  value is skipped except by an explicitly failed call.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::{require_config, SERIES_COLUMNS};
use quipu_core::{Allocation, DocumentType, NextCorrelativo, Series, SeriesError};

/// How many lost compare-and-swap races one `allocate` call absorbs before
/// reporting [`SeriesError::Stale`] and letting the caller retry.
const MAX_ALLOCATE_RETRIES: u32 = 16;

/// Atomically issues sequential document numbers.
///
/// ## Usage
/// ```rust,ignore
/// let allocator = db.allocator();
///
/// // Peek is informational only, never a reservation
/// let next = allocator.peek_next(1, operator, DocumentType::Invoice, None).await?;
///
/// // Allocate consumes the number
/// let allocation = allocator.allocate(1, operator, DocumentType::Invoice, None).await?;
/// ```
#[derive(Debug, Clone)]
pub struct CorrelativoAllocator {
    pool: SqlitePool,
}

impl CorrelativoAllocator {
    /// Creates a new CorrelativoAllocator.
    pub fn new(pool: SqlitePool) -> Self {
        CorrelativoAllocator { pool }
    }

    /// Resolves the target series for an allocation or peek.
    ///
    /// With a code: the ACTIVE series of that bucket with that code (an
    /// inactive series is indistinguishable from a missing one). Without a
    /// code: the bucket's single active default — zero defaults and several
    /// defaults are distinct configuration errors, never an arbitrary pick.
    async fn resolve(
        &self,
        branch_id: i64,
        document_type: DocumentType,
        code: Option<&str>,
    ) -> DbResult<Series> {
        match code {
            Some(code) => {
                let query = format!(
                    "SELECT {SERIES_COLUMNS} FROM series \
                     WHERE branch_id = ?1 AND document_type = ?2 AND code = ?3 AND active = 1"
                );
                sqlx::query_as::<_, Series>(&query)
                    .bind(branch_id)
                    .bind(document_type)
                    .bind(code)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or_else(|| {
                        SeriesError::SeriesNotFound {
                            branch_id,
                            document_type,
                            code: code.to_string(),
                        }
                        .into()
                    })
            }
            None => {
                let query = format!(
                    "SELECT {SERIES_COLUMNS} FROM series \
                     WHERE branch_id = ?1 AND document_type = ?2 \
                       AND active = 1 AND is_default = 1 \
                     ORDER BY created_at, id"
                );
                let mut defaults: Vec<Series> = sqlx::query_as(&query)
                    .bind(branch_id)
                    .bind(document_type)
                    .fetch_all(&self.pool)
                    .await?;

                match defaults.len() {
                    1 => Ok(defaults.remove(0)),
                    0 => Err(SeriesError::NoDefaultSeries {
                        branch_id,
                        document_type,
                    }
                    .into()),
                    count => Err(SeriesError::AmbiguousDefault {
                        branch_id,
                        document_type,
                        count,
                    }
                    .into()),
                }
            }
        }
    }

    /// Read-only preview of the next number on a series.
    ///
    /// NEVER a reservation: state is not mutated, and two peeks may observe
    /// the same value. Callers that timed out on `allocate` re-check here
    /// before retrying a financial operation downstream.
    pub async fn peek_next(
        &self,
        branch_id: i64,
        operator_id: &str,
        document_type: DocumentType,
        code: Option<&str>,
    ) -> DbResult<NextCorrelativo> {
        require_config(&self.pool, branch_id, operator_id).await?;

        let series = self.resolve(branch_id, document_type, code).await?;
        let next_value = series.next_correlativo();

        Ok(NextCorrelativo { series, next_value })
    }

    /// Atomically consumes the next number on a series.
    ///
    /// ## Concurrency Contract
    /// Each attempt re-reads the row and issues one conditional UPDATE with
    /// the observed `correlativo_actual` as the compare token. A lost race
    /// re-reads and reclassifies (the series may have been deactivated or
    /// exhausted meanwhile) before retrying; after [`MAX_ALLOCATE_RETRIES`]
    /// lost races the call fails with `Stale` and the caller may retry.
    ///
    /// ## Errors
    /// * `MaxReached` - the increment would exceed `correlativo_maximo`;
    ///   raise the bound or open a new series before allocating again
    /// * `SeriesNotFound` / `NoDefaultSeries` / `AmbiguousDefault` - the
    ///   resolution failed (see [`peek_next`](Self::peek_next))
    /// * `Stale` - too many consecutive lost races; safe to retry
    pub async fn allocate(
        &self,
        branch_id: i64,
        operator_id: &str,
        document_type: DocumentType,
        code: Option<&str>,
    ) -> DbResult<Allocation> {
        require_config(&self.pool, branch_id, operator_id).await?;

        let mut attempt = 0;
        loop {
            let series = self.resolve(branch_id, document_type, code).await?;

            if series.is_exhausted() {
                return Err(SeriesError::MaxReached {
                    code: series.code,
                    maximo: series.correlativo_maximo,
                }
                .into());
            }

            let seen = series.correlativo_actual;
            let now = Utc::now();

            let result = sqlx::query(
                "UPDATE series SET \
                     correlativo_actual = correlativo_actual + 1, \
                     version = version + 1, \
                     updated_at = ?1 \
                 WHERE id = ?2 AND active = 1 \
                   AND correlativo_actual = ?3 \
                   AND correlativo_actual < correlativo_maximo",
            )
            .bind(now)
            .bind(&series.id)
            .bind(seen)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                let allocated_value = seen + 1;
                debug!(
                    branch_id,
                    code = %series.code,
                    value = allocated_value,
                    "Correlativo allocated"
                );

                let mut series = series;
                series.correlativo_actual = allocated_value;
                series.version += 1;
                series.updated_at = now;

                return Ok(Allocation {
                    series,
                    allocated_value,
                });
            }

            // Someone else moved the counter (or deactivated the series)
            // between our read and our write; re-read and reclassify.
            attempt += 1;
            if attempt >= MAX_ALLOCATE_RETRIES {
                return Err(SeriesError::Stale { code: series.code }.into());
            }

            debug!(
                branch_id,
                code = %series.code,
                attempt,
                "Allocation lost a compare-and-swap race; retrying"
            );
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use quipu_core::SeriesPatch;
    use uuid::Uuid;

    const OPERATOR: &str = "operator-1";

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let db = test_db().await;
        db.bootstrap()
            .initialize_defaults(1, OPERATOR)
            .await
            .unwrap();

        let allocator = db.allocator();

        // F001 and B001 both start at inicial = actual = 1.
        let invoices = db
            .series()
            .get_by_type(1, OPERATOR, DocumentType::Invoice, true)
            .await
            .unwrap();
        assert_eq!(invoices[0].code, "F001");
        assert_eq!(invoices[0].correlativo_inicial, 1);
        assert_eq!(invoices[0].correlativo_actual, 1);

        // Peek returns 2 without mutating state.
        let peek = allocator
            .peek_next(1, OPERATOR, DocumentType::Invoice, None)
            .await
            .unwrap();
        assert_eq!(peek.next_value, 2);
        assert_eq!(peek.series.code, "F001");

        let again = allocator
            .peek_next(1, OPERATOR, DocumentType::Invoice, None)
            .await
            .unwrap();
        assert_eq!(again.next_value, 2);

        // Allocate consumes 2 and persists actual = 2.
        let first = allocator
            .allocate(1, OPERATOR, DocumentType::Invoice, None)
            .await
            .unwrap();
        assert_eq!(first.allocated_value, 2);
        assert_eq!(first.series.correlativo_actual, 2);

        let second = allocator
            .allocate(1, OPERATOR, DocumentType::Invoice, None)
            .await
            .unwrap();
        assert_eq!(second.allocated_value, 3);

        // The receipt lane is independent.
        let receipt = allocator
            .allocate(1, OPERATOR, DocumentType::Receipt, None)
            .await
            .unwrap();
        assert_eq!(receipt.allocated_value, 2);
        assert_eq!(receipt.series.code, "B001");
    }

    #[tokio::test]
    async fn test_allocate_by_named_code() {
        let db = test_db().await;
        let repo = db.series();

        repo.create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap();
        repo.create(1, OPERATOR, DocumentType::Invoice, "F002", 500, None)
            .await
            .unwrap();

        let allocation = db
            .allocator()
            .allocate(1, OPERATOR, DocumentType::Invoice, Some("F002"))
            .await
            .unwrap();
        assert_eq!(allocation.allocated_value, 501);
        assert_eq!(allocation.series.code, "F002");
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_code_is_not_found() {
        let db = test_db().await;
        let repo = db.series();

        repo.create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap();
        let dormant = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F002", 1, None)
            .await
            .unwrap();
        repo.update(
            1,
            OPERATOR,
            &dormant.id,
            SeriesPatch {
                active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let allocator = db.allocator();

        let err = allocator
            .allocate(1, OPERATOR, DocumentType::Invoice, Some("F999"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::SeriesNotFound { .. })
        ));

        // Inactive series may not receive allocations either.
        let err = allocator
            .allocate(1, OPERATOR, DocumentType::Invoice, Some("F002"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::SeriesNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_no_default_series() {
        let db = test_db().await;
        let repo = db.series();

        let series = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap();
        repo.update(
            1,
            OPERATOR,
            &series.id,
            SeriesPatch {
                is_default: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let err = db
            .allocator()
            .allocate(1, OPERATOR, DocumentType::Invoice, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::NoDefaultSeries { .. })
        ));
    }

    #[tokio::test]
    async fn test_max_reached_never_wraps() {
        let db = test_db().await;
        let repo = db.series();

        let series = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F001", 5, None)
            .await
            .unwrap();
        repo.update(
            1,
            OPERATOR,
            &series.id,
            SeriesPatch {
                correlativo_maximo: Some(6),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let allocator = db.allocator();

        // 6 is the last permitted number.
        let last = allocator
            .allocate(1, OPERATOR, DocumentType::Invoice, None)
            .await
            .unwrap();
        assert_eq!(last.allocated_value, 6);

        let err = allocator
            .allocate(1, OPERATOR, DocumentType::Invoice, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::MaxReached { maximo: 6, .. })
        ));

        // Raising the bound is the administrative remedy.
        repo.update(
            1,
            OPERATOR,
            &series.id,
            SeriesPatch {
                correlativo_maximo: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let resumed = allocator
            .allocate(1, OPERATOR, DocumentType::Invoice, None)
            .await
            .unwrap();
        assert_eq!(resumed.allocated_value, 7);
    }

    #[tokio::test]
    async fn test_peek_requires_configuration() {
        let db = test_db().await;

        let err = db
            .allocator()
            .peek_next(9, OPERATOR, DocumentType::Invoice, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::ConfigNotFound { branch_id: 9 })
        ));
    }

    /// N concurrent allocations on one fresh series must yield exactly
    /// {2, ..., N + 1}: pairwise distinct, consecutive, no gaps.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_allocations_unique_and_gapless() {
        const CALLERS: i64 = 100;

        // In-memory SQLite is single-connection; concurrency needs a real
        // file with WAL enabled.
        let path = std::env::temp_dir().join(format!("quipu-alloc-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        db.bootstrap()
            .initialize_defaults(1, OPERATOR)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..CALLERS {
            let allocator = db.allocator();
            handles.push(tokio::spawn(async move {
                loop {
                    match allocator
                        .allocate(1, OPERATOR, DocumentType::Invoice, None)
                        .await
                    {
                        Ok(allocation) => return allocation.allocated_value,
                        // Stale is the documented "caller must retry" signal.
                        Err(err) if err.is_retryable() => continue,
                        Err(err) => panic!("allocation failed: {err}"),
                    }
                }
            }));
        }

        let mut values = Vec::with_capacity(CALLERS as usize);
        for handle in handles {
            values.push(handle.await.unwrap());
        }
        values.sort_unstable();
        assert_eq!(values, (2..=CALLERS + 1).collect::<Vec<i64>>());

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let mut sidecar = path.clone().into_os_string();
            sidecar.push(suffix);
            let _ = std::fs::remove_file(sidecar);
        }
    }
}
