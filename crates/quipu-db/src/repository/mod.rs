//! # Repository Module
//!
//! Persistence operations for the numbering authority.
//!
//! ## Who May Touch What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SeriesRepository          lifecycle: create / update / delete / list  │
//! │  CorrelativoAllocator      the ONLY consumer of numbers                │
//! │  DefaultSeriesInitializer  one-time bootstrap per branch               │
//! │                                                                         │
//! │  All three mutate the same series rows. Structural mutations serialize │
//! │  per branch by touching the branch config row first (write-lock        │
//! │  acquisition); the allocator uses per-row compare-and-swap instead so  │
//! │  unrelated series and branches proceed concurrently.                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod allocator;
pub mod bootstrap;
pub mod series;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use quipu_core::{DocumentType, Series, SeriesError};

/// Column list for SELECTs that map onto [`Series`] via `FromRow`.
pub(crate) const SERIES_COLUMNS: &str = "id, branch_id, document_type, code, description, \
     correlativo_inicial, correlativo_actual, correlativo_maximo, \
     active, is_default, version, created_at, updated_at";

/// Verifies the branch has a configuration row owned by the operator.
///
/// A configuration owned by a different operator is indistinguishable from
/// a missing one; this subsystem performs no role logic beyond ownership.
pub(crate) async fn require_config(
    pool: &SqlitePool,
    branch_id: i64,
    operator_id: &str,
) -> DbResult<()> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM branch_series_configs WHERE branch_id = ?1 AND operator_id = ?2",
    )
    .bind(branch_id)
    .bind(operator_id)
    .fetch_optional(pool)
    .await?;

    if found.is_none() {
        return Err(SeriesError::ConfigNotFound { branch_id }.into());
    }
    Ok(())
}

/// Touches the branch config row inside a transaction.
///
/// The UPDATE acquires SQLite's write lock up front, so every structural
/// mutation (create/update/delete/bootstrap) for one branch serializes here
/// and cannot race a concurrent structural change. Fails with ConfigNotFound
/// when the row is absent or owned by another operator.
pub(crate) async fn touch_config(
    conn: &mut SqliteConnection,
    branch_id: i64,
    operator_id: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE branch_series_configs SET updated_at = ?1 \
         WHERE branch_id = ?2 AND operator_id = ?3",
    )
    .bind(now)
    .bind(branch_id)
    .bind(operator_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(SeriesError::ConfigNotFound { branch_id }.into());
    }
    Ok(())
}

/// Touches the branch config row, creating it if the branch has none yet.
///
/// Used by the paths allowed to start a branch's configuration (create,
/// bootstrap). A row owned by another operator still fails.
pub(crate) async fn ensure_config(
    conn: &mut SqliteConnection,
    branch_id: i64,
    operator_id: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    match touch_config(conn, branch_id, operator_id, now).await {
        Ok(()) => Ok(()),
        Err(missing) => {
            let owner: Option<String> =
                sqlx::query_scalar("SELECT operator_id FROM branch_series_configs WHERE branch_id = ?1")
                    .bind(branch_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            if owner.is_some() {
                // Exists but belongs to someone else.
                return Err(missing);
            }

            sqlx::query(
                "INSERT INTO branch_series_configs (branch_id, operator_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?3)",
            )
            .bind(branch_id)
            .bind(operator_id)
            .bind(now)
            .execute(&mut *conn)
            .await?;

            Ok(())
        }
    }
}

/// Loads one series row by id, scoped to the branch.
pub(crate) async fn fetch_by_id(
    conn: &mut SqliteConnection,
    branch_id: i64,
    series_id: &str,
) -> DbResult<Series> {
    let query = format!(
        "SELECT {SERIES_COLUMNS} FROM series WHERE branch_id = ?1 AND id = ?2"
    );

    sqlx::query_as::<_, Series>(&query)
        .bind(branch_id)
        .bind(series_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            SeriesError::SeriesIdNotFound {
                branch_id,
                series_id: series_id.to_string(),
            }
            .into()
        })
}

/// Inserts a fully built series row.
pub(crate) async fn insert_series(conn: &mut SqliteConnection, series: &Series) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO series (\
             id, branch_id, document_type, code, description, \
             correlativo_inicial, correlativo_actual, correlativo_maximo, \
             active, is_default, version, created_at, updated_at\
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )
    .bind(&series.id)
    .bind(series.branch_id)
    .bind(series.document_type)
    .bind(&series.code)
    .bind(&series.description)
    .bind(series.correlativo_inicial)
    .bind(series.correlativo_actual)
    .bind(series.correlativo_maximo)
    .bind(series.active)
    .bind(series.is_default)
    .bind(series.version)
    .bind(series.created_at)
    .bind(series.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Counts the ACTIVE series of one bucket.
pub(crate) async fn count_active(
    conn: &mut SqliteConnection,
    branch_id: i64,
    document_type: DocumentType,
) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM series \
         WHERE branch_id = ?1 AND document_type = ?2 AND active = 1",
    )
    .bind(branch_id)
    .bind(document_type)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}
