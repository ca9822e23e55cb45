//! # Series Repository
//!
//! Registry and store for series rows: lifecycle rules (create / update /
//! deactivate / delete) on top of row-level persistence.
//!
//! ## Lifecycle Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Series Lifecycle                                  │
//! │                                                                         │
//! │  CREATE                                                                 │
//! │    ├── code must pass the format rules for its document type           │
//! │    ├── code must be unique within its bucket                           │
//! │    ├── correlativo_inicial in [1, 99_999_999], immutable afterwards    │
//! │    └── becomes the bucket default iff no default exists yet            │
//! │                                                                         │
//! │  UPDATE                                                                 │
//! │    ├── correlativo_actual: forward only (never resurrect a number)     │
//! │    ├── correlativo_maximo: adjustable, never below correlativo_actual  │
//! │    ├── active=false rejected on the bucket's last active series        │
//! │    └── is_default=true clears the flag on bucket siblings              │
//! │                                                                         │
//! │  DELETE                                                                 │
//! │    └── rejected if it would leave the bucket with no active series     │
//! │                                                                         │
//! │  All mutations run in a transaction that touches the branch config     │
//! │  row FIRST, so structural changes for one branch serialize and a       │
//! │  delete can never race a concurrent create.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::{
    count_active, ensure_config, fetch_by_id, insert_series, require_config, touch_config,
    SERIES_COLUMNS,
};
use quipu_core::validation::{
    validate_code, validate_correlativo_actual, validate_correlativo_inicial,
    validate_correlativo_maximo,
};
use quipu_core::{
    new_series, DocumentType, Series, SeriesCollection, SeriesError, SeriesPatch, MAX_CORRELATIVO,
};

/// Repository for series lifecycle operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.series();
///
/// let series = repo
///     .create(branch_id, operator, DocumentType::Invoice, "F002", 1, None)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct SeriesRepository {
    pool: SqlitePool,
}

impl SeriesRepository {
    /// Creates a new SeriesRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SeriesRepository { pool }
    }

    /// Loads the branch's full configuration as a bucketed collection.
    ///
    /// Read model only; mutations always go row by row through the methods
    /// below.
    pub async fn load_collection(
        &self,
        branch_id: i64,
        operator_id: &str,
    ) -> DbResult<SeriesCollection> {
        require_config(&self.pool, branch_id, operator_id).await?;

        let query = format!(
            "SELECT {SERIES_COLUMNS} FROM series \
             WHERE branch_id = ?1 \
             ORDER BY document_type, created_at, id"
        );
        let rows: Vec<Series> = sqlx::query_as(&query)
            .bind(branch_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(SeriesCollection::from_rows(branch_id, rows))
    }

    /// Lists all series of a branch, optionally filtered to one bucket.
    ///
    /// A branch with no configuration yields ConfigNotFound.
    pub async fn list(
        &self,
        branch_id: i64,
        operator_id: &str,
        document_type: Option<DocumentType>,
    ) -> DbResult<Vec<Series>> {
        require_config(&self.pool, branch_id, operator_id).await?;

        let rows = match document_type {
            Some(dt) => {
                let query = format!(
                    "SELECT {SERIES_COLUMNS} FROM series \
                     WHERE branch_id = ?1 AND document_type = ?2 \
                     ORDER BY created_at, id"
                );
                sqlx::query_as(&query)
                    .bind(branch_id)
                    .bind(dt)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let query = format!(
                    "SELECT {SERIES_COLUMNS} FROM series \
                     WHERE branch_id = ?1 \
                     ORDER BY document_type, created_at, id"
                );
                sqlx::query_as(&query)
                    .bind(branch_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows)
    }

    /// All series of one bucket, optionally restricted to active ones.
    pub async fn get_by_type(
        &self,
        branch_id: i64,
        operator_id: &str,
        document_type: DocumentType,
        active_only: bool,
    ) -> DbResult<Vec<Series>> {
        require_config(&self.pool, branch_id, operator_id).await?;

        let query = if active_only {
            format!(
                "SELECT {SERIES_COLUMNS} FROM series \
                 WHERE branch_id = ?1 AND document_type = ?2 AND active = 1 \
                 ORDER BY created_at, id"
            )
        } else {
            format!(
                "SELECT {SERIES_COLUMNS} FROM series \
                 WHERE branch_id = ?1 AND document_type = ?2 \
                 ORDER BY created_at, id"
            )
        };

        let rows: Vec<Series> = sqlx::query_as(&query)
            .bind(branch_id)
            .bind(document_type)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Fetches one series by id.
    pub async fn get_by_id(
        &self,
        branch_id: i64,
        operator_id: &str,
        series_id: &str,
    ) -> DbResult<Series> {
        require_config(&self.pool, branch_id, operator_id).await?;

        let mut conn = self.pool.acquire().await?;
        fetch_by_id(&mut conn, branch_id, series_id).await
    }

    /// Creates a new series in a bucket.
    ///
    /// The new series starts issuing at `correlativo_inicial`
    /// (`correlativo_actual` is set equal to it), active, with the default
    /// upper bound. It becomes the bucket default iff the bucket has no
    /// default yet. Creates the branch configuration row when the branch
    /// has none.
    pub async fn create(
        &self,
        branch_id: i64,
        operator_id: &str,
        document_type: DocumentType,
        code: &str,
        correlativo_inicial: i64,
        description: Option<String>,
    ) -> DbResult<Series> {
        validate_code(code, document_type)?;
        validate_correlativo_inicial(correlativo_inicial)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        ensure_config(&mut tx, branch_id, operator_id, now).await?;

        let duplicates: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM series \
             WHERE branch_id = ?1 AND document_type = ?2 AND code = ?3",
        )
        .bind(branch_id)
        .bind(document_type)
        .bind(code)
        .fetch_one(&mut *tx)
        .await?;

        if duplicates > 0 {
            return Err(SeriesError::DuplicateCode {
                code: code.to_string(),
                document_type,
            }
            .into());
        }

        // One default flag per bucket, ever; the first series claims it.
        let defaults: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM series \
             WHERE branch_id = ?1 AND document_type = ?2 AND is_default = 1",
        )
        .bind(branch_id)
        .bind(document_type)
        .fetch_one(&mut *tx)
        .await?;

        let series = new_series(
            Uuid::new_v4().to_string(),
            branch_id,
            document_type,
            code.to_string(),
            correlativo_inicial,
            description,
            defaults == 0,
            now,
        );

        insert_series(&mut tx, &series).await?;
        tx.commit().await?;

        debug!(
            branch_id,
            code = %series.code,
            document_type = %document_type,
            "Series created"
        );

        Ok(series)
    }

    /// Applies a partial update to a series.
    ///
    /// See [`SeriesPatch`] for the patchable fields and their rules.
    pub async fn update(
        &self,
        branch_id: i64,
        operator_id: &str,
        series_id: &str,
        patch: SeriesPatch,
    ) -> DbResult<Series> {
        if let Some(value) = patch.correlativo_actual {
            validate_correlativo_actual(value)?;
        }
        if let Some(value) = patch.correlativo_maximo {
            validate_correlativo_maximo(value)?;
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        touch_config(&mut tx, branch_id, operator_id, now).await?;
        let current = fetch_by_id(&mut tx, branch_id, series_id).await?;

        if patch.is_empty() {
            return Ok(current);
        }

        let new_actual = patch.correlativo_actual.unwrap_or(current.correlativo_actual);
        let new_maximo = patch.correlativo_maximo.unwrap_or(current.correlativo_maximo);

        if let Some(requested) = patch.correlativo_actual {
            // Forward only: a rewind would resurrect an issued number.
            if requested < current.correlativo_actual {
                return Err(SeriesError::CorrelativoRewind {
                    code: current.code.clone(),
                    current: current.correlativo_actual,
                    requested,
                }
                .into());
            }
            if requested > new_maximo {
                return Err(SeriesError::CorrelativoOutOfRange {
                    field: "correlativo_actual",
                    value: requested,
                    min: current.correlativo_actual,
                    max: new_maximo,
                }
                .into());
            }
        }

        if let Some(maximo) = patch.correlativo_maximo {
            if maximo < new_actual {
                return Err(SeriesError::CorrelativoOutOfRange {
                    field: "correlativo_maximo",
                    value: maximo,
                    min: new_actual,
                    max: MAX_CORRELATIVO,
                }
                .into());
            }
        }

        let new_active = patch.active.unwrap_or(current.active);
        if current.active && !new_active {
            let active = count_active(&mut tx, branch_id, current.document_type).await?;
            if active <= 1 {
                return Err(SeriesError::LastActiveSeries {
                    code: current.code.clone(),
                    document_type: current.document_type,
                }
                .into());
            }
        }

        // Claiming the default flag moves it off every bucket sibling, so
        // the bucket never holds two flags.
        if patch.is_default == Some(true) {
            sqlx::query(
                "UPDATE series SET is_default = 0, version = version + 1, updated_at = ?1 \
                 WHERE branch_id = ?2 AND document_type = ?3 AND id <> ?4 AND is_default = 1",
            )
            .bind(now)
            .bind(branch_id)
            .bind(current.document_type)
            .bind(series_id)
            .execute(&mut *tx)
            .await?;
        }

        let new_default = patch.is_default.unwrap_or(current.is_default);
        let new_description = patch.description.clone().or_else(|| current.description.clone());

        sqlx::query(
            "UPDATE series SET \
                 description = ?1, active = ?2, is_default = ?3, \
                 correlativo_actual = ?4, correlativo_maximo = ?5, \
                 version = version + 1, updated_at = ?6 \
             WHERE id = ?7",
        )
        .bind(&new_description)
        .bind(new_active)
        .bind(new_default)
        .bind(new_actual)
        .bind(new_maximo)
        .bind(now)
        .bind(series_id)
        .execute(&mut *tx)
        .await?;

        let updated = fetch_by_id(&mut tx, branch_id, series_id).await?;
        tx.commit().await?;

        debug!(branch_id, code = %updated.code, "Series updated");

        Ok(updated)
    }

    /// Deletes a series.
    ///
    /// Rejected when removing this series would leave zero active series in
    /// its bucket: numbering must never go dark for a document type that
    /// still requires it.
    pub async fn delete(
        &self,
        branch_id: i64,
        operator_id: &str,
        series_id: &str,
    ) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        touch_config(&mut tx, branch_id, operator_id, now).await?;
        let series = fetch_by_id(&mut tx, branch_id, series_id).await?;

        if series.active {
            let active = count_active(&mut tx, branch_id, series.document_type).await?;
            if active <= 1 {
                return Err(SeriesError::LastActiveSeries {
                    code: series.code.clone(),
                    document_type: series.document_type,
                }
                .into());
            }
        }

        sqlx::query("DELETE FROM series WHERE id = ?1")
            .bind(series_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(branch_id, code = %series.code, "Series deleted");

        Ok(())
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

    const OPERATOR: &str = "operator-1";

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let db = test_db().await;
        let repo = db.series();

        let series = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap();
        assert_eq!(series.code, "F001");
        assert_eq!(series.correlativo_actual, 1);
        assert!(series.active);

        let all = repo.list(1, OPERATOR, None).await.unwrap();
        assert_eq!(all.len(), 1);

        let invoices = repo
            .list(1, OPERATOR, Some(DocumentType::Invoice))
            .await
            .unwrap();
        assert_eq!(invoices.len(), 1);

        let receipts = repo
            .list(1, OPERATOR, Some(DocumentType::Receipt))
            .await
            .unwrap();
        assert!(receipts.is_empty());
    }

    #[tokio::test]
    async fn test_list_unconfigured_branch_is_not_found() {
        let db = test_db().await;

        let err = db.series().list(42, OPERATOR, None).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::ConfigNotFound { branch_id: 42 })
        ));
    }

    #[tokio::test]
    async fn test_operator_scoping() {
        let db = test_db().await;
        let repo = db.series();

        repo.create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap();

        // A different operator cannot see (or extend) the configuration.
        let err = repo.list(1, "someone-else", None).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::ConfigNotFound { .. })
        ));

        let err = repo
            .create(1, "someone-else", DocumentType::Receipt, "B001", 1, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::ConfigNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_format() {
        let db = test_db().await;

        let err = db
            .series()
            .create(1, OPERATOR, DocumentType::Invoice, "ZZZZ", 1, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::InvalidCode { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_code() {
        let db = test_db().await;
        let repo = db.series();

        repo.create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap();
        let err = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::DuplicateCode { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_out_of_range_inicial() {
        let db = test_db().await;
        let repo = db.series();

        for bad in [0, -5, 100_000_000] {
            let err = repo
                .create(1, OPERATOR, DocumentType::Invoice, "F001", bad, None)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                DbError::Series(SeriesError::CorrelativoOutOfRange { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_first_series_in_bucket_becomes_default() {
        let db = test_db().await;
        let repo = db.series();

        let first = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap();
        let second = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F002", 1, None)
            .await
            .unwrap();
        // Separate bucket gets its own default.
        let receipt = repo
            .create(1, OPERATOR, DocumentType::Receipt, "B001", 1, None)
            .await
            .unwrap();

        assert!(first.is_default);
        assert!(!second.is_default);
        assert!(receipt.is_default);
    }

    #[tokio::test]
    async fn test_update_rejects_backward_correction() {
        let db = test_db().await;
        let repo = db.series();

        let series = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F001", 10, None)
            .await
            .unwrap();

        let patch = SeriesPatch {
            correlativo_actual: Some(5),
            ..Default::default()
        };
        let err = repo
            .update(1, OPERATOR, &series.id, patch)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::CorrelativoRewind {
                current: 10,
                requested: 5,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_update_forward_correction() {
        let db = test_db().await;
        let repo = db.series();

        let series = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F001", 10, None)
            .await
            .unwrap();

        let patch = SeriesPatch {
            correlativo_actual: Some(12),
            description: Some("gap after printer jam".to_string()),
            ..Default::default()
        };
        let updated = repo.update(1, OPERATOR, &series.id, patch).await.unwrap();

        assert_eq!(updated.correlativo_actual, 12);
        assert_eq!(updated.correlativo_inicial, 10);
        assert_eq!(updated.version, series.version + 1);
        assert_eq!(updated.description.as_deref(), Some("gap after printer jam"));
    }

    #[tokio::test]
    async fn test_update_rejects_maximo_below_actual() {
        let db = test_db().await;
        let repo = db.series();

        let series = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F001", 100, None)
            .await
            .unwrap();

        let patch = SeriesPatch {
            correlativo_maximo: Some(50),
            ..Default::default()
        };
        let err = repo
            .update(1, OPERATOR, &series.id, patch)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::CorrelativoOutOfRange {
                field: "correlativo_maximo",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_deactivate_last_active_rejected() {
        let db = test_db().await;
        let repo = db.series();

        let only = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap();

        let patch = SeriesPatch {
            active: Some(false),
            ..Default::default()
        };
        let err = repo
            .update(1, OPERATOR, &only.id, patch)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::LastActiveSeries { .. })
        ));

        // With a second active series the deactivation goes through.
        repo.create(1, OPERATOR, DocumentType::Invoice, "F002", 1, None)
            .await
            .unwrap();
        let patch = SeriesPatch {
            active: Some(false),
            ..Default::default()
        };
        let updated = repo.update(1, OPERATOR, &only.id, patch).await.unwrap();
        assert!(!updated.active);
    }

    #[tokio::test]
    async fn test_delete_last_active_rejected_then_allowed() {
        let db = test_db().await;
        let repo = db.series();

        let only = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap();

        let err = repo.delete(1, OPERATOR, &only.id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::LastActiveSeries { .. })
        ));

        repo.create(1, OPERATOR, DocumentType::Invoice, "F002", 1, None)
            .await
            .unwrap();
        repo.delete(1, OPERATOR, &only.id).await.unwrap();

        let remaining = repo
            .list(1, OPERATOR, Some(DocumentType::Invoice))
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].code, "F002");
    }

    #[tokio::test]
    async fn test_default_flag_moves_between_siblings() {
        let db = test_db().await;
        let repo = db.series();

        let first = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap();
        let second = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F002", 1, None)
            .await
            .unwrap();
        assert!(first.is_default);

        let patch = SeriesPatch {
            is_default: Some(true),
            ..Default::default()
        };
        let second = repo.update(1, OPERATOR, &second.id, patch).await.unwrap();
        assert!(second.is_default);

        let first = repo.get_by_id(1, OPERATOR, &first.id).await.unwrap();
        assert!(!first.is_default);

        let collection = repo.load_collection(1, OPERATOR).await.unwrap();
        let resolved = collection.resolve_default(DocumentType::Invoice).unwrap();
        assert_eq!(resolved.code, "F002");
    }

    #[tokio::test]
    async fn test_get_by_type_active_filter() {
        let db = test_db().await;
        let repo = db.series();

        let first = repo
            .create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap();
        repo.create(1, OPERATOR, DocumentType::Invoice, "F002", 1, None)
            .await
            .unwrap();
        let patch = SeriesPatch {
            active: Some(false),
            ..Default::default()
        };
        repo.update(1, OPERATOR, &first.id, patch).await.unwrap();

        let active = repo
            .get_by_type(1, OPERATOR, DocumentType::Invoice, true)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].code, "F002");

        let all = repo
            .get_by_type(1, OPERATOR, DocumentType::Invoice, false)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_update_unknown_series_id() {
        let db = test_db().await;
        let repo = db.series();

        repo.create(1, OPERATOR, DocumentType::Invoice, "F001", 1, None)
            .await
            .unwrap();

        let err = repo
            .update(1, OPERATOR, "no-such-id", SeriesPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Series(SeriesError::SeriesIdNotFound { .. })
        ));
    }
}
