//! # Default Series Bootstrap
//!
//! One-time initialization of the standard numbering lanes for a new branch.
//!
//! ## What Gets Created
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  initialize_defaults(branch)                                            │
//! │                                                                         │
//! │    invoice      → F001   inicial = actual = 1   active, default        │
//! │    receipt      → B001   inicial = actual = 1   active, default        │
//! │    credit_note  → FC01   inicial = actual = 1   active, default        │
//! │    debit_note   → FD01   inicial = actual = 1   active, default        │
//! │                                                                         │
//! │  Fails with AlreadyInitialized when ANY bucket already has entries;    │
//! │  a partially configured branch is finished through the registry, not   │
//! │  by re-running the bootstrap.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::{ensure_config, insert_series};
use quipu_core::{new_series, DocumentType, SeriesCollection, SeriesError};

/// Bootstraps the standard series for a new branch.
#[derive(Debug, Clone)]
pub struct DefaultSeriesInitializer {
    pool: SqlitePool,
}

impl DefaultSeriesInitializer {
    /// Creates a new DefaultSeriesInitializer.
    pub fn new(pool: SqlitePool) -> Self {
        DefaultSeriesInitializer { pool }
    }

    /// Creates one default, active series per document type.
    ///
    /// Runs in a single transaction serialized against all other structural
    /// mutations of the branch; either every bucket gets its default series
    /// or none does.
    ///
    /// ## Errors
    /// * `AlreadyInitialized` - the branch already has series configured
    /// * `ConfigNotFound` - the branch configuration belongs to another
    ///   operator
    pub async fn initialize_defaults(
        &self,
        branch_id: i64,
        operator_id: &str,
    ) -> DbResult<SeriesCollection> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        ensure_config(&mut tx, branch_id, operator_id, now).await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM series WHERE branch_id = ?1")
            .bind(branch_id)
            .fetch_one(&mut *tx)
            .await?;

        if existing > 0 {
            return Err(SeriesError::AlreadyInitialized { branch_id }.into());
        }

        let mut rows = Vec::with_capacity(DocumentType::ALL.len());
        for document_type in DocumentType::ALL {
            let series = new_series(
                Uuid::new_v4().to_string(),
                branch_id,
                document_type,
                document_type.default_code().to_string(),
                1,
                None,
                true,
                now,
            );
            insert_series(&mut tx, &series).await?;
            rows.push(series);
        }

        tx.commit().await?;

        info!(branch_id, "Default series initialized");

        Ok(SeriesCollection::from_rows(branch_id, rows))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
