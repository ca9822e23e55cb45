//! # quipu-db: Database Layer for Quipu
//!
//! Persistence for the series/correlativo numbering authority, backed by
//! SQLite through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Quipu Data Flow                                 │
//! │                                                                         │
//! │  Sale flow: "give me the next invoice number for branch 1"             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     quipu-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐   ┌────────────┐ │   │
//! │  │   │   Database    │    │    Repositories    │   │ Migrations │ │   │
//! │  │   │   (pool.rs)   │    │ SeriesRepository   │   │ (embedded) │ │   │
//! │  │   │               │◄───│ Correlativo-       │   │ 001_series │ │   │
//! │  │   │ SqlitePool    │    │   Allocator        │   │  _schema   │ │   │
//! │  │   │ WAL + busy    │    │ DefaultSeries-     │   │            │ │   │
//! │  │   │  timeout      │    │   Initializer      │   │            │ │   │
//! │  │   └───────────────┘    └────────────────────┘   └────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite: branch_series_configs + series rows                           │
//! │  (each series independently addressable, per-row version stamp)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Series registry, allocator and bootstrap
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quipu_db::{Database, DbConfig};
//! use quipu_core::DocumentType;
//!
//! let db = Database::new(DbConfig::new("path/to/quipu.db")).await?;
//!
//! // Bootstrap a new branch, then consume a number
//! db.bootstrap().initialize_defaults(1, operator).await?;
//! let allocation = db.allocator().allocate(1, operator, DocumentType::Invoice, None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::allocator::CorrelativoAllocator;
pub use repository::bootstrap::DefaultSeriesInitializer;
pub use repository::series::SeriesRepository;
