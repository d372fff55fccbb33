//! # table-import
//!
//! Copies relational tables from a driver-accessible source database into a
//! remote tabular store.
//!
//! Each table is loaded by its own task running on a fixed worker pool:
//!
//! - **Type conversion** from source wire types to target column types,
//!   resolved once per column
//! - **Large objects** moved into auxiliary tables with per-worker id ranges
//! - **Synthetic keys** derived from row content for tables without a key
//! - **Batched writes** with bounded concurrency and retry
//!
//! Source drivers and target stores plug in through the [`SourcePool`] and
//! [`TargetStore`] traits.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use table_import::memory::{MemorySource, MemoryTarget};
//! use table_import::{CancellationToken, Config, LoadPhase, TableJob};
//!
//! # async fn run(mut tables: Vec<TableJob>) -> table_import::Result<()> {
//! let config = Config::load("config.yaml")?.with_auto_tuning();
//! let phase = LoadPhase::new(
//!     &config,
//!     Arc::new(MemorySource::new()),
//!     Arc::new(MemoryTarget::new("/local/db")),
//! );
//! let summary = phase.run(&mut tables, CancellationToken::new()).await;
//! println!("Copied {} rows", summary.rows_copied);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod convert;
pub mod core;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod source;
pub mod target;
pub mod transfer;

// Re-exports for convenient access
pub use config::{Config, RetrySettings, TargetLoadConfig, WorkersConfig};
pub use convert::{ConversionMode, ValueConverter};
pub use crate::core::{
    BlobKind, SourceColumn, SourceMetadata, TableJob, TargetField, TargetKind, TargetSchema,
    TargetType, TargetValue, WireType,
};
pub use error::{ImportError, Result};
pub use orchestrator::{LoadPhase, LoadSummary};
pub use source::{SourcePool, SourceValue};
pub use target::{RetryConfig, RetryPolicy, TargetStore};
pub use tokio_util::sync::CancellationToken;
pub use transfer::{LoadContext, LoadOutcome, LoadSettings, LoadTask, TaskStatus};
