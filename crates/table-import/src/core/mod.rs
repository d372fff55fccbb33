//! Core data model shared by the load pipeline.
//!
//! - [`schema`]: source metadata, target table layout and table jobs
//! - [`value`]: converted target values and batches

pub mod schema;
pub mod value;

pub use schema::{
    BlobKind, SourceColumn, SourceMetadata, TableJob, TargetField, TargetKind, TargetSchema,
    TargetType, WireType, SYNTH_KEY_FIELD,
};
pub use value::{TargetBatch, TargetRow, TargetValue};
