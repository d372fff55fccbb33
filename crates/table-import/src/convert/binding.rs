//! Source-to-target column bindings of a table scan.

use tracing::warn;

use super::mode::{resolve_mode, ConversionMode};
use crate::core::{BlobKind, TableJob, SYNTH_KEY_FIELD};
use crate::error::{ImportError, Result};
use crate::source::ResultColumn;

/// Where a target field takes its value from and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    /// 1-based position in the result set.
    pub source_pos: usize,
    /// 0-based position in the target row.
    pub target_pos: usize,
    pub mode: ConversionMode,
    /// Absolute path of the auxiliary table, blob modes only.
    pub blob_path: Option<String>,
}

/// Build the bindings of a table from its target fields, source metadata
/// and the columns of the opened result set.
///
/// Fields missing on either source side are skipped with a warning, as are
/// blob columns without an auxiliary table. The synthetic key field is
/// never bound. Blob detection follows the declared metadata type since
/// some drivers report large objects under a plain wire type.
pub fn build_bindings(
    job: &TableJob,
    result_columns: &[ResultColumn],
    database: &str,
) -> Result<Vec<ColumnBinding>> {
    let metadata = job
        .metadata
        .as_ref()
        .ok_or_else(|| ImportError::Metadata(job.full_name()))?;

    let mut bindings = Vec::with_capacity(job.target.fields.len());
    for (target_pos, field) in job.target.fields.iter().enumerate() {
        if field.name == SYNTH_KEY_FIELD {
            continue;
        }
        let Some(column) = metadata.column(&field.name) else {
            warn!(
                "Unexpected column {} in the source table {} - SKIPPED",
                field.name,
                job.full_name()
            );
            continue;
        };
        let Some(index) = result_columns.iter().position(|c| c.name == field.name) else {
            warn!(
                "Missing column {} in the source table {} - SKIPPED",
                field.name,
                job.full_name()
            );
            continue;
        };

        let binding = if column.is_blob {
            let Some(blob_target) = job.blob_targets.get(&field.name) else {
                warn!(
                    "Missing aux target table for BLOB column {} of source {}",
                    field.name,
                    job.full_name()
                );
                continue;
            };
            let mode = match column.blob_kind {
                BlobKind::Object => ConversionMode::BlobObject,
                BlobKind::Stream => ConversionMode::BlobStream,
            };
            ColumnBinding {
                source_pos: index + 1,
                target_pos,
                mode,
                blob_path: Some(format!("{}/{}", database, blob_target.full_name)),
            }
        } else {
            ColumnBinding {
                source_pos: index + 1,
                target_pos,
                mode: resolve_mode(&field.name, field.field_type, result_columns[index].wire_type)?,
                blob_path: None,
            }
        };
        bindings.push(binding);
    }

    Ok(bindings)
}
