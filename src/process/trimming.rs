use crate::error::PipelineError;
use crate::process::utils::strip_marker;
use arrow::{
    array::{ArrayRef, StringArray},
    record_batch::RecordBatch,
};
use std::sync::Arc;

/// Strip a leading `marker` from every value of `column`.
///
/// Non-text columns are passed through untouched; a missing column is a
/// `SchemaMismatch` for `table`.
pub fn strip_column_marker(
    table: &str,
    batch: &RecordBatch,
    column: &str,
    marker: char,
) -> Result<RecordBatch, PipelineError> {
    let idx = batch
        .schema()
        .index_of(column)
        .map_err(|_| PipelineError::SchemaMismatch {
            table: table.to_string(),
            column: column.to_string(),
        })?;

    let mut cols: Vec<ArrayRef> = batch.columns().to_vec();
    if let Some(sarr) = cols[idx].as_any().downcast_ref::<StringArray>() {
        let stripped: StringArray = sarr
            .iter()
            .map(|opt| opt.map(|v| strip_marker(v, marker)))
            .collect();
        cols[idx] = Arc::new(stripped) as ArrayRef;
    }

    Ok(RecordBatch::try_new(batch.schema(), cols)?)
}
