// src/schema/mapping.rs

use arrow::{
    datatypes::{Field, Schema},
    record_batch::{RecordBatch, RecordBatchOptions},
};
use std::sync::Arc;

use crate::error::PipelineError;

/// Declarative column mapping for one raw source: `renames` maps a source
/// column to its target name, `drops` lists source columns that are pruned.
/// Columns named in neither keep their source name and position.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMapping {
    pub renames: &'static [(&'static str, &'static str)],
    pub drops: &'static [&'static str],
}

impl ColumnMapping {
    fn target_name<'a>(&self, source: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(old, _)| *old == source)
            .map(|(_, new)| *new)
            .unwrap_or(source)
    }

    fn is_dropped(&self, source: &str) -> bool {
        self.drops.contains(&source)
    }

    /// Fails with `SchemaMismatch` on the first mapped or dropped column that
    /// the schema does not have.
    pub fn check(&self, table: &str, schema: &Schema) -> Result<(), PipelineError> {
        let named = self
            .renames
            .iter()
            .map(|(old, _)| *old)
            .chain(self.drops.iter().copied());
        for column in named {
            if schema.index_of(column).is_err() {
                return Err(PipelineError::SchemaMismatch {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Rename and prune the columns of `batch` according to `mapping`.
///
/// Row order and row count are preserved exactly; no filtering or dedup.
pub fn map_columns(
    table: &str,
    batch: &RecordBatch,
    mapping: &ColumnMapping,
) -> Result<RecordBatch, PipelineError> {
    let schema = batch.schema();
    mapping.check(table, &schema)?;

    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns = Vec::with_capacity(schema.fields().len());
    for (i, field) in schema.fields().iter().enumerate() {
        if mapping.is_dropped(field.name()) {
            continue;
        }
        fields.push(Field::new(
            mapping.target_name(field.name()),
            field.data_type().clone(),
            field.is_nullable(),
        ));
        columns.push(batch.column(i).clone());
    }

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        columns,
        &options,
    )?)
}
