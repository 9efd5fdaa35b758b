use arrow::record_batch::RecordBatch;

use crate::schema::column_names;

/// An untyped source table: every column is `Utf8`, names come from the
/// file's header row and are never validated beyond "column exists".
#[derive(Debug, Clone)]
pub struct RawTable {
    /// Source file name, e.g. `Units.csv`.
    pub name: String,
    pub batch: RecordBatch,
}

impl RawTable {
    pub fn headers(&self) -> Vec<String> {
        column_names(&self.batch.schema())
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }
}
