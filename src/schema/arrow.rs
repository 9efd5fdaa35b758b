// src/schema/arrow.rs

use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema};
use std::sync::Arc;

/// Build an all-`Utf8` ArrowSchema from a header row.
///
/// Raw sources are never typed: every value is carried as text so that codes
/// like `004` or `'159` survive unchanged until a mapping touches them.
pub fn build_text_schema<S: AsRef<str>>(headers: &[S]) -> Arc<ArrowSchema> {
    let fields: Vec<ArrowField> = headers
        .iter()
        .map(|name| ArrowField::new(name.as_ref().trim(), DataType::Utf8, /* nullable = */ true))
        .collect();

    Arc::new(ArrowSchema::new(fields))
}

/// Column names of a schema, in order.
pub fn column_names(schema: &ArrowSchema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().to_string()).collect()
}
