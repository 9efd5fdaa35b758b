pub mod arrow;
pub mod catalog;
pub mod mapping;

pub use self::arrow::{build_text_schema, column_names};
pub use catalog::{expected_artifacts, TableSpec};
pub use mapping::{map_columns, ColumnMapping};
