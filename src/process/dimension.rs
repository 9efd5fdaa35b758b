use arrow::record_batch::RecordBatch;
use std::path::Path;
use tracing::{info, instrument};

use crate::error::PipelineError;
use crate::process::load_table;
use crate::schema::{map_columns, TableSpec};

/// Load one reference source from `input_dir` and map it to its dimension.
#[instrument(level = "info", skip(input_dir, spec), fields(source = spec.source_file))]
pub fn transform_dimension(input_dir: &Path, spec: &TableSpec) -> Result<RecordBatch, PipelineError> {
    let path = input_dir.join(spec.source_file);
    let raw = load_table(&path, encoding_rs::UTF_8)?;
    let mapped = map_columns(&raw.name, &raw.batch, &spec.mapping)?;
    info!(rows = mapped.num_rows(), artifact = spec.artifact, "mapped dimension");
    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{catalog, column_names};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn country_group_drops_code_columns() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("CountryGroup.csv"),
            "Country Group Code,Country Group,Country Code,Country,M49 Code,ISO2 Code,ISO3 Code\n\
             5100,Africa,4,Algeria,012,DZ,DZA\n",
        )
        .unwrap();

        let out = transform_dimension(dir.path(), &catalog::COUNTRY_GROUP).unwrap();
        assert_eq!(
            column_names(&out.schema()),
            vec!["country_group", "country", "m49_code"]
        );
        assert_eq!(out.num_rows(), 1);
    }

    #[test]
    fn undecodable_reference_source_fails_the_branch() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("Flags.csv"),
            b"Flag,Description\nA,Official figure\nE,Estim\xE9\n",
        )
        .unwrap();
        assert!(matches!(
            transform_dimension(dir.path(), &catalog::FLAGS),
            Err(PipelineError::Source { .. })
        ));
    }

    #[test]
    fn missing_source_file_fails_the_branch() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            transform_dimension(dir.path(), &catalog::FLAGS),
            Err(PipelineError::Source { .. })
        ));
    }
}
