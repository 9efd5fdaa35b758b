// src/process/mod.rs
use arrow::{compute::concat_batches, csv::ReaderBuilder};
use encoding_rs::Encoding;
use encoding_rs_io::{DecodeReaderBytes, DecodeReaderBytesBuilder};
use std::{fs::File, path::Path};
use tracing::debug;

use crate::error::{PipelineError, SourceError};
use crate::schema::build_text_schema;

pub mod codes;
pub mod dimension;
pub mod fact;
pub mod raw_table;
pub mod trimming;
pub mod utils;

pub use raw_table::RawTable;

/// Rows per Arrow batch when loading a whole (small) dimension source.
const DIMENSION_BATCH_ROWS: usize = 8_192;

/// CSV reader over a decoded source: bytes in `encoding` come out as UTF-8.
pub type DecodedCsv = arrow::csv::Reader<DecodeReaderBytes<File, Vec<u8>>>;

/// Look up an encoding by its WHATWG label (`windows-1252`, `cp1252`, `utf-8`, ...).
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, PipelineError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| PipelineError::UnknownEncoding(label.to_string()))
}

/// Open `path` as a UTF-8 byte stream, transcoding from `encoding`.
///
/// UTF-8 sources are passed through untouched (a leading BOM is dropped), so
/// invalid bytes fail the CSV reader instead of becoming U+FFFD.
pub fn open_decoded(
    path: &Path,
    encoding: &'static Encoding,
) -> Result<DecodeReaderBytes<File, Vec<u8>>, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::reading(path, e))?;
    let mut builder = DecodeReaderBytesBuilder::new();
    if encoding == encoding_rs::UTF_8 {
        builder.utf8_passthru(true).strip_bom(true);
    } else {
        builder.encoding(Some(encoding));
    }
    Ok(builder.build(file))
}

/// Header row of a source file.
pub fn read_headers(path: &Path, encoding: &'static Encoding) -> Result<Vec<String>, PipelineError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(open_decoded(path, encoding)?);
    let headers = rdr
        .headers()
        .map_err(|e| PipelineError::reading(path, e))?;
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(PipelineError::reading(path, SourceError::NoHeader));
    }
    Ok(headers.iter().map(str::to_string).collect())
}

/// Stream a source file as all-text record batches of `batch_rows` rows.
/// Only one batch is held in memory at a time.
pub fn text_batches(
    path: &Path,
    encoding: &'static Encoding,
    batch_rows: usize,
) -> Result<DecodedCsv, PipelineError> {
    let headers = read_headers(path, encoding)?;
    let schema = build_text_schema(&headers);
    debug!(path = %path.display(), columns = headers.len(), "opening source");

    ReaderBuilder::new(schema)
        .with_header(true)
        .with_batch_size(batch_rows.max(1))
        .build(open_decoded(path, encoding)?)
        .map_err(|e| PipelineError::reading(path, e))
}

/// Load a whole source table into one batch. For the small reference files only.
pub fn load_table(path: &Path, encoding: &'static Encoding) -> Result<RawTable, PipelineError> {
    let reader = text_batches(path, encoding, DIMENSION_BATCH_ROWS)?;
    let schema = reader.schema();
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PipelineError::reading(path, e))?;
    let batch = concat_batches(&schema, &batches)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    Ok(RawTable { name, batch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_text_table_with_quotes_and_empties() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Units.csv");
        fs::write(
            &path,
            "Unit Name,Description\nkg,\"Kilogram, metric\"\nha,\n",
        )
        .unwrap();

        let table = load_table(&path, encoding_rs::UTF_8).unwrap();
        assert_eq!(table.name, "Units.csv");
        assert_eq!(table.headers(), vec!["Unit Name", "Description"]);
        assert_eq!(table.num_rows(), 2);

        let desc = table
            .batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(desc.value(0), "Kilogram, metric");
        assert!(desc.is_null(1));
    }

    #[test]
    fn header_only_source_is_an_empty_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Flags.csv");
        fs::write(&path, "Flag,Description\n").unwrap();

        let table = load_table(&path, encoding_rs::UTF_8).unwrap();
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.headers(), vec!["Flag", "Description"]);
    }

    #[test]
    fn empty_file_has_no_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Empty.csv");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            load_table(&path, encoding_rs::UTF_8),
            Err(PipelineError::Source {
                source: SourceError::NoHeader,
                ..
            })
        ));
    }

    #[test]
    fn invalid_utf8_is_an_error_not_a_replacement() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Units.csv");
        fs::write(&path, b"Unit Name,Description\nkg,Kilogramm\xE9\n").unwrap();

        assert!(matches!(
            load_table(&path, encoding_rs::UTF_8),
            Err(PipelineError::Source { .. })
        ));
    }

    #[test]
    fn utf8_bom_is_dropped_from_the_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Flags.csv");
        fs::write(&path, b"\xEF\xBB\xBFFlag,Description\nA,Official\n").unwrap();

        let table = load_table(&path, encoding_rs::UTF_8).unwrap();
        assert_eq!(table.headers(), vec!["Flag", "Description"]);
        assert_eq!(table.num_rows(), 1);
    }

    #[test]
    fn resolves_legacy_labels() {
        assert_eq!(resolve_encoding("cp1252").unwrap(), encoding_rs::WINDOWS_1252);
        assert_eq!(resolve_encoding("windows-1252").unwrap(), encoding_rs::WINDOWS_1252);
        assert!(resolve_encoding("klingon").is_err());
    }
}
