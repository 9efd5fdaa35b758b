// src/process/fact.rs
//
// Streaming transform of the measurement source into the single fact table.
// The source is read chunk by chunk; each chunk is cut into partitions that
// are mapped in parallel, and the partition results are appended in order to
// one staged file (merge-on-write), so exactly one fact file is produced no
// matter how many partitions are used.

use arrow::{csv::WriterBuilder, record_batch::RecordBatch};
use chrono::{DateTime, Local};
use encoding_rs::Encoding;
use rayon::prelude::*;
use std::{
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, info, instrument};

use crate::artifact::StagedArtifact;
use crate::error::{PersistenceError, PipelineError, SourceError};
use crate::process::{
    codes::{extract_area_refs, AreaRefs},
    text_batches,
    trimming::strip_column_marker,
};
use crate::schema::{
    catalog::{AREA_CODE_COLUMN, AREA_LABEL_COLUMN, CODE_MARKER, FACT_AREA_COLUMN, WORLD_DATA},
    map_columns, TableSpec,
};

/// How the fact source is read.
#[derive(Debug, Clone)]
pub struct FactOptions {
    /// Code page of the raw file. It is not UTF-8 and must be declared.
    pub encoding: &'static Encoding,
    /// Rows held in memory at once.
    pub chunk_rows: usize,
    /// Parallel shards per chunk.
    pub partitions: usize,
}

impl Default for FactOptions {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::WINDOWS_1252,
            chunk_rows: 100_000,
            partitions: num_cpus::get(),
        }
    }
}

/// Result of the fact transform: the still-staged output plus the derived
/// area references that drive enrichment.
pub struct FactOutput {
    pub staged: StagedArtifact,
    pub rows: u64,
    pub chunks: usize,
    pub area_refs: AreaRefs,
}

/// Cut `batch` into at most `partitions` contiguous, non-empty slices.
fn partition(batch: &RecordBatch, partitions: usize) -> Vec<RecordBatch> {
    let len = batch.num_rows();
    if len == 0 {
        return Vec::new();
    }
    let per = len.div_ceil(partitions.max(1));
    (0..len)
        .step_by(per)
        .map(|offset| batch.slice(offset, per.min(len - offset)))
        .collect()
}

fn transform_partition(
    spec: &TableSpec,
    slice: &RecordBatch,
) -> Result<(RecordBatch, AreaRefs), PipelineError> {
    let refs = extract_area_refs(spec.source_file, slice, AREA_CODE_COLUMN, AREA_LABEL_COLUMN)?;
    let mapped = map_columns(spec.source_file, slice, &spec.mapping)?;
    let mapped = strip_column_marker(spec.source_file, &mapped, FACT_AREA_COLUMN, CODE_MARKER)?;
    Ok((mapped, refs))
}

fn write_error(artifact: &str, err: arrow::error::ArrowError) -> PipelineError {
    PersistenceError::Encode {
        artifact: artifact.to_string(),
        source: SourceError::Arrow(err),
    }
    .into()
}

/// Stream `source` into `staged`, returning the staged output (not yet
/// published) and the distinct area references seen on the way.
#[instrument(level = "info", skip(source, staged, options), fields(path = %source.display(), partitions = options.partitions))]
pub fn transform_fact(
    source: &Path,
    staged: StagedArtifact,
    options: &FactOptions,
) -> Result<FactOutput, PipelineError> {
    let start = Instant::now();
    let spec = &WORLD_DATA;
    let artifact = staged.name().to_string();

    let reader = text_batches(source, options.encoding, options.chunk_rows)?;
    let source_schema = reader.schema();
    // fail before any row is read if the header is wrong
    spec.mapping.check(spec.source_file, &source_schema)?;
    for column in [AREA_CODE_COLUMN, AREA_LABEL_COLUMN] {
        if source_schema.index_of(column).is_err() {
            return Err(PipelineError::SchemaMismatch {
                table: spec.source_file.to_string(),
                column: column.to_string(),
            });
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.partitions.max(1))
        .thread_name(|i| format!("fact-partition-{i}"))
        .build()
        .map_err(|e| PipelineError::reading(source, std::io::Error::other(e)))?;

    let mut writer = WriterBuilder::new().with_header(true).build(staged);
    let mut area_refs = AreaRefs::default();
    let mut rows = 0u64;
    let mut chunks = 0usize;

    for chunk in reader {
        let chunk = chunk.map_err(|e| PipelineError::reading(source, e))?;
        let slices = partition(&chunk, options.partitions);

        let results: Vec<(RecordBatch, AreaRefs)> = pool.install(|| {
            slices
                .par_iter()
                .map(|slice| transform_partition(spec, slice))
                .collect::<Result<Vec<_>, _>>()
        })?;

        for (mapped, refs) in results {
            writer
                .write(&mapped)
                .map_err(|e| write_error(&artifact, e))?;
            rows += mapped.num_rows() as u64;
            area_refs.merge(refs);
        }
        chunks += 1;
        debug!(chunk = chunks, rows, "chunk written");
    }

    if rows == 0 {
        // header-only output for an empty source
        let empty = RecordBatch::new_empty(source_schema);
        let mapped = map_columns(spec.source_file, &empty, &spec.mapping)?;
        writer
            .write(&mapped)
            .map_err(|e| write_error(&artifact, e))?;
    }

    info!(
        rows,
        chunks,
        areas = area_refs.len(),
        elapsed = ?start.elapsed(),
        "fact transform complete"
    );

    Ok(FactOutput {
        staged: writer.into_inner(),
        rows,
        chunks,
        area_refs,
    })
}

/// File name of the area hand-off list for a run started at `at`.
pub fn countries_list_name(at: DateTime<Local>) -> String {
    format!("countries_list_{}.csv", at.format("%Y-%m-%dT%H-%M-%S"))
}

/// Persist the derived area list next to the outputs, for audit. The
/// pipeline passes the set on as a value; this file is never read back.
pub fn write_countries_list(
    dir: &Path,
    refs: &AreaRefs,
    at: DateTime<Local>,
) -> Result<PathBuf, PersistenceError> {
    let name = countries_list_name(at);
    let mut staged = StagedArtifact::create(dir, &name)?;
    refs.write_csv(&mut staged)
        .map_err(|e| PersistenceError::Encode {
            artifact: name.clone(),
            source: e.into(),
        })?;
    staged.persist()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::catalog;
    use chrono::TimeZone;
    use std::{collections::BTreeSet, fs};
    use tempfile::tempdir;

    const HEADER: &str = "Area Code,Area Code (M49),Area,Item Code,Item Code (CPC),Item,\
                          Element Code,Element,Year Code,Year,Unit,Value,Flag";

    fn world_data(rows: &[&str]) -> Vec<u8> {
        let mut text = String::from(HEADER);
        text.push('\n');
        for r in rows {
            text.push_str(r);
            text.push('\n');
        }
        // the source is Windows-1252, not UTF-8
        let (bytes, _, unmappable) = encoding_rs::WINDOWS_1252.encode(&text);
        assert!(!unmappable);
        bytes.into_owned()
    }

    fn sample_rows() -> Vec<String> {
        let areas = [
            ("2", "'004", "Afghanistan"),
            ("3", "'008", "Albania"),
            ("107", "'384", "Côte d'Ivoire"),
            ("182", "'638", "Réunion"),
        ];
        let mut rows = Vec::new();
        for year in 2000..2005 {
            for (fao, m49, name) in areas {
                rows.push(format!(
                    "{fao},{m49},\"{name}\",15,'0111,Wheat,5312,Area harvested,{year},{year},ha,{v},A",
                    v = year - 1990
                ));
            }
        }
        rows
    }

    struct Ran {
        csv: String,
        rows: u64,
        chunks: usize,
        area_refs: AreaRefs,
    }

    fn run(dir: &Path, partitions: usize, chunk_rows: usize) -> Ran {
        let source = dir.join("WorldData.csv");
        if !source.exists() {
            let rows = sample_rows();
            let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
            fs::write(&source, world_data(&refs)).unwrap();
        }
        let out_dir = dir.join(format!("out-{partitions}-{chunk_rows}"));
        let staged = StagedArtifact::create(&out_dir, catalog::WORLD_DATA.artifact).unwrap();
        let options = FactOptions {
            encoding: encoding_rs::WINDOWS_1252,
            chunk_rows,
            partitions,
        };
        let FactOutput {
            staged,
            rows,
            chunks,
            area_refs,
        } = transform_fact(&source, staged, &options).unwrap();
        let path = staged.persist().unwrap();
        Ran {
            csv: fs::read_to_string(path).unwrap(),
            rows,
            chunks,
            area_refs,
        }
    }

    #[test]
    fn maps_columns_and_strips_area_marker() {
        let dir = tempdir().unwrap();
        let output = run(dir.path(), 1, 1_000);
        let mut lines = output.csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "area_code_m49,item_code,element_code,year,unit_name,value,flag_code"
        );
        assert_eq!(lines.next().unwrap(), "004,15,5312,2000,ha,10,A");
        assert_eq!(output.rows, 20);
    }

    #[test]
    fn decodes_legacy_code_page() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("WorldData.csv");
        fs::write(
            &source,
            world_data(&["182,'638,Réunion,15,'0111,Wheat,5312,Area harvested,2001,2001,hectare carré,3,E"]),
        )
        .unwrap();
        // é is a single 0xE9 byte in the raw file
        assert!(fs::read(&source).unwrap().contains(&0xE9));

        let output = run(dir.path(), 1, 10);
        assert_eq!(
            output.csv.lines().nth(1).unwrap(),
            "638,15,5312,2001,hectare carré,3,E"
        );
        let labels: Vec<_> = output.area_refs.iter().map(|r| r.label.clone()).collect();
        assert_eq!(labels, vec!["Réunion".to_string()]);
    }

    #[test]
    fn one_file_and_same_rows_for_any_partition_count() {
        let dir = tempdir().unwrap();
        let single = run(dir.path(), 1, 7);
        let parted = run(dir.path(), 4, 7);

        let as_set = |s: &str| s.lines().map(str::to_string).collect::<BTreeSet<_>>();
        assert_eq!(as_set(&single.csv), as_set(&parted.csv));
        assert_eq!(single.csv, parted.csv);
        assert_eq!(single.area_refs, parted.area_refs);
        assert_eq!(single.rows, 20);
        assert_eq!(parted.chunks, 3);

        let fact_files = fs::read_dir(dir.path().join("out-4-7"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("fact_world_data"))
            .count();
        assert_eq!(fact_files, 1);
    }

    #[test]
    fn derives_distinct_area_codes() {
        let dir = tempdir().unwrap();
        let output = run(dir.path(), 4, 3);
        let codes: Vec<_> = output
            .area_refs
            .entity_codes()
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(codes, vec!["004", "008", "384", "638"]);
    }

    #[test]
    fn missing_fact_column_is_schema_mismatch() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("WorldData.csv");
        fs::write(&source, "Area Code (M49),Area,Value\n'004,Afghanistan,1\n").unwrap();
        let staged = StagedArtifact::create(dir.path(), "fact_world_data.csv").unwrap();
        let err = transform_fact(&source, staged, &FactOptions::default()).err().unwrap();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }

    #[test]
    fn empty_source_still_has_a_header() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("WorldData.csv");
        fs::write(&source, world_data(&[])).unwrap();
        let output = run(dir.path(), 2, 10);
        assert_eq!(output.rows, 0);
        assert_eq!(
            output.csv,
            "area_code_m49,item_code,element_code,year,unit_name,value,flag_code\n"
        );
    }

    #[test]
    fn countries_list_is_timestamped() {
        let dir = tempdir().unwrap();
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let refs = AreaRefs::default();
        let path = write_countries_list(dir.path(), &refs, at).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "countries_list_2024-03-09T14-05-07.csv"
        );
        assert_eq!(fs::read_to_string(path).unwrap(), "Area,Area Code (M49)\n");
    }
}
