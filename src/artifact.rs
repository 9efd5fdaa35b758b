// src/artifact.rs
//
// Local-then-remote persistence of output tables. A table is written to a
// temporary file in the output directory and only renamed to its final name
// once complete; the upload starts strictly after that rename.

use arrow::{csv::WriterBuilder, record_batch::RecordBatch};
use std::{
    fs,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::error::{PersistenceError, SourceError};
use crate::store::ObjectStore;

/// A table that has been written locally and copied to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub local_path: PathBuf,
    pub remote_key: String,
    pub bytes: u64,
}

/// An artifact being written. Nothing is visible under the final name until
/// [`StagedArtifact::persist`] succeeds; dropping it discards the temp file.
pub struct StagedArtifact {
    name: String,
    final_path: PathBuf,
    file: BufWriter<NamedTempFile>,
}

impl StagedArtifact {
    /// Open a temporary file in `dir` (created if absent) for artifact `name`.
    pub fn create(dir: &Path, name: &str) -> Result<Self, PersistenceError> {
        let local = |source| PersistenceError::Local {
            path: dir.join(name),
            source,
        };
        fs::create_dir_all(dir).map_err(local)?;
        let tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(local)?;

        Ok(Self {
            name: name.to_string(),
            final_path: dir.join(name),
            file: BufWriter::new(tmp),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Flush and atomically move the file to its final name.
    pub fn persist(self) -> Result<PathBuf, PersistenceError> {
        let final_path = self.final_path;
        let local = |source| PersistenceError::Local {
            path: final_path.clone(),
            source,
        };

        let tmp = self.file.into_inner().map_err(|e| local(e.into_error()))?;
        tmp.as_file().sync_all().map_err(local)?;
        tmp.persist(&final_path).map_err(|e| local(e.error))?;
        Ok(final_path)
    }
}

fn encode_error(artifact: &str, source: impl Into<SourceError>) -> PersistenceError {
    PersistenceError::Encode {
        artifact: artifact.to_string(),
        source: source.into(),
    }
}

fn write_csv<W, I, R, T>(writer: W, header: &[&str], rows: I) -> csv::Result<()>
where
    W: Write,
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

impl Write for StagedArtifact {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Writes tables to `output_dir`, then copies each to `store` under its file name.
#[derive(Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
    store: Arc<dyn ObjectStore>,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            output_dir: output_dir.into(),
            store,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn stage(&self, name: &str) -> Result<StagedArtifact, PersistenceError> {
        StagedArtifact::create(&self.output_dir, name)
    }

    /// Remove whatever an earlier run left under `name` in the output
    /// directory, so a failing branch cannot leave a stale file behind.
    pub async fn discard(&self, name: &str) -> Result<(), PersistenceError> {
        let path = self.output_dir.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed previous output");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Local { path, source }),
        }
    }

    /// Make a staged artifact visible locally, then upload it.
    #[instrument(level = "info", skip(self, staged), fields(artifact = %staged.name()))]
    pub async fn publish(&self, staged: StagedArtifact) -> Result<Artifact, PersistenceError> {
        let name = staged.name().to_string();
        let final_path = staged.final_path().to_path_buf();

        // flush + fsync + rename off the async workers
        let (local_path, bytes) = tokio::task::spawn_blocking(move || {
            let local_path = staged.persist()?;
            let bytes = fs::metadata(&local_path)
                .map_err(|source| PersistenceError::Local {
                    path: local_path.clone(),
                    source,
                })?
                .len();
            Ok::<_, PersistenceError>((local_path, bytes))
        })
        .await
        .map_err(|e| PersistenceError::Local {
            path: final_path,
            source: io::Error::other(e),
        })??;

        self.store
            .put_object(&local_path, &name)
            .await
            .map_err(|source| PersistenceError::Remote {
                key: name.clone(),
                source,
            })?;

        info!(
            bytes,
            local = %local_path.display(),
            remote = %self.store.location(&name),
            "artifact published"
        );
        Ok(Artifact {
            remote_key: name.clone(),
            name,
            local_path,
            bytes,
        })
    }

    /// Write one record batch as CSV with a header row.
    pub async fn write_batch(
        &self,
        name: &str,
        batch: &RecordBatch,
    ) -> Result<Artifact, PersistenceError> {
        let staged = self.stage(name)?;
        let mut writer = WriterBuilder::new().with_header(true).build(staged);
        writer.write(batch).map_err(|e| encode_error(name, e))?;
        let staged = writer.into_inner();
        self.publish(staged).await
    }

    /// Write string rows under an explicit header. The header is written
    /// even when there are no rows.
    pub async fn write_rows<I, R, T>(
        &self,
        name: &str,
        header: &[&str],
        rows: I,
    ) -> Result<Artifact, PersistenceError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut staged = self.stage(name)?;
        write_csv(&mut staged, header, rows).map_err(|e| encode_error(name, e))?;
        self.publish(staged).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::build_text_schema;
    use crate::store::LocalStore;
    use arrow::array::StringArray;
    use tempfile::tempdir;

    #[test]
    fn staged_file_is_invisible_until_persisted() {
        let dir = tempdir().unwrap();
        let mut staged = StagedArtifact::create(&dir.path().join("out"), "dim_flag.csv").unwrap();
        staged.write_all(b"flag,description\n").unwrap();
        assert!(!dir.path().join("out/dim_flag.csv").exists());

        let path = staged.persist().unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "flag,description\n");
    }

    #[test]
    fn dropped_stage_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        {
            let mut staged = StagedArtifact::create(dir.path(), "fact_world_data.csv").unwrap();
            staged.write_all(b"partial").unwrap();
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn write_batch_lands_locally_and_remotely() {
        let out = tempdir().unwrap();
        let bucket = tempdir().unwrap();
        let writer = ArtifactWriter::new(out.path(), Arc::new(LocalStore::new(bucket.path())));

        let batch = RecordBatch::try_new(
            build_text_schema(&["unit_name", "description"]),
            vec![
                Arc::new(StringArray::from(vec!["kg", "t"])),
                Arc::new(StringArray::from(vec!["Kilogram", "Tonnes"])),
            ],
        )
        .unwrap();

        let artifact = writer.write_batch("dim_unit.csv", &batch).await.unwrap();
        let expected = "unit_name,description\nkg,Kilogram\nt,Tonnes\n";
        assert_eq!(fs::read_to_string(&artifact.local_path).unwrap(), expected);
        assert_eq!(artifact.bytes, expected.len() as u64);
        assert_eq!(
            fs::read_to_string(bucket.path().join("dim_unit.csv")).unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn discard_removes_previous_output_only() {
        let out = tempdir().unwrap();
        let bucket = tempdir().unwrap();
        let writer = ArtifactWriter::new(out.path(), Arc::new(LocalStore::new(bucket.path())));
        fs::write(out.path().join("dim_flag.csv"), "flag,description\nA,Official\n").unwrap();
        fs::write(out.path().join("dim_unit.csv"), "unit_name\n").unwrap();

        writer.discard("dim_flag.csv").await.unwrap();
        // nothing to remove is fine
        writer.discard("dim_flag.csv").await.unwrap();

        assert!(!out.path().join("dim_flag.csv").exists());
        assert!(out.path().join("dim_unit.csv").exists());
    }

    #[tokio::test]
    async fn write_rows_keeps_header_for_empty_tables() {
        let out = tempdir().unwrap();
        let bucket = tempdir().unwrap();
        let writer = ArtifactWriter::new(out.path(), Arc::new(LocalStore::new(bucket.path())));

        let rows: Vec<Vec<&str>> = Vec::new();
        let artifact = writer
            .write_rows("dim_country_info.csv", &["code", "name_common"], rows)
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(&artifact.local_path).unwrap(),
            "code,name_common\n"
        );
    }
}
