// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

use crate::process::codes::EntityCode;

/// Errors that abort one branch of the pipeline (one table, one artifact or
/// the enrichment stage). None of these abort the whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("schema mismatch in {table}: column `{column}` not found")]
    SchemaMismatch { table: String, column: String },

    #[error("reading source {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: SourceError,
    },

    #[error("unknown source encoding `{0}`")]
    UnknownEncoding(String),

    #[error("enrichment service unreachable: none of {attempted} lookups got a response")]
    EnrichmentUnreachable { attempted: usize },

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Low-level failures while reading a raw source table.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("source has no header row")]
    NoHeader,
}

impl PipelineError {
    pub(crate) fn reading(path: impl Into<PathBuf>, err: impl Into<SourceError>) -> Self {
        PipelineError::Source {
            path: path.into(),
            source: err.into(),
        }
    }
}

/// Writing an artifact either failed locally or while copying it to the store.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("writing {}: {source}", path.display())]
    Local {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoding {artifact}: {source}")]
    Encode {
        artifact: String,
        #[source]
        source: SourceError,
    },

    #[error("uploading {key}: {source}")]
    Remote {
        key: String,
        #[source]
        source: StorageError,
    },
}

/// Object store failures, independent of the backing technology.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("gcs: {0}")]
    Gcs(#[from] google_cloud_storage::http::Error),

    #[error("gcs auth: {0}")]
    Auth(String),
}

/// Why one entity lookup produced no record. Always recoverable.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("{code}: service answered {status}")]
    Status {
        code: EntityCode,
        status: reqwest::StatusCode,
    },

    #[error("{code}: request failed: {source}")]
    Transport {
        code: EntityCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("{code}: undecodable body: {source}")]
    Body {
        code: EntityCode,
        #[source]
        source: reqwest::Error,
    },
}

impl EnrichmentError {
    /// True when the service never answered (timeout, DNS, refused connection).
    pub fn is_transport(&self) -> bool {
        matches!(self, EnrichmentError::Transport { .. })
    }
}

/// Startup problems: these stop the run before any branch starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid enrichment base url `{url}`: {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("building http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Unpacking the raw input archive failed.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("bundle I/O at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error("bundle entry `{0}` would be written outside the input directory")]
    UnsafeEntry(String),
}
