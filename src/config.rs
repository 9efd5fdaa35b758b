// src/config.rs
//
// Run configuration. Loaded once by the binary from an optional YAML file,
// overridden by command-line flags, validated, then passed down explicitly.

use clap::Args;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{info, instrument};
use url::Url;

use crate::error::ConfigError;
use crate::fetch::{EnrichmentOptions, DEFAULT_BASE_URL};
use crate::process::{fact::FactOptions, resolve_encoding};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub storage: StorageConfig,
    pub enrichment: EnrichmentConfig,
    pub fact: FactConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            storage: StorageConfig::default(),
            enrichment: EnrichmentConfig::default(),
            fact: FactConfig::default(),
        }
    }
}

/// Where published artifacts are copied.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    Gcs {
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
        /// Service-account key; application default credentials when unset.
        #[serde(default)]
        credentials_file: Option<PathBuf>,
    },
    Local {
        root: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            root: PathBuf::from("store"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub concurrency: usize,
    /// Share of looked-up codes that must resolve for the country table to
    /// pass verification.
    pub min_resolved_ratio: f64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
            concurrency: 1,
            min_resolved_ratio: 0.5,
        }
    }
}

impl EnrichmentConfig {
    pub fn options(&self) -> Result<EnrichmentOptions, ConfigError> {
        let base_url = Url::parse(&self.base_url).map_err(|e| ConfigError::BaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::BaseUrl {
                url: self.base_url.clone(),
                reason: "not a hierarchical url".to_string(),
            });
        }
        Ok(EnrichmentOptions {
            base_url,
            timeout: Duration::from_secs(self.timeout_secs),
            concurrency: self.concurrency,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FactConfig {
    pub encoding: String,
    pub chunk_rows: usize,
    pub partitions: usize,
}

impl Default for FactConfig {
    fn default() -> Self {
        Self {
            encoding: "windows-1252".to_string(),
            chunk_rows: 100_000,
            partitions: num_cpus::get(),
        }
    }
}

impl FactConfig {
    pub fn options(&self) -> Result<FactOptions, ConfigError> {
        Ok(FactOptions {
            encoding: resolve_encoding(&self.encoding)?,
            chunk_rows: self.chunk_rows,
            partitions: self.partitions,
        })
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

impl PipelineConfig {
    /// Parse a YAML document. Every field is optional.
    pub fn from_yaml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str::<Option<Self>>(text)
            .map(Option::unwrap_or_default)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    #[instrument(level = "info")]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(path, &text)?;
        info!(
            input = %config.input_dir.display(),
            output = %config.output_dir.display(),
            "config loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fact.chunk_rows == 0 {
            return Err(invalid("fact.chunk_rows", "must be at least 1"));
        }
        if self.fact.partitions == 0 {
            return Err(invalid("fact.partitions", "must be at least 1"));
        }
        if self.enrichment.timeout_secs == 0 {
            return Err(invalid("enrichment.timeout_secs", "must be at least 1"));
        }
        if self.enrichment.concurrency == 0 {
            return Err(invalid("enrichment.concurrency", "must be at least 1"));
        }
        let ratio = self.enrichment.min_resolved_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(invalid(
                "enrichment.min_resolved_ratio",
                "must be between 0 and 1",
            ));
        }
        if let StorageConfig::Gcs { bucket, .. } = &self.storage {
            if bucket.trim().is_empty() {
                return Err(invalid("storage.bucket", "must not be empty"));
            }
        }
        self.fact.options()?;
        self.enrichment.options()?;
        Ok(())
    }
}

/// Command-line layer over the config file, shared by both binaries.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// YAML config file; built-in defaults when omitted
    #[arg(long, env = "WORLDSTAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the raw source CSV files
    #[arg(long, env = "WORLDSTAR_INPUT_DIR")]
    pub input_dir: Option<PathBuf>,

    /// Directory the artifacts are written to
    #[arg(long, env = "WORLDSTAR_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// GCS bucket to publish to
    #[arg(long, env = "WORLDSTAR_BUCKET", conflicts_with = "local_store")]
    pub bucket: Option<String>,

    /// Optional prefix inside the bucket
    #[arg(long, env = "WORLDSTAR_PREFIX")]
    pub prefix: Option<String>,

    /// Publish into a local directory instead of a bucket
    #[arg(long)]
    pub local_store: Option<PathBuf>,
}

impl ConfigArgs {
    /// Load the file (if any), apply flags, validate.
    pub fn resolve(&self) -> Result<PipelineConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.input_dir {
            config.input_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(root) = &self.local_store {
            config.storage = StorageConfig::Local { root: root.clone() };
        }
        if let Some(bucket) = &self.bucket {
            let (old_prefix, credentials_file) = match &config.storage {
                StorageConfig::Gcs {
                    prefix,
                    credentials_file,
                    ..
                } => (prefix.clone(), credentials_file.clone()),
                StorageConfig::Local { .. } => (None, None),
            };
            config.storage = StorageConfig::Gcs {
                bucket: bucket.clone(),
                prefix: old_prefix,
                credentials_file,
            };
        }
        if let (Some(new), StorageConfig::Gcs { prefix, .. }) = (&self.prefix, &mut config.storage) {
            *prefix = Some(new.clone());
        }
    }
}
