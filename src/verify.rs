// src/verify.rs
//
// Post-load checks over every produced artifact: present locally, non-empty,
// listed in the object store, and for selected artifacts a plausible number
// of rows. Problems are reported as values; nothing here returns an error.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

use crate::artifact::Artifact;
use crate::store::ObjectStore;

/// Where an artifact should be, locally and remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub name: String,
    pub local_path: PathBuf,
    pub remote_key: String,
    /// False when the branch that owns the artifact failed or was skipped;
    /// whatever is found at its locations then predates the run.
    pub produced: bool,
}

impl ArtifactDescriptor {
    /// Descriptor for an artifact named `name` written into `output_dir` and
    /// stored under the same key.
    pub fn in_dir(output_dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            local_path: output_dir.join(name),
            remote_key: name.to_string(),
            produced: true,
        }
    }

    /// Expected location of an artifact the run did not produce.
    pub fn not_produced(output_dir: &Path, name: &str) -> Self {
        Self {
            produced: false,
            ..Self::in_dir(output_dir, name)
        }
    }
}

impl From<&Artifact> for ArtifactDescriptor {
    fn from(a: &Artifact) -> Self {
        Self {
            name: a.name.clone(),
            local_path: a.local_path.clone(),
            remote_key: a.remote_key.clone(),
            produced: true,
        }
    }
}

/// Lower bound on data rows (header excluded) for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowExpectation {
    pub artifact: String,
    pub min_rows: u64,
}

impl RowExpectation {
    /// `ceil(distinct × ratio)` rows, e.g. the share of looked-up codes that
    /// must come back from enrichment.
    pub fn at_least_share(artifact: &str, distinct: usize, ratio: f64) -> Self {
        let min_rows = (distinct as f64 * ratio.clamp(0.0, 1.0)).ceil() as u64;
        Self {
            artifact: artifact.to_string(),
            min_rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCheck {
    pub name: String,
    pub produced: bool,
    pub exists: bool,
    pub non_empty: bool,
    pub uploaded: bool,
    /// Counted only when a [`RowExpectation`] names this artifact.
    pub rows: Option<u64>,
    pub min_rows: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationDefect {
    NotProduced { artifact: String },
    Missing { artifact: String },
    Empty { artifact: String },
    NotUploaded { artifact: String },
    ImplausibleRowCount {
        artifact: String,
        rows: u64,
        min_rows: u64,
    },
}

impl fmt::Display for VerificationDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationDefect::NotProduced { artifact } => {
                write!(f, "{artifact}: not produced by this run")
            }
            VerificationDefect::Missing { artifact } => write!(f, "{artifact}: missing locally"),
            VerificationDefect::Empty { artifact } => write!(f, "{artifact}: file is empty"),
            VerificationDefect::NotUploaded { artifact } => {
                write!(f, "{artifact}: not found in object store")
            }
            VerificationDefect::ImplausibleRowCount {
                artifact,
                rows,
                min_rows,
            } => write!(f, "{artifact}: {rows} rows, expected at least {min_rows}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub checks: Vec<ArtifactCheck>,
}

impl VerificationReport {
    pub fn defects(&self) -> Vec<VerificationDefect> {
        let mut out = Vec::new();
        for c in &self.checks {
            let artifact = || c.name.clone();
            if !c.produced {
                out.push(VerificationDefect::NotProduced {
                    artifact: artifact(),
                });
            }
            if !c.exists {
                out.push(VerificationDefect::Missing {
                    artifact: artifact(),
                });
            } else if !c.non_empty {
                out.push(VerificationDefect::Empty {
                    artifact: artifact(),
                });
            }
            if !c.uploaded {
                out.push(VerificationDefect::NotUploaded {
                    artifact: artifact(),
                });
            }
            if let (Some(rows), Some(min_rows)) = (c.rows, c.min_rows) {
                if rows < min_rows {
                    out.push(VerificationDefect::ImplausibleRowCount {
                        artifact: artifact(),
                        rows,
                        min_rows,
                    });
                }
            }
        }
        out
    }

    pub fn is_clean(&self) -> bool {
        self.defects().is_empty()
    }

    pub fn check(&self, name: &str) -> Option<&ArtifactCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "NO"
    }
}

/// Plain-text table, one line per artifact.
impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .checks
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(8)
            .max("artifact".len());
        writeln!(
            f,
            "{:<width$}  {:>8}  {:>6}  {:>9}  {:>8}  {:>10}",
            "artifact", "produced", "exists", "non_empty", "uploaded", "rows"
        )?;
        for c in &self.checks {
            let rows = match (c.rows, c.min_rows) {
                (Some(r), Some(m)) => format!("{r}/>={m}"),
                (Some(r), None) => r.to_string(),
                _ => "-".to_string(),
            };
            writeln!(
                f,
                "{:<width$}  {:>8}  {:>6}  {:>9}  {:>8}  {:>10}",
                c.name,
                yes_no(c.produced),
                yes_no(c.exists),
                yes_no(c.non_empty),
                yes_no(c.uploaded),
                rows
            )?;
        }
        Ok(())
    }
}

/// Data rows in a CSV file, header excluded. Unreadable files count as zero.
fn count_rows(path: &Path) -> u64 {
    let mut rdr = match csv::Reader::from_path(path) {
        Ok(r) => r,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot open for row count");
            return 0;
        }
    };
    let mut rows = 0;
    for rec in rdr.byte_records() {
        match rec {
            Ok(_) => rows += 1,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "row count stopped at bad record");
                break;
            }
        }
    }
    rows
}

/// Local facts about one file: (exists, non_empty, rows when requested).
fn inspect_local(path: &Path, count: bool) -> (bool, bool, Option<u64>) {
    let meta = fs::metadata(path).ok().filter(|m| m.is_file());
    let exists = meta.is_some();
    let non_empty = meta.map(|m| m.len() > 0).unwrap_or(false);
    let rows = count.then(|| if exists { count_rows(path) } else { 0 });
    (exists, non_empty, rows)
}

async fn is_uploaded(store: &dyn ObjectStore, key: &str) -> bool {
    match store.list_objects(key).await {
        Ok(keys) => keys.iter().any(|k| k == key),
        Err(e) => {
            warn!(key, error = %e, "listing failed, treating as not uploaded");
            false
        }
    }
}

/// Check every descriptor. All three properties are evaluated for each
/// artifact regardless of the others.
#[instrument(level = "info", skip_all, fields(artifacts = descriptors.len()))]
pub async fn verify(
    descriptors: &[ArtifactDescriptor],
    store: &dyn ObjectStore,
    expectations: &[RowExpectation],
) -> VerificationReport {
    let mut checks = Vec::with_capacity(descriptors.len());

    for d in descriptors {
        let min_rows = expectations
            .iter()
            .find(|e| e.artifact == d.name)
            .map(|e| e.min_rows);

        let path = d.local_path.clone();
        let count = min_rows.is_some();
        let (exists, non_empty, rows) =
            match tokio::task::spawn_blocking(move || inspect_local(&path, count)).await {
                Ok(local) => local,
                Err(e) => {
                    warn!(artifact = %d.name, error = %e, "local check did not complete");
                    (false, false, count.then_some(0))
                }
            };
        let uploaded = is_uploaded(store, &d.remote_key).await;

        checks.push(ArtifactCheck {
            name: d.name.clone(),
            produced: d.produced,
            exists,
            non_empty,
            uploaded,
            rows,
            min_rows,
        });
    }

    let report = VerificationReport { checks };
    let defects = report.defects();
    for defect in &defects {
        warn!(%defect, "verification defect");
    }
    info!(defects = defects.len(), "verification finished");
    report
}
