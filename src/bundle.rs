// src/bundle.rs
//
// The raw sources usually arrive as one zip archive. Unpack it into the input
// directory before the run; entries whose path would leave that directory
// are refused.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};
use zip::ZipArchive;

use crate::error::BundleError;

/// Extract every file of `bundle` under `dest`, keeping relative paths.
/// Returns the extracted file paths in archive order.
#[instrument(level = "info", skip(bundle, dest), fields(bundle = %bundle.display(), dest = %dest.display()))]
pub fn extract_bundle(bundle: &Path, dest: &Path) -> Result<Vec<PathBuf>, BundleError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| BundleError::Io { path, source }
    };

    fs::create_dir_all(dest).map_err(io_err(dest))?;
    let file = File::open(bundle).map_err(io_err(bundle))?;
    let mut archive = ZipArchive::new(file)?;

    // validate all names first so a bad archive leaves nothing behind
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.enclosed_name().is_none() {
            return Err(BundleError::UnsafeEntry(entry.name().to_string()));
        }
    }

    let mut written = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            return Err(BundleError::UnsafeEntry(entry.name().to_string()));
        };
        let target = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(io_err(&target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut out = File::create(&target).map_err(io_err(&target))?;
        let bytes = io::copy(&mut entry, &mut out).map_err(io_err(&target))?;
        debug!(file = %target.display(), bytes, "extracted");
        written.push(target);
    }

    info!(files = written.len(), "bundle extracted");
    Ok(written)
}
