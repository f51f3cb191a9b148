//! Bottle staging: unpacking an archive into the Cellar.
//!
//! Bottle archives contain `<formula>/<version>/...` (possibly with a
//! bottle-revision suffix on the version, `1.0.0_1`), so unpacking into the
//! Cellar root lands the keg in place.

use crate::cellar::Layout;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs;
use std::path::{Path, PathBuf};
use tar::Archive;

/// Unpack a bottle into the Cellar; returns the staged keg directory.
pub fn stage_bottle(layout: &Layout, archive_path: &Path, name: &str, version: &str) -> Result<PathBuf> {
    if !layout.cellar.exists() {
        fs::create_dir_all(&layout.cellar).with_context(|| {
            format!("Failed to create Cellar directory: {}", layout.cellar.display())
        })?;
    }

    let file = fs::File::open(archive_path)
        .with_context(|| format!("Failed to open bottle: {}", archive_path.display()))?;
    let decompressor = GzDecoder::new(file);
    let mut archive = Archive::new(decompressor);

    archive
        .unpack(&layout.cellar)
        .with_context(|| format!("Failed to extract bottle to: {}", layout.cellar.display()))?;

    let rack = layout.rack(name);
    let staged = if rack.join(version).exists() {
        rack.join(version)
    } else {
        // The archive may carry a bottle revision suffix (version_N).
        let suffixed = fs::read_dir(&rack)
            .with_context(|| format!("Failed to read rack: {}", rack.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name())
            .find(|entry_name| {
                let s = entry_name.to_string_lossy();
                s.starts_with(version)
                    && (s == version || s.starts_with(&format!("{version}_")))
            })
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Extraction produced no directory matching version {} in {}",
                    version,
                    rack.display()
                )
            })?;
        rack.join(suffixed)
    };

    if !staged.exists() {
        anyhow::bail!("Extraction failed: path does not exist: {}", staged.display());
    }

    Ok(staged)
}
