//! Keg relocation: fixing placeholder paths after a pour.
//!
//! Bottles are built against placeholder roots (`@@HOMEBREW_PREFIX@@`,
//! `@@HOMEBREW_CELLAR@@`) so one artifact works in any prefix. After
//! staging, every text file gets the placeholders substituted with the live
//! paths; on macOS, Mach-O install names get the same treatment through
//! `install_name_tool`.

use crate::cellar::Layout;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const PREFIX_PLACEHOLDER: &str = "@@HOMEBREW_PREFIX@@";
pub const CELLAR_PLACEHOLDER: &str = "@@HOMEBREW_CELLAR@@";

/// Substitute placeholder roots throughout a staged keg.
pub fn relocate_keg(layout: &Layout, keg_path: &Path) -> Result<()> {
    let prefix = layout
        .prefix
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid prefix path"))?;
    let cellar = layout
        .cellar
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid cellar path"))?;

    let files = collect_files(keg_path);

    let results: Vec<Result<()>> = files
        .par_iter()
        .map(|file| relocate_file(file, prefix, cellar))
        .collect();

    for result in results {
        result?;
    }

    #[cfg(target_os = "macos")]
    fix_install_names(keg_path, prefix, cellar)?;

    Ok(())
}

fn collect_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .max_open(64)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect()
}

/// Replace placeholders in one file if it is text and contains any.
fn relocate_file(path: &Path, prefix: &str, cellar: &str) -> Result<()> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(_) => return Ok(()),
    };

    // Binary payloads are left to the platform-specific install-name pass.
    let Ok(text) = String::from_utf8(bytes) else {
        return Ok(());
    };

    if !text.contains(PREFIX_PLACEHOLDER) && !text.contains(CELLAR_PLACEHOLDER) {
        return Ok(());
    }

    let replaced = text
        .replace(CELLAR_PLACEHOLDER, cellar)
        .replace(PREFIX_PLACEHOLDER, prefix);

    let metadata = fs::metadata(path)?;
    fs::write(path, replaced)
        .with_context(|| format!("Failed to rewrite: {}", path.display()))?;
    // Preserve the execute bit tar restored.
    fs::set_permissions(path, metadata.permissions())?;

    Ok(())
}

#[cfg(target_os = "macos")]
fn fix_install_names(keg_path: &Path, prefix: &str, cellar: &str) -> Result<()> {
    use std::process::Command;

    let mach_o_files: Vec<PathBuf> = collect_files(keg_path)
        .into_par_iter()
        .filter(|path| is_mach_o(path))
        .collect();

    for path in &mach_o_files {
        let output = Command::new("otool")
            .arg("-L")
            .arg(path)
            .output()
            .context("Failed to run otool")?;

        let otool_output = String::from_utf8_lossy(&output.stdout);

        for line in otool_output.lines().skip(1) {
            let old_path = match line.trim().split('(').next() {
                Some(p) => p.trim(),
                None => continue,
            };

            if !old_path.contains(PREFIX_PLACEHOLDER) && !old_path.contains(CELLAR_PLACEHOLDER) {
                continue;
            }

            let new_path = old_path
                .replace(PREFIX_PLACEHOLDER, prefix)
                .replace(CELLAR_PLACEHOLDER, cellar);

            let result = Command::new("install_name_tool")
                .arg("-change")
                .arg(old_path)
                .arg(&new_path)
                .arg(path)
                .output()
                .context("Failed to run install_name_tool")?;

            if !result.status.success() {
                let stderr = String::from_utf8_lossy(&result.stderr);
                if !stderr.contains("warning:") {
                    tracing::warn!(
                        "failed to relocate {} in {}: {}",
                        old_path,
                        path.display(),
                        stderr
                    );
                }
            }
        }
    }

    Ok(())
}

/// Check the magic number without reading the whole file.
#[cfg(target_os = "macos")]
fn is_mach_o(path: &Path) -> bool {
    use std::io::Read;

    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut bytes = [0u8; 4];
    if file.read_exact(&mut bytes).is_err() {
        return false;
    }
    let magic = u32::from_ne_bytes(bytes);
    matches!(magic, 0xfeedface | 0xfeedfacf | 0xcefaedfe | 0xcffaedfe)
}
