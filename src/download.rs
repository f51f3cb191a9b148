//! Bottle fetching with checksum verification and a local cache.
//!
//! This module downloads prebuilt bottles described by a formula's
//! [`BottleSpec`], with support for:
//! - **Checksum verification**: SHA256 validation of every download
//! - **Caching**: a bottle already on disk with a matching checksum is
//!   reused without touching the network
//! - **Progress tracking**: a visual progress bar unless quiet mode is on
//!
//! # Architecture
//!
//! Bottles are stored in the layout's cache directory:
//! ```text
//! <cache>/downloads/
//!   ripgrep--14.1.0.bottle.tar.gz
//!   openssl--3.3.1.bottle.tar.gz
//! ```
//!
//! The fetch sequence:
//! 1. Check whether the bottle is already cached and verified
//! 2. Stream the archive from the descriptor's URL
//! 3. Verify the SHA256 checksum against the descriptor
//! 4. Return the path to the cached archive
//!
//! A cached file that fails revalidation is deleted and re-downloaded; a
//! checksum mismatch on a *fresh* download is fatal and the file is
//! removed.
//!
//! # Examples
//!
//! ```no_run
//! use keghouse::{download, Formula, Layout};
//!
//! fn main() -> anyhow::Result<()> {
//!     let layout = Layout::detect();
//!     let formula = Formula::new("ripgrep", "14.1.0");
//!     let bottle = formula.bottle.clone().expect("has a bottle");
//!
//!     let archive = download::fetch_bottle(&layout, &formula, &bottle, false)?;
//!     println!("Downloaded to: {}", archive.display());
//!
//!     Ok(())
//! }
//! ```

use crate::cellar::Layout;
use crate::error::{KegError, Result};
use crate::formula::{BottleSpec, Formula};
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Compute the SHA256 of a file, streaming in 64 KiB chunks.
///
/// The whole file is never held in memory, so this is safe to run on
/// multi-hundred-megabyte bottles.
///
/// # Examples
///
/// ```no_run
/// use keghouse::download::file_sha256;
/// use std::path::Path;
///
/// fn main() -> anyhow::Result<()> {
///     let sum = file_sha256(Path::new("/tmp/bottle.tar.gz"))?;
///     println!("sha256: {sum}");
///     Ok(())
/// }
/// ```
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .with_context(|| format!("Failed to open for checksum: {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 65536];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn checksum_matches(path: &Path, expected: &str) -> bool {
    file_sha256(path).map(|sum| sum == expected).unwrap_or(false)
}

/// Fetch a formula's bottle into the cache, verifying integrity.
///
/// # Arguments
///
/// * `layout` - Filesystem roots; the archive lands in `layout.cache_dir()`
/// * `formula` - Names the cache entry (`<name>--<version>.bottle.tar.gz`)
/// * `bottle` - The descriptor carrying the URL and expected SHA256
/// * `quiet` - Suppress the progress bar
///
/// # Returns
///
/// The path to the verified archive in the cache.
///
/// # Errors
///
/// Returns an error if:
/// - The network request fails or the server returns a non-success status
/// - The cache directory cannot be created or written
/// - The downloaded archive's SHA256 does not match the descriptor
///   ([`KegError::ChecksumMismatch`]; the corrupt file is removed first)
///
/// # Caching behavior
///
/// - A cached bottle passing checksum verification is returned
///   immediately without downloading
/// - A cached bottle failing verification is deleted and re-downloaded
/// - The cache directory is safe to clear manually at any time
///
/// # Examples
///
/// ```no_run
/// use keghouse::{download, Formula, Layout};
///
/// fn main() -> anyhow::Result<()> {
///     let layout = Layout::detect();
///     let formula = Formula::new("jq", "1.7.1");
///     let bottle = formula.bottle.clone().expect("has a bottle");
///
///     let archive = download::fetch_bottle(&layout, &formula, &bottle, true)?;
///     println!("Verified archive at {}", archive.display());
///     Ok(())
/// }
/// ```
pub fn fetch_bottle(
    layout: &Layout,
    formula: &Formula,
    bottle: &BottleSpec,
    quiet: bool,
) -> Result<PathBuf> {
    let cache = layout.cache_dir();
    fs::create_dir_all(&cache)
        .with_context(|| format!("Failed to create cache directory: {}", cache.display()))?;

    let filename = format!("{}--{}.bottle.tar.gz", formula.name, formula.version);
    let output_path = cache.join(filename);

    if output_path.exists() {
        if checksum_matches(&output_path, &bottle.sha256) {
            return Ok(output_path);
        }
        fs::remove_file(&output_path)?;
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(format!("keghouse/{}", env!("CARGO_PKG_VERSION")))
        .build()?;

    let mut response = client.get(&bottle.url).send()?.error_for_status()?;

    let pb = if quiet {
        None
    } else {
        let pb = ProgressBar::new(response.content_length().unwrap_or(0));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━━╸"),
        );
        pb.set_message(format!("Downloading {}", formula.name));
        Some(pb)
    };

    let mut file = fs::File::create(&output_path)
        .with_context(|| format!("Failed to create: {}", output_path.display()))?;
    let mut buffer = vec![0u8; 65536];
    let mut downloaded: u64 = 0;

    loop {
        let n = response.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])?;
        downloaded += n as u64;
        if let Some(pb) = &pb {
            pb.set_position(downloaded);
        }
    }
    file.flush()?;

    if let Some(pb) = &pb {
        pb.finish_with_message(format!("✓ {}", formula.name));
    }

    let actual = file_sha256(&output_path)?;
    if actual != bottle.sha256 {
        fs::remove_file(&output_path)?;
        return Err(KegError::ChecksumMismatch {
            url: bottle.url.clone(),
            expected: bottle.sha256.clone(),
            actual,
        });
    }

    Ok(output_path)
}
