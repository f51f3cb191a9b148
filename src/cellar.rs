//! Cellar layout and installed-keg inspection.
//!
//! The Cellar is where every installed version of every formula lives, one
//! directory per version ("keg"). It sits under the shared prefix:
//! - **macOS (Apple Silicon)**: `/opt/homebrew/Cellar/`
//! - **macOS (Intel)**: `/usr/local/Cellar/`
//! - **Linux**: usually `/opt/homebrew/Cellar/` or a linuxbrew prefix
//!
//! Each installed formula has the structure:
//! ```text
//! <prefix>/Cellar/
//!   ripgrep/                    # rack
//!     13.0.0/                   # keg
//!       bin/
//!       lib/
//!       INSTALL_RECEIPT.json
//!     14.1.0/
//!       ...
//!   opt/ripgrep -> Cellar/ripgrep/14.1.0
//! ```
//!
//! All path arithmetic goes through a [`Layout`] value so that the whole
//! engine can be pointed at a throwaway prefix in tests instead of the live
//! system prefix.
//!
//! # Examples
//!
//! ```no_run
//! use keghouse::Layout;
//!
//! fn main() -> anyhow::Result<()> {
//!     let layout = Layout::detect();
//!     println!("prefix: {}", layout.prefix.display());
//!
//!     // Every installed version of a formula, newest first.
//!     for keg in layout.installed_kegs("python")? {
//!         println!("  {} {}", keg.name, keg.version);
//!     }
//!
//!     Ok(())
//! }
//! ```

use crate::error::Result;
use anyhow::Context;
use std::fs;
use std::path::PathBuf;

/// Filesystem roots the installer operates on.
///
/// `prefix` is the shared tree kegs are symlinked into, `cellar` houses
/// the kegs themselves, and `cache` receives downloaded bottles. The
/// value is cheap to clone and threaded everywhere a path is computed;
/// nothing in the engine consults a global path.
#[derive(Debug, Clone)]
pub struct Layout {
    pub prefix: PathBuf,
    pub cellar: PathBuf,
    pub cache: PathBuf,
}

impl Layout {
    /// Detect the live prefix on this system.
    ///
    /// The detection order is:
    /// 1. `HOMEBREW_PREFIX` environment variable (if set)
    /// 2. Architecture default (aarch64 → `/opt/homebrew`, otherwise
    ///    `/usr/local`)
    ///
    /// The Cellar honors `HOMEBREW_CELLAR` the same way, and the download
    /// cache follows `XDG_CACHE_HOME`/`HOME`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use keghouse::Layout;
    ///
    /// let layout = Layout::detect();
    /// println!("Prefix: {}", layout.prefix.display());
    /// // Output: "/opt/homebrew" (on Apple Silicon)
    /// // Output: "/usr/local" (on Intel)
    /// ```
    pub fn detect() -> Self {
        let prefix = if let Ok(prefix) = std::env::var("HOMEBREW_PREFIX") {
            PathBuf::from(prefix)
        } else {
            #[cfg(target_arch = "aarch64")]
            {
                PathBuf::from("/opt/homebrew")
            }
            #[cfg(not(target_arch = "aarch64"))]
            {
                PathBuf::from("/usr/local")
            }
        };

        let cellar = if let Ok(cellar) = std::env::var("HOMEBREW_CELLAR") {
            PathBuf::from(cellar)
        } else {
            prefix.join("Cellar")
        };

        let cache = if let Some(cache_home) = std::env::var_os("XDG_CACHE_HOME") {
            PathBuf::from(cache_home).join("keghouse")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".cache/keghouse")
        } else {
            prefix.join(".cache/keghouse")
        };

        Layout {
            prefix,
            cellar,
            cache,
        }
    }

    /// A layout rooted at an arbitrary prefix. The Cellar sits at
    /// `<prefix>/Cellar` and the download cache at `<prefix>/Cache`.
    ///
    /// This is what the test suite uses to run complete installs against
    /// a temporary directory without touching the system prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use keghouse::Layout;
    /// use std::path::Path;
    ///
    /// let layout = Layout::at("/tmp/sandbox");
    /// assert_eq!(layout.cellar, Path::new("/tmp/sandbox/Cellar"));
    /// ```
    pub fn at(prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        let cellar = prefix.join("Cellar");
        let cache = prefix.join("Cache");
        Layout {
            prefix,
            cellar,
            cache,
        }
    }

    /// `Cellar/<name>` — parent of every installed version of a formula.
    ///
    /// The rack exists as long as at least one keg does; removing the
    /// last keg removes the rack too.
    pub fn rack(&self, name: &str) -> PathBuf {
        self.cellar.join(name)
    }

    /// `Cellar/<name>/<version>` — one keg.
    ///
    /// # Examples
    ///
    /// ```
    /// use keghouse::Layout;
    /// use std::path::Path;
    ///
    /// let layout = Layout::at("/opt/homebrew");
    /// assert_eq!(
    ///     layout.keg_prefix("jq", "1.7"),
    ///     Path::new("/opt/homebrew/Cellar/jq/1.7")
    /// );
    /// ```
    pub fn keg_prefix(&self, name: &str, version: &str) -> PathBuf {
        self.rack(name).join(version)
    }

    /// `opt/<name>` — the stable symlink alias for the active keg.
    ///
    /// Dependents reference this path instead of a versioned keg path so
    /// upgrades don't break them.
    pub fn opt_prefix(&self, name: &str) -> PathBuf {
        self.prefix.join("opt").join(name)
    }

    /// `<keg>/.bottle` — staging subtree inside a freshly extracted
    /// bottle, holding the `etc`/`var` templates the build produced.
    /// Merged into the prefix and removed during a pour.
    pub fn bottle_prefix(&self, name: &str, version: &str) -> PathBuf {
        self.keg_prefix(name, version).join(".bottle")
    }

    /// `var/log/<name>` — per-formula build logs.
    pub fn logs(&self, name: &str) -> PathBuf {
        self.prefix.join("var").join("log").join(name)
    }

    /// `var/homebrew/locks` — advisory lock files, one per formula.
    pub fn locks_dir(&self) -> PathBuf {
        self.prefix.join("var").join("homebrew").join("locks")
    }

    /// Download cache for bottles.
    ///
    /// Safe to clear manually; bottles are re-downloaded (and
    /// re-verified) on next use.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache.join("downloads")
    }

    /// Is any version of this formula installed?
    ///
    /// Cheaper than asking which version when only presence matters (the
    /// unlinked-dependency preflight gate, conflict checks).
    pub fn installed(&self, name: &str) -> bool {
        !self.installed_kegs(name).unwrap_or_default().is_empty()
    }
}

/// One installed version of one formula, as found on disk.
#[derive(Debug, Clone)]
pub struct InstalledKeg {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

impl Layout {
    /// All installed versions of a formula, newest first.
    ///
    /// # Arguments
    ///
    /// * `name` - The formula name (e.g. `"python"`, `"ripgrep"`)
    ///
    /// # Returns
    ///
    /// - Empty `Vec` if the formula is not installed
    /// - Otherwise one [`InstalledKeg`] per version directory, sorted so
    ///   index 0 is always the newest version
    ///
    /// # Errors
    ///
    /// Returns an error if the rack directory cannot be read (e.g.
    /// permission denied). A missing rack is not an error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use keghouse::Layout;
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let layout = Layout::detect();
    ///     let versions = layout.installed_kegs("python")?;
    ///     if let Some(newest) = versions.first() {
    ///         println!("Latest installed: {}", newest.version);
    ///     } else {
    ///         println!("python is not installed");
    ///     }
    ///
    ///     Ok(())
    /// }
    /// ```
    ///
    /// # Sorting
    ///
    /// Versions are compared semantically (`1.10.0` > `1.9.0`), so the
    /// first element is the newest regardless of directory order.
    pub fn installed_kegs(&self, name: &str) -> Result<Vec<InstalledKeg>> {
        let rack = self.rack(name);

        if !rack.exists() {
            return Ok(vec![]);
        }

        let mut kegs = Vec::new();

        for entry in fs::read_dir(&rack)
            .with_context(|| format!("Failed to read rack: {}", rack.display()))?
        {
            let entry = entry?;
            let version = entry.file_name().to_string_lossy().to_string();

            if version.starts_with('.') {
                continue;
            }

            kegs.push(InstalledKeg {
                name: name.to_string(),
                version,
                path: entry.path(),
            });
        }

        kegs.sort_by(|a, b| compare_versions(&a.version, &b.version));
        kegs.reverse();

        Ok(kegs)
    }
}

/// Compare two version strings semantically; falls back to lexicographic
/// for non-numeric components.
///
/// Dotted components are compared numerically position by position, with
/// missing positions treated as zero, so `2.0` equals `2.0.0` and
/// `1.10.0` is newer than `1.9.0` (where a plain string compare would
/// get it wrong).
///
/// # Examples
///
/// ```
/// use keghouse::cellar::compare_versions;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
/// assert_eq!(compare_versions("2.0", "2.0.0"), Ordering::Equal);
/// ```
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let a_parts: Vec<u32> = a.split('.').filter_map(|s| s.parse::<u32>().ok()).collect();
    let b_parts: Vec<u32> = b.split('.').filter_map(|s| s.parse::<u32>().ok()).collect();

    for i in 0..a_parts.len().max(b_parts.len()) {
        let a_part = a_parts.get(i).unwrap_or(&0);
        let b_part = b_parts.get(i).unwrap_or(&0);
        match a_part.cmp(b_part) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }

    a.cmp(b)
}

/// Strip a bottle revision suffix (`1.4.0_2` -> `1.4.0`).
///
/// When a bottle is rebuilt without a source change its keg directory
/// gains a `_N` suffix; for "is this version installed?" questions the
/// suffix must be ignored. Underscores followed by anything non-numeric
/// (`1.0_beta`, `clang_format`) are part of the version and are kept.
///
/// # Examples
///
/// ```
/// use keghouse::cellar::strip_bottle_revision;
///
/// assert_eq!(strip_bottle_revision("1.4.0_32"), "1.4.0");
/// assert_eq!(strip_bottle_revision("1.0_beta"), "1.0_beta");
/// ```
pub fn strip_bottle_revision(version: &str) -> &str {
    if let Some(pos) = version.rfind('_') {
        if version[pos + 1..].chars().all(|c| c.is_ascii_digit()) {
            return &version[..pos];
        }
    }
    version
}

/// Snapshot every file under `<prefix>/etc` and `<prefix>/var`, relative
/// to the prefix.
///
/// Taken before and after a `--build-bottle` build; the difference is the
/// configuration the build created, which gets mirrored into the bottle's
/// staging subtree so the resulting bottle is self-contained. The listing
/// is sorted for stable diffing.
pub fn etc_var_snapshot(layout: &Layout) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for dir in ["etc", "var"] {
        let root = layout.prefix.join(dir);
        if !root.is_dir() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                if let Ok(rel) = entry.path().strip_prefix(&layout.prefix) {
                    files.push(rel.to_path_buf());
                }
            }
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::at("/tmp/kh");
        assert_eq!(layout.cellar, Path::new("/tmp/kh/Cellar"));
        assert_eq!(layout.rack("jq"), Path::new("/tmp/kh/Cellar/jq"));
        assert_eq!(
            layout.keg_prefix("jq", "1.7"),
            Path::new("/tmp/kh/Cellar/jq/1.7")
        );
        assert_eq!(layout.opt_prefix("jq"), Path::new("/tmp/kh/opt/jq"));
        assert_eq!(
            layout.bottle_prefix("jq", "1.7"),
            Path::new("/tmp/kh/Cellar/jq/1.7/.bottle")
        );
    }

    #[test]
    fn test_compare_versions() {
        use std::cmp::Ordering;
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("0.9", "1.0"), Ordering::Less);
    }

    #[test]
    fn test_strip_bottle_revision() {
        assert_eq!(strip_bottle_revision("1.4.0_32"), "1.4.0");
        assert_eq!(strip_bottle_revision("1.4.0"), "1.4.0");
        assert_eq!(strip_bottle_revision("1.0_beta"), "1.0_beta");
        assert_eq!(strip_bottle_revision("foo_bar_1"), "foo_bar");
    }

    #[test]
    fn test_installed_kegs_sorted_newest_first() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());
        for v in ["1.9.0", "1.10.0", "1.2.3"] {
            std::fs::create_dir_all(layout.keg_prefix("tool", v)).unwrap();
        }

        let kegs = layout.installed_kegs("tool").unwrap();
        let versions: Vec<_> = kegs.iter().map(|k| k.version.as_str()).collect();
        assert_eq!(versions, vec!["1.10.0", "1.9.0", "1.2.3"]);
    }

    #[test]
    fn test_installed_kegs_missing_rack() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());
        assert!(layout.installed_kegs("nope").unwrap().is_empty());
        assert!(!layout.installed("nope"));
    }
}
