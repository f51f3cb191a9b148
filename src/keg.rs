//! Keg linking: making an installed version visible in the shared prefix.
//!
//! This module creates and removes the symlinks that turn a keg buried in
//! the Cellar into a usable installation. It handles:
//! - **File symlinks**: `bin/`, `lib/`, `share/`, etc. from the Cellar
//!   into the prefix
//! - **Version-agnostic records**: `opt/<formula>` points at the current
//!   keg regardless of version
//! - **Relative symlinks**: safe, relocatable links without absolute paths
//! - **Conflict detection**: stale symlinks are replaced, regular files
//!   are never clobbered
//! - **Cleanup**: removal of exactly the links that point into one keg
//!
//! # Architecture
//!
//! Two kinds of links exist side by side:
//!
//! ### File symlinks (version-specific)
//! ```text
//! <prefix>/bin/jq -> ../Cellar/jq/1.7/bin/jq
//! <prefix>/lib/libjq.a -> ../Cellar/jq/1.7/lib/libjq.a
//! ```
//!
//! ### Records (version-agnostic)
//! ```text
//! <prefix>/opt/jq -> ../Cellar/jq/1.7
//! <prefix>/var/homebrew/linked/jq -> ../../../Cellar/jq/1.7
//! ```
//!
//! The `opt/` alias is the stable path dependents compile against; the
//! `var/homebrew/linked/` entry is the sentinel marking which keg is
//! active. At most one keg per formula is linked at any observable
//! instant.
//!
//! # Examples
//!
//! ```no_run
//! use keghouse::{Keg, Layout};
//!
//! fn main() -> anyhow::Result<()> {
//!     let layout = Layout::detect();
//!
//!     // Link a freshly installed keg into the prefix.
//!     let keg = Keg::new(&layout, "jq", "1.7");
//!     let linked = keg.link()?;
//!     println!("Linked {} files", linked.len());
//!
//!     // Record it as the active version.
//!     keg.optlink()?;
//!     keg.record_linked()?;
//!
//!     // Take it back out when uninstalling.
//!     let unlinked = keg.unlink()?;
//!     keg.remove_opt_record()?;
//!     println!("Removed {} symlinks", unlinked.len());
//!
//!     Ok(())
//! }
//! ```

use crate::cellar::Layout;
use crate::error::{KegError, Result};
use anyhow::Context;
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};

/// Directories whose contents are symlinked from the Cellar into the prefix.
const LINKABLE_DIRS: &[&str] = &[
    "bin",
    "sbin",
    "lib",
    "include",
    "share",
    "etc",
    "Frameworks",
];

/// Handle over one installed version directory.
///
/// A `Keg` does not verify anything at construction; it is a named path
/// plus the operations that link and unlink it. Use [`Keg::exists`] to
/// check the directory is really there.
#[derive(Debug, Clone)]
pub struct Keg {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    layout: Layout,
}

impl Keg {
    /// Handle for `<cellar>/<name>/<version>`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use keghouse::{Keg, Layout};
    ///
    /// let layout = Layout::detect();
    /// let keg = Keg::new(&layout, "ripgrep", "14.1.0");
    /// println!("{}", keg.path.display());
    /// // Output: "/opt/homebrew/Cellar/ripgrep/14.1.0"
    /// ```
    pub fn new(layout: &Layout, name: &str, version: &str) -> Self {
        Keg {
            name: name.to_string(),
            version: version.to_string(),
            path: layout.keg_prefix(name, version),
            layout: layout.clone(),
        }
    }

    /// Wrap an existing keg directory (e.g. one discovered via the linked
    /// sentinel or a staged bottle whose version carries a revision
    /// suffix).
    ///
    /// Returns `None` when the path has no `<name>/<version>` tail to
    /// parse.
    pub fn from_path(layout: &Layout, path: &Path) -> Option<Self> {
        let version = path.file_name()?.to_str()?.to_string();
        let name = path.parent()?.file_name()?.to_str()?.to_string();
        Some(Keg {
            name,
            version,
            path: path.to_path_buf(),
            layout: layout.clone(),
        })
    }

    /// Does the keg directory exist in the Cellar?
    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Does the keg contain no entries at all? An unreadable directory
    /// counts as empty.
    pub fn is_empty(&self) -> bool {
        match fs::read_dir(&self.path) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    /// Symlink the keg's linkable directories into the prefix.
    ///
    /// Walks `bin/`, `sbin/`, `lib/`, `include/`, `share/`, `etc/` and
    /// `Frameworks/` inside the keg, mirroring the directory structure in
    /// the prefix and symlinking every file. Existing symlinks in the way
    /// (stale links from an old version) are replaced, matching
    /// `brew link --overwrite` behavior for symlinks only.
    ///
    /// # Returns
    ///
    /// The prefix paths of every symlink created.
    ///
    /// # Errors
    ///
    /// - [`KegError::LinkConflict`] when a *regular file* occupies a link
    ///   target; nothing the user put there is ever overwritten. Use
    ///   [`Keg::link_dry_run_overwrite`] afterwards to enumerate the full
    ///   conflict set.
    /// - An IO error when a directory cannot be created or a symlink
    ///   cannot be written (permission denied, read-only prefix).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use keghouse::{Keg, Layout};
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let layout = Layout::detect();
    ///     let keg = Keg::new(&layout, "ripgrep", "14.1.0");
    ///
    ///     let linked = keg.link()?;
    ///     println!("Created {} symlinks", linked.len());
    ///     // Now <prefix>/bin/rg -> ../Cellar/ripgrep/14.1.0/bin/rg
    ///
    ///     Ok(())
    /// }
    /// ```
    ///
    /// # Relative symlinks
    ///
    /// Every link is relative, never absolute: a link two levels below
    /// the prefix climbs two `..` components before descending into the
    /// Cellar. The prefix can be moved wholesale without breaking links.
    pub fn link(&self) -> Result<Vec<PathBuf>> {
        let mut linked = Vec::new();

        for dir_name in LINKABLE_DIRS {
            let source_dir = self.path.join(dir_name);
            if !source_dir.is_dir() {
                continue;
            }

            let target_dir = self.layout.prefix.join(dir_name);
            fs::create_dir_all(&target_dir)
                .with_context(|| format!("Failed to create directory: {}", target_dir.display()))?;

            self.link_directory(&source_dir, &target_dir, &mut linked)?;
        }

        Ok(linked)
    }

    fn link_directory(
        &self,
        source: &Path,
        target: &Path,
        linked: &mut Vec<PathBuf>,
    ) -> Result<()> {
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            let source_path = entry.path();
            let target_path = target.join(entry.file_name());

            if source_path.is_dir() && !source_path.is_symlink() {
                fs::create_dir_all(&target_path).with_context(|| {
                    format!("Failed to create directory: {}", target_path.display())
                })?;
                self.link_directory(&source_path, &target_path, linked)?;
            } else {
                self.link_file(&source_path, &target_path)?;
                linked.push(target_path);
            }
        }
        Ok(())
    }

    fn link_file(&self, source: &Path, target: &Path) -> Result<()> {
        if let Ok(metadata) = target.symlink_metadata() {
            if metadata.is_symlink() {
                // A link from an older version; replace it.
                fs::remove_file(target).with_context(|| {
                    format!("Failed to remove existing symlink: {}", target.display())
                })?;
            } else {
                return Err(KegError::LinkConflict {
                    files: vec![target.to_path_buf()],
                });
            }
        }

        let relative = self.relative_source(source, target);
        unix_fs::symlink(&relative, target).with_context(|| {
            format!(
                "Failed to create symlink: {} -> {}",
                target.display(),
                relative.display()
            )
        })?;

        Ok(())
    }

    /// Enumerate every regular file in the prefix that a link would
    /// clobber, creating nothing.
    ///
    /// [`Keg::link`] aborts on the first conflict it meets; this walk
    /// finds them all, so a failed link can report the complete list the
    /// user would need to move aside (or overwrite explicitly).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use keghouse::{Keg, Layout};
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let layout = Layout::detect();
    ///     let keg = Keg::new(&layout, "ripgrep", "14.1.0");
    ///
    ///     if keg.link().is_err() {
    ///         for file in keg.link_dry_run_overwrite()? {
    ///             println!("would clobber: {}", file.display());
    ///         }
    ///     }
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn link_dry_run_overwrite(&self) -> Result<Vec<PathBuf>> {
        let mut conflicts = Vec::new();

        for dir_name in LINKABLE_DIRS {
            let source_dir = self.path.join(dir_name);
            if !source_dir.is_dir() {
                continue;
            }
            let target_dir = self.layout.prefix.join(dir_name);
            self.collect_conflicts(&source_dir, &target_dir, &mut conflicts)?;
        }

        Ok(conflicts)
    }

    fn collect_conflicts(
        &self,
        source: &Path,
        target: &Path,
        conflicts: &mut Vec<PathBuf>,
    ) -> Result<()> {
        if !source.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            let source_path = entry.path();
            let target_path = target.join(entry.file_name());

            if source_path.is_dir() && !source_path.is_symlink() {
                self.collect_conflicts(&source_path, &target_path, conflicts)?;
            } else if let Ok(metadata) = target_path.symlink_metadata() {
                if !metadata.is_symlink() {
                    conflicts.push(target_path);
                }
            }
        }
        Ok(())
    }

    /// Remove every symlink in the prefix that resolves into this keg,
    /// along with the linked sentinel. Does not delete the keg itself.
    ///
    /// The prefix's linkable directories are scanned recursively; each
    /// symlink is resolved (relative targets included) and removed only
    /// when the normalized target lands inside this keg's path. Links
    /// belonging to other formulae — or to a *different version* of this
    /// one — are left alone.
    ///
    /// # Returns
    ///
    /// The paths of the symlinks that were removed.
    ///
    /// # Errors
    ///
    /// Only when a directory scan itself fails; an individual symlink
    /// that cannot be removed is logged and skipped.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use keghouse::{Keg, Layout};
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let layout = Layout::detect();
    ///     let keg = Keg::new(&layout, "ripgrep", "14.1.0");
    ///
    ///     let unlinked = keg.unlink()?;
    ///     println!("Removed {} symlinks", unlinked.len());
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn unlink(&self) -> Result<Vec<PathBuf>> {
        let mut unlinked = Vec::new();

        for dir_name in LINKABLE_DIRS {
            let target_dir = self.layout.prefix.join(dir_name);
            if !target_dir.exists() {
                continue;
            }
            self.unlink_in_directory(&target_dir, &mut unlinked)?;
        }

        self.remove_linked_record()?;

        Ok(unlinked)
    }

    fn unlink_in_directory(&self, target: &Path, unlinked: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(target)? {
            let entry = entry?;
            let target_path = entry.path();

            let Ok(metadata) = fs::symlink_metadata(&target_path) else {
                continue;
            };

            if metadata.is_symlink() {
                if let Ok(link_target) = fs::read_link(&target_path) {
                    let resolved = if link_target.is_relative() {
                        target_path.parent().unwrap_or(target).join(&link_target)
                    } else {
                        link_target
                    };

                    if normalize_path(&resolved).starts_with(&self.path) {
                        if let Err(e) = fs::remove_file(&target_path) {
                            tracing::warn!(
                                "failed to remove symlink {}: {e}",
                                target_path.display()
                            );
                        } else {
                            unlinked.push(target_path);
                        }
                    }
                }
            } else if metadata.is_dir() {
                self.unlink_in_directory(&target_path, unlinked)?;
            }
        }
        Ok(())
    }

    /// Create the stable `opt/<name>` alias pointing at this keg.
    ///
    /// The alias is version-agnostic: dependents reference
    /// `<prefix>/opt/<name>` and keep working across upgrades. An
    /// existing alias (for any version) is replaced, which is how version
    /// switching works.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use keghouse::{Keg, Layout};
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let layout = Layout::detect();
    ///     Keg::new(&layout, "python", "3.13.0").optlink()?;
    ///     // Now <prefix>/opt/python -> ../Cellar/python/3.13.0
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn optlink(&self) -> Result<()> {
        let opt_record = self.layout.opt_prefix(&self.name);
        replace_symlink(
            &opt_record,
            &PathBuf::from("../Cellar").join(&self.name).join(&self.version),
        )
    }

    /// Mark this keg as the active one via the linked sentinel
    /// (`var/homebrew/linked/<name>`).
    ///
    /// The sentinel is what [`linked_version`] reads, and what an
    /// interrupted upgrade consults to decide which keg was live before
    /// the interruption. An existing record is replaced.
    pub fn record_linked(&self) -> Result<()> {
        let record = linked_record_path(&self.layout, &self.name);
        replace_symlink(
            &record,
            &PathBuf::from("../../../Cellar")
                .join(&self.name)
                .join(&self.version),
        )
    }

    /// Is this keg the one the linked sentinel points at?
    ///
    /// A sentinel pointing at a *different* version of the same formula
    /// returns `false`.
    pub fn linked(&self) -> bool {
        matches!(
            linked_version(&self.layout, &self.name),
            Ok(Some(ref v)) if *v == self.version
        )
    }

    /// Remove the linked sentinel. Safe to call when none exists.
    pub fn remove_linked_record(&self) -> Result<()> {
        let record = linked_record_path(&self.layout, &self.name);
        if record.symlink_metadata().is_ok() {
            fs::remove_file(&record)
                .with_context(|| format!("Failed to remove record: {}", record.display()))?;
        }
        Ok(())
    }

    /// Remove the `opt/<name>` alias. Safe to call when none exists.
    pub fn remove_opt_record(&self) -> Result<()> {
        let opt_record = self.layout.opt_prefix(&self.name);
        if opt_record.symlink_metadata().is_ok() {
            fs::remove_file(&opt_record).with_context(|| {
                format!("Failed to remove opt symlink: {}", opt_record.display())
            })?;
        }
        Ok(())
    }

    /// Relative path from `target`'s directory back down to `source`,
    /// `../..`-ing up to the prefix first.
    fn relative_source(&self, source: &Path, target: &Path) -> PathBuf {
        let prefix = &self.layout.prefix;
        if source.starts_with(&self.layout.cellar) && target.starts_with(prefix) {
            let target_dir = target.parent().unwrap_or(target);
            let depth = target_dir
                .strip_prefix(prefix)
                .map(|rel| rel.components().count())
                .unwrap_or(1);

            let mut path = PathBuf::new();
            for _ in 0..depth {
                path.push("..");
            }

            match source.strip_prefix(prefix) {
                Ok(rel_source) => path.join(rel_source),
                Err(_) => source.to_path_buf(),
            }
        } else {
            source.to_path_buf()
        }
    }
}

fn linked_record_path(layout: &Layout, name: &str) -> PathBuf {
    layout
        .prefix
        .join("var")
        .join("homebrew")
        .join("linked")
        .join(name)
}

fn replace_symlink(record: &Path, target: &Path) -> Result<()> {
    if let Some(dir) = record.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    if record.symlink_metadata().is_ok() {
        fs::remove_file(record)
            .with_context(|| format!("Failed to remove existing symlink: {}", record.display()))?;
    }

    unix_fs::symlink(target, record).with_context(|| {
        format!(
            "Failed to create symlink: {} -> {}",
            record.display(),
            target.display()
        )
    })?;

    Ok(())
}

/// The version the linked sentinel currently points at, if any.
///
/// This is how "which version is active?" is answered everywhere in the
/// installer: the preflight gate for unlinked dependencies, the
/// different-version-linked refusal, and upgrade bookkeeping all go
/// through it. A formula installed but never linked yields `Ok(None)`,
/// which is not an error.
///
/// # Examples
///
/// ```no_run
/// use keghouse::{keg, Layout};
///
/// fn main() -> anyhow::Result<()> {
///     let layout = Layout::detect();
///     match keg::linked_version(&layout, "python")? {
///         Some(version) => println!("python {version} is linked"),
///         None => println!("python is not linked"),
///     }
///
///     Ok(())
/// }
/// ```
///
/// # Upgrade handling
///
/// When several versions of a formula sit in the Cellar (typically after
/// an interrupted upgrade), the sentinel — not the newest directory — is
/// the authority on which keg the user was actually running.
pub fn linked_version(layout: &Layout, name: &str) -> Result<Option<String>> {
    let record = linked_record_path(layout, name);

    if record.symlink_metadata().is_err() {
        return Ok(None);
    }

    let link_target = fs::read_link(&record)
        .with_context(|| format!("Failed to read linked record: {}", record.display()))?;

    Ok(link_target
        .file_name()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string()))
}

/// The keg the linked sentinel points at, if it resolves to a directory.
///
/// Like [`linked_version`] but hands back a [`Keg`] handle ready for
/// `unlink`/`link`, and filters out a dangling sentinel whose keg was
/// deleted from under it (that broken state yields `Ok(None)`).
pub fn linked_keg(layout: &Layout, name: &str) -> Result<Option<Keg>> {
    match linked_version(layout, name)? {
        Some(version) => {
            let keg = Keg::new(layout, name, &version);
            Ok(keg.exists().then_some(keg))
        }
        None => Ok(None),
    }
}

/// Normalize a path by resolving `.` and `..` components lexically.
///
/// Unlike `Path::canonicalize` this never touches the filesystem, so it
/// works on paths whose files may not exist and never opens file handles
/// while scanning thousands of symlinks.
///
/// # Examples
///
/// ```
/// use keghouse::keg::normalize_path;
/// use std::path::{Path, PathBuf};
///
/// let resolved = normalize_path(Path::new("/opt/homebrew/bin/../Cellar/jq/1.7"));
/// assert_eq!(resolved, PathBuf::from("/opt/homebrew/Cellar/jq/1.7"));
/// ```
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                components.pop();
            }
            std::path::Component::CurDir => {}
            c => components.push(c),
        }
    }
    components.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mock_keg(layout: &Layout, name: &str, version: &str) -> Keg {
        let keg_path = layout.keg_prefix(name, version);
        fs::create_dir_all(keg_path.join("bin")).unwrap();
        fs::write(keg_path.join("bin").join(name), "#!/bin/sh\necho hi").unwrap();
        Keg::new(layout, name, version)
    }

    #[test]
    fn test_link_creates_relative_symlinks() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());
        let keg = mock_keg(&layout, "jq", "1.7");

        let linked = keg.link().unwrap();
        assert_eq!(linked.len(), 1);

        let target = layout.prefix.join("bin").join("jq");
        assert!(target.symlink_metadata().unwrap().is_symlink());
        assert_eq!(
            fs::read_link(&target).unwrap(),
            PathBuf::from("../Cellar/jq/1.7/bin/jq")
        );
    }

    #[test]
    fn test_link_conflict_on_regular_file() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());
        let keg = mock_keg(&layout, "jq", "1.7");

        fs::create_dir_all(layout.prefix.join("bin")).unwrap();
        fs::write(layout.prefix.join("bin").join("jq"), "user script").unwrap();

        match keg.link() {
            Err(KegError::LinkConflict { files }) => {
                assert_eq!(files, vec![layout.prefix.join("bin").join("jq")]);
            }
            other => panic!("expected LinkConflict, got {other:?}"),
        }

        let conflicts = keg.link_dry_run_overwrite().unwrap();
        assert_eq!(conflicts, vec![layout.prefix.join("bin").join("jq")]);
    }

    #[test]
    fn test_link_replaces_stale_symlink() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());
        let old = mock_keg(&layout, "jq", "1.6");
        old.link().unwrap();

        let new = mock_keg(&layout, "jq", "1.7");
        new.link().unwrap();

        let target = layout.prefix.join("bin").join("jq");
        assert_eq!(
            fs::read_link(&target).unwrap(),
            PathBuf::from("../Cellar/jq/1.7/bin/jq")
        );
    }

    #[test]
    fn test_unlink_removes_only_own_links() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());
        let jq = mock_keg(&layout, "jq", "1.7");
        let fd = mock_keg(&layout, "fd", "10.0");
        jq.link().unwrap();
        fd.link().unwrap();

        let removed = jq.unlink().unwrap();
        assert_eq!(removed, vec![layout.prefix.join("bin").join("jq")]);
        assert!(layout.prefix.join("bin").join("fd").symlink_metadata().is_ok());
    }

    #[test]
    fn test_linked_sentinel_round_trip() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());
        let keg = mock_keg(&layout, "jq", "1.7");

        assert_eq!(linked_version(&layout, "jq").unwrap(), None);

        keg.record_linked().unwrap();
        assert_eq!(linked_version(&layout, "jq").unwrap(), Some("1.7".into()));
        assert!(keg.linked());

        let resolved = linked_keg(&layout, "jq").unwrap().unwrap();
        assert_eq!(resolved.version, "1.7");

        keg.remove_linked_record().unwrap();
        assert_eq!(linked_version(&layout, "jq").unwrap(), None);
    }

    #[test]
    fn test_optlink_points_at_keg() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());
        let keg = mock_keg(&layout, "jq", "1.7");

        keg.optlink().unwrap();
        let opt = layout.opt_prefix("jq");
        assert_eq!(
            fs::read_link(&opt).unwrap(),
            PathBuf::from("../Cellar/jq/1.7")
        );

        // Re-optlinking a newer keg switches the alias.
        let newer = mock_keg(&layout, "jq", "1.8");
        newer.optlink().unwrap();
        assert_eq!(
            fs::read_link(&opt).unwrap(),
            PathBuf::from("../Cellar/jq/1.8")
        );
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }
}
