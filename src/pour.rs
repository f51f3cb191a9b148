//! Bottle pour driver: fetch, stage, merge configuration, write the tab.
//!
//! A poured keg arrives with an embedded `.bottle/` staging subtree holding
//! the `etc`/`var` templates the build produced. Those are merged into the
//! shared prefix without clobbering user-edited configuration, then the
//! staging subtree is removed so the keg holds only the formula's files.

use crate::cellar::Layout;
use crate::download;
use crate::error::Result;
use crate::formula::{BottleSpec, Formula};
use crate::stage;
use crate::tab::Tab;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Where the bottle archive comes from.
#[derive(Debug, Clone)]
pub enum BottleSource<'a> {
    /// A local archive supplied by the user; integrity is their problem.
    Local(PathBuf),
    /// The formula's descriptor: fetch and verify.
    Remote(&'a BottleSpec),
}

/// Pour a bottle: returns the staged keg path.
pub fn pour_bottle(
    layout: &Layout,
    formula: &Formula,
    source: BottleSource<'_>,
    quiet: bool,
) -> Result<PathBuf> {
    let archive = match source {
        BottleSource::Local(path) => path,
        BottleSource::Remote(spec) => download::fetch_bottle(layout, formula, spec, quiet)?,
    };

    let staged = stage::stage_bottle(layout, &archive, &formula.name, &formula.version)
        .map_err(crate::error::KegError::Other)?;

    let bottle_prefix = staged.join(".bottle");
    if bottle_prefix.is_dir() {
        merge_etc_var(layout, &bottle_prefix)?;
        fs::remove_dir_all(&bottle_prefix).with_context(|| {
            format!("Failed to remove staging subtree: {}", bottle_prefix.display())
        })?;
    }

    let mut tab = Tab::for_keg(&staged);
    check_cxx_stdlib(layout, formula, &tab);
    tab.tap = formula.tap.clone();
    tab.poured_from_bottle = true;
    tab.write(&staged).map_err(crate::error::KegError::Other)?;

    Ok(staged)
}

/// Copy `.bottle/{etc,var}` contents into the shared prefix. A file that
/// would overwrite differing user content is written next to it as
/// `<name>.default` instead.
fn merge_etc_var(layout: &Layout, bottle_prefix: &Path) -> Result<()> {
    for dir in ["etc", "var"] {
        let source_root = bottle_prefix.join(dir);
        if !source_root.is_dir() {
            continue;
        }

        for entry in WalkDir::new(&source_root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let rel = entry
                .path()
                .strip_prefix(bottle_prefix)
                .expect("walk stays under bottle prefix");
            let target = layout.prefix.join(rel);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)
                    .with_context(|| format!("Failed to create: {}", target.display()))?;
                continue;
            }

            if target.exists() && !same_contents(entry.path(), &target) {
                let variant = variant_name(&target);
                fs::copy(entry.path(), &variant)
                    .with_context(|| format!("Failed to copy: {}", variant.display()))?;
            } else if !target.exists() {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &target)
                    .with_context(|| format!("Failed to copy: {}", target.display()))?;
            }
        }
    }
    Ok(())
}

fn same_contents(a: &Path, b: &Path) -> bool {
    match (fs::read(a), fs::read(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn variant_name(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".default");
    target.with_file_name(name)
}

/// Warn when a poured keg's C++ runtime disagrees with the compilers its
/// installed dependencies were built with.
fn check_cxx_stdlib(layout: &Layout, formula: &Formula, tab: &Tab) {
    let Some(own) = tab.compiler.as_deref() else {
        return;
    };

    for dep in &formula.deps {
        if dep.build() {
            continue;
        }
        let dep_tab = Tab::for_formula(layout, &dep.name);
        if let Some(dep_compiler) = dep_tab.compiler.as_deref() {
            if compiler_family(own) != compiler_family(dep_compiler) {
                tracing::warn!(
                    "{} was built with {own} but its dependency {} used {dep_compiler}; \
                     C++ libraries may be incompatible",
                    formula.name,
                    dep.name
                );
            }
        }
    }
}

fn compiler_family(compiler: &str) -> &str {
    if compiler.contains("gcc") || compiler.contains("g++") {
        "gcc"
    } else {
        "clang"
    }
}

/// Mirror configuration files the build created into the staging subtree,
/// so a bottle produced from this keg carries them. `pre_snapshot` is the
/// etc/var file list taken before the build.
pub fn mirror_new_etc_var(
    layout: &Layout,
    formula: &Formula,
    pre_snapshot: &[PathBuf],
) -> Result<()> {
    let post = crate::cellar::etc_var_snapshot(layout);
    let bottle_prefix = formula.bottle_prefix(layout);

    for rel in post {
        if pre_snapshot.contains(&rel) {
            continue;
        }
        let source = layout.prefix.join(&rel);
        let target = bottle_prefix.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create: {}", parent.display()))?;
        }
        fs::copy(&source, &target)
            .with_context(|| format!("Failed to copy: {}", target.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_merge_etc_var_fresh_files() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());
        let bottle_prefix = tmp.path().join("keg/.bottle");
        fs::create_dir_all(bottle_prefix.join("etc/pkg")).unwrap();
        fs::write(bottle_prefix.join("etc/pkg/conf"), "default config").unwrap();

        merge_etc_var(&layout, &bottle_prefix).unwrap();

        let merged = layout.prefix.join("etc/pkg/conf");
        assert_eq!(fs::read_to_string(merged).unwrap(), "default config");
    }

    #[test]
    fn test_merge_etc_var_preserves_user_edits() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());

        let user_conf = layout.prefix.join("etc/pkg/conf");
        fs::create_dir_all(user_conf.parent().unwrap()).unwrap();
        fs::write(&user_conf, "user edited").unwrap();

        let bottle_prefix = tmp.path().join("keg/.bottle");
        fs::create_dir_all(bottle_prefix.join("etc/pkg")).unwrap();
        fs::write(bottle_prefix.join("etc/pkg/conf"), "new default").unwrap();

        merge_etc_var(&layout, &bottle_prefix).unwrap();

        assert_eq!(fs::read_to_string(&user_conf).unwrap(), "user edited");
        assert_eq!(
            fs::read_to_string(layout.prefix.join("etc/pkg/conf.default")).unwrap(),
            "new default"
        );
    }

    #[test]
    fn test_merge_etc_var_identical_file_untouched() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());

        let user_conf = layout.prefix.join("etc/conf");
        fs::create_dir_all(user_conf.parent().unwrap()).unwrap();
        fs::write(&user_conf, "same").unwrap();

        let bottle_prefix = tmp.path().join("keg/.bottle");
        fs::create_dir_all(bottle_prefix.join("etc")).unwrap();
        fs::write(bottle_prefix.join("etc/conf"), "same").unwrap();

        merge_etc_var(&layout, &bottle_prefix).unwrap();

        assert!(!layout.prefix.join("etc/conf.default").exists());
    }

    #[test]
    fn test_mirror_new_etc_var_diffs_snapshot() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());
        let formula = Formula::new("pkg", "1.0");

        fs::create_dir_all(layout.prefix.join("etc")).unwrap();
        fs::write(layout.prefix.join("etc/old.conf"), "old").unwrap();
        let pre = crate::cellar::etc_var_snapshot(&layout);

        // The build drops a new config file.
        fs::write(layout.prefix.join("etc/new.conf"), "new").unwrap();
        fs::create_dir_all(formula.prefix(&layout)).unwrap();

        mirror_new_etc_var(&layout, &formula, &pre).unwrap();

        let mirrored = formula.bottle_prefix(&layout).join("etc/new.conf");
        assert_eq!(fs::read_to_string(mirrored).unwrap(), "new");
        assert!(!formula.bottle_prefix(&layout).join("etc/old.conf").exists());
    }
}
