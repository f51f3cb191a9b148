//! Per-keg install receipt ("tab").
//!
//! Records how a keg was installed so that upgrades can reuse the options
//! the user chose the first time around. Written to
//! `<keg>/INSTALL_RECEIPT.json`.

use crate::options::Options;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tab {
    pub homebrew_version: String,
    #[serde(default)]
    pub used_options: Vec<String>,
    #[serde(default)]
    pub unused_options: Vec<String>,
    #[serde(default)]
    pub built_as_bottle: bool,
    #[serde(default)]
    pub poured_from_bottle: bool,
    #[serde(default)]
    pub tap: Option<String>,
    #[serde(default)]
    pub compiler: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
}

impl Default for Tab {
    fn default() -> Self {
        Tab {
            homebrew_version: format!("keghouse/{}", env!("CARGO_PKG_VERSION")),
            used_options: vec![],
            unused_options: vec![],
            built_as_bottle: false,
            poured_from_bottle: false,
            tap: None,
            compiler: None,
            time: None,
        }
    }
}

impl Tab {
    /// Read the receipt inside a keg directory.
    pub fn read(keg_path: &Path) -> Result<Self> {
        let receipt_path = keg_path.join("INSTALL_RECEIPT.json");
        let contents = fs::read_to_string(&receipt_path)
            .with_context(|| format!("Failed to read receipt: {}", receipt_path.display()))?;
        let tab: Self =
            serde_json::from_str(&contents).context("Failed to parse INSTALL_RECEIPT.json")?;
        Ok(tab)
    }

    /// Like [`Tab::read`] but an absent or unreadable receipt yields the
    /// empty tab, so callers merging persisted options never fail on a keg
    /// installed by something else.
    pub fn for_keg(keg_path: &Path) -> Self {
        Self::read(keg_path).unwrap_or_default()
    }

    /// The newest installed keg's tab, or the empty tab.
    pub fn for_formula(layout: &crate::cellar::Layout, name: &str) -> Self {
        match layout.installed_kegs(name) {
            Ok(kegs) if !kegs.is_empty() => Self::for_keg(&kegs[0].path),
            _ => Tab::default(),
        }
    }

    pub fn new_for_build(used: &Options, compiler: Option<String>, built_as_bottle: bool) -> Self {
        Tab {
            used_options: used.flags(),
            compiler,
            built_as_bottle,
            time: Some(now_epoch()),
            ..Tab::default()
        }
    }

    pub fn used_options(&self) -> Options {
        Options::from_flags(&self.used_options)
    }

    pub fn write(&self, keg_path: &Path) -> Result<()> {
        let receipt_path = keg_path.join("INSTALL_RECEIPT.json");
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize install receipt")?;

        fs::write(&receipt_path, json)
            .with_context(|| format!("Failed to write receipt: {}", receipt_path.display()))?;

        Ok(())
    }
}

fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tab_round_trip() {
        let tmp = TempDir::new().unwrap();
        let keg = tmp.path().join("pkg").join("1.0");
        fs::create_dir_all(&keg).unwrap();

        let mut tab = Tab::default();
        tab.used_options = vec!["--with-ssl".into()];
        tab.poured_from_bottle = true;
        tab.tap = Some("homebrew/core".into());
        tab.write(&keg).unwrap();

        let read = Tab::read(&keg).unwrap();
        assert_eq!(read.used_options, vec!["--with-ssl"]);
        assert!(read.poured_from_bottle);
        assert_eq!(read.tap.as_deref(), Some("homebrew/core"));
    }

    #[test]
    fn test_for_keg_missing_receipt_is_empty() {
        let tmp = TempDir::new().unwrap();
        let tab = Tab::for_keg(tmp.path());
        assert!(tab.used_options.is_empty());
        assert!(!tab.poured_from_bottle);
    }

    #[test]
    fn test_used_options_parse() {
        let mut tab = Tab::default();
        tab.used_options = vec!["--with-a".into(), "--with-b".into()];
        let opts = tab.used_options();
        assert!(opts.contains("with-a"));
        assert!(opts.contains("with-b"));
    }
}
