//! Build sandbox driver.
//!
//! Confines a source build to the paths it is allowed to mutate: the
//! formula's cellar slot, its log directory, temp, and the download cache.
//! On macOS the build argv is wrapped in `sandbox-exec` with a generated
//! deny-default profile; elsewhere the argv passes through unchanged.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct Sandbox {
    writable: Vec<PathBuf>,
}

impl Sandbox {
    pub fn new() -> Self {
        Sandbox::default()
    }

    /// Is sandboxing supported on this host?
    pub fn available() -> bool {
        cfg!(target_os = "macos") && Path::new("/usr/bin/sandbox-exec").exists()
    }

    pub fn allow_write(&mut self, path: impl Into<PathBuf>) {
        self.writable.push(path.into());
    }

    pub fn allow_write_temp(&mut self) {
        self.allow_write(std::env::temp_dir());
        self.allow_write("/private/tmp");
        self.allow_write("/private/var/tmp");
    }

    /// The sandbox profile text. Deny writes by default, allow everything
    /// else, and carve out the collected writable subtrees.
    pub fn profile(&self) -> String {
        let mut profile = String::from("(version 1)\n(allow default)\n(deny file-write*)\n");
        for path in &self.writable {
            profile.push_str(&format!(
                "(allow file-write* (subpath \"{}\"))\n",
                path.display()
            ));
        }
        profile
    }

    /// Wrap `argv` for sandboxed execution. A no-op where sandboxing is
    /// unavailable.
    pub fn wrap(&self, argv: Vec<OsString>) -> Result<Vec<OsString>> {
        if !Self::available() {
            return Ok(argv);
        }

        let profile_path = std::env::temp_dir().join(format!("keghouse-sandbox-{}.sb", std::process::id()));
        std::fs::write(&profile_path, self.profile())
            .with_context(|| format!("Failed to write sandbox profile: {}", profile_path.display()))?;

        let mut wrapped: Vec<OsString> = vec![
            OsString::from("/usr/bin/sandbox-exec"),
            OsString::from("-f"),
            profile_path.into_os_string(),
        ];
        wrapped.extend(argv);
        Ok(wrapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_lists_writable_subtrees() {
        let mut sandbox = Sandbox::new();
        sandbox.allow_write("/opt/test/Cellar/pkg/1.0");
        sandbox.allow_write("/opt/test/var/log/pkg");

        let profile = sandbox.profile();
        assert!(profile.starts_with("(version 1)"));
        assert!(profile.contains("(deny file-write*)"));
        assert!(profile.contains("(subpath \"/opt/test/Cellar/pkg/1.0\")"));
        assert!(profile.contains("(subpath \"/opt/test/var/log/pkg\")"));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_wrap_passthrough_without_sandbox() {
        let sandbox = Sandbox::new();
        let argv = vec![OsString::from("/bin/echo"), OsString::from("hi")];
        assert_eq!(sandbox.wrap(argv.clone()).unwrap(), argv);
    }
}
