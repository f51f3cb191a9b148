//! Source build driver.
//!
//! A build runs in a child process with a pristine, explicitly constructed
//! environment so that per-formula environment mutations cannot leak into
//! the parent or sibling installs. The child's argv is order-sensitive and
//! consumed by the external build script:
//!
//! ```text
//! nice <interpreter> -W0 -I <load_path> -- <build_script> <formula_path>
//!      <sanitized_args> <option_flags>
//! ```

use crate::cellar::Layout;
use crate::error::{KegError, Result};
use crate::formula::Formula;
use crate::installer::InstallerFlags;
use crate::interrupt;
use crate::options::Options;
use crate::sandbox::Sandbox;
use anyhow::Context;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

const PRISTINE_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin";

/// Where the build interpreter and script live. Detected from the
/// environment for the live system; constructed directly in tests.
#[derive(Debug, Clone)]
pub struct BuildCommand {
    pub interpreter: PathBuf,
    pub library_path: PathBuf,
    pub script: PathBuf,
}

impl BuildCommand {
    pub fn detect(layout: &Layout) -> Self {
        let interpreter = std::env::var_os("HOMEBREW_RUBY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ruby"));
        let library_path = std::env::var_os("HOMEBREW_LIBRARY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| layout.prefix.join("Library").join("Homebrew"));
        let script = library_path.join("build.rb");

        BuildCommand {
            interpreter,
            library_path,
            script,
        }
    }
}

/// Reconstruct the reproducible command line the build script expects.
pub fn build_argv(
    command: &BuildCommand,
    formula: &Formula,
    flags: &InstallerFlags,
    options: &Options,
) -> Vec<OsString> {
    let mut argv: Vec<OsString> = vec![
        OsString::from("nice"),
        command.interpreter.clone().into_os_string(),
        OsString::from("-W0"),
        OsString::from("-I"),
        command.library_path.clone().into_os_string(),
        OsString::from("--"),
        command.script.clone().into_os_string(),
    ];

    let formula_path = formula
        .path
        .clone()
        .unwrap_or_else(|| PathBuf::from(&formula.name));
    argv.push(formula_path.into_os_string());

    if flags.ignore_deps {
        argv.push(OsString::from("--ignore-dependencies"));
    }
    if flags.build_bottle {
        argv.push(OsString::from("--build-bottle"));
        if let Some(arch) = &flags.bottle_arch {
            argv.push(OsString::from(format!("--bottle-arch={arch}")));
        }
    }
    if flags.git {
        argv.push(OsString::from("--git"));
    }
    if flags.interactive {
        argv.push(OsString::from("--interactive"));
    }
    if flags.verbose {
        argv.push(OsString::from("--verbose"));
    }
    if flags.debug {
        argv.push(OsString::from("--debug"));
    }
    if let Some(cc) = &flags.cc {
        argv.push(OsString::from(format!("--cc={cc}")));
    }

    if let Some(env) = &flags.build_env {
        argv.push(OsString::from(format!("--env={env}")));
    } else if formula.env_std || formula.deps.iter().any(|d| d.name == "scons") {
        argv.push(OsString::from("--env=std"));
    }

    if formula.head {
        argv.push(OsString::from("--HEAD"));
    } else if formula.devel {
        argv.push(OsString::from("--devel"));
    }

    // name=value assignments the user provided, then the option flags.
    for opt in options.iter().filter(|o| o.is_assignment()) {
        argv.push(OsString::from(format!("{}={}", opt.name, opt.value.clone().unwrap_or_default())));
    }
    for opt in options.iter().filter(|o| !o.is_assignment()) {
        argv.push(OsString::from(opt.flag()));
    }

    argv
}

/// Fork the build child, wait for it, and verify it produced a non-empty
/// prefix. On any failure the partial prefix is removed (and the rack, if
/// that leaves it empty) under an interrupt mask before the error
/// propagates.
pub fn run_build(
    layout: &Layout,
    formula: &Formula,
    command: &BuildCommand,
    flags: &InstallerFlags,
    options: &Options,
) -> Result<()> {
    let result = spawn_and_verify(layout, formula, command, flags, options);

    if result.is_err() {
        interrupt::uninterruptible(|| {
            let prefix = formula.prefix(layout);
            if prefix.exists() {
                if let Err(e) = fs::remove_dir_all(&prefix) {
                    tracing::warn!("failed to remove partial prefix {}: {e}", prefix.display());
                }
            }
            let rack = formula.rack(layout);
            // Only an empty rack is removed; sibling versions stay.
            let _ = fs::remove_dir(&rack);
        });
    }

    result
}

fn spawn_and_verify(
    layout: &Layout,
    formula: &Formula,
    command: &BuildCommand,
    flags: &InstallerFlags,
    options: &Options,
) -> Result<()> {
    let argv = build_argv(command, formula, flags, options);

    let argv = if flags.sandbox && Sandbox::available() && !formula.sandbox_disabled {
        let mut sandbox = Sandbox::new();
        sandbox.allow_write_temp();
        sandbox.allow_write(layout.cache_dir());
        sandbox.allow_write(formula.logs(layout));
        sandbox.allow_write(formula.rack(layout));
        sandbox.wrap(argv)?
    } else {
        argv
    };

    fs::create_dir_all(formula.logs(layout))
        .with_context(|| format!("Failed to create logs for {}", formula.name))?;

    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .env_clear()
        .env("PATH", PRISTINE_PATH)
        .env("HOMEBREW_PREFIX", &layout.prefix)
        .env("HOMEBREW_CELLAR", &layout.cellar)
        .env("HOMEBREW_FORMULA_PREFIX", formula.prefix(layout))
        .env("HOMEBREW_FORMULA_LOGS", formula.logs(layout))
        .env("TMPDIR", std::env::temp_dir())
        .status()
        .with_context(|| format!("Failed to spawn build child for {}", formula.name))?;

    if !status.success() {
        return Err(KegError::BuildFailed(formula.name.clone()));
    }

    let prefix = formula.prefix(layout);
    let non_empty = fs::read_dir(&prefix)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);
    if !non_empty {
        return Err(KegError::EmptyInstallation(prefix));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn flags() -> InstallerFlags {
        InstallerFlags::default()
    }

    fn command_fixture() -> BuildCommand {
        BuildCommand {
            interpreter: PathBuf::from("/usr/bin/ruby"),
            library_path: PathBuf::from("/opt/test/Library/Homebrew"),
            script: PathBuf::from("/opt/test/Library/Homebrew/build.rb"),
        }
    }

    #[test]
    fn test_argv_prefix_order() {
        let mut formula = Formula::new("alpha", "1.0");
        formula.path = Some(PathBuf::from("/taps/alpha.rb"));

        let argv = build_argv(&command_fixture(), &formula, &flags(), &Options::new());
        let strs: Vec<_> = argv.iter().map(|s| s.to_string_lossy()).collect();
        assert_eq!(
            &strs[..8],
            &[
                "nice",
                "/usr/bin/ruby",
                "-W0",
                "-I",
                "/opt/test/Library/Homebrew",
                "--",
                "/opt/test/Library/Homebrew/build.rb",
                "/taps/alpha.rb"
            ]
        );
    }

    #[test]
    fn test_argv_mode_flags() {
        let formula = Formula::new("alpha", "1.0");
        let mut f = flags();
        f.ignore_deps = true;
        f.build_bottle = true;
        f.bottle_arch = Some("core2".into());
        f.verbose = true;
        f.cc = Some("clang".into());

        let argv = build_argv(&command_fixture(), &formula, &f, &Options::new());
        let strs: Vec<_> = argv.iter().map(|s| s.to_string_lossy().to_string()).collect();
        assert!(strs.contains(&"--ignore-dependencies".to_string()));
        assert!(strs.contains(&"--build-bottle".to_string()));
        assert!(strs.contains(&"--bottle-arch=core2".to_string()));
        assert!(strs.contains(&"--verbose".to_string()));
        assert!(strs.contains(&"--cc=clang".to_string()));
    }

    #[test]
    fn test_argv_env_derived_from_scons_dep() {
        let mut formula = Formula::new("alpha", "1.0");
        formula
            .deps
            .push(crate::formula::Dependency::new("scons"));

        let argv = build_argv(&command_fixture(), &formula, &flags(), &Options::new());
        let strs: Vec<_> = argv.iter().map(|s| s.to_string_lossy().to_string()).collect();
        assert!(strs.contains(&"--env=std".to_string()));
    }

    #[test]
    fn test_argv_channel_and_options() {
        let mut formula = Formula::new("alpha", "1.0");
        formula.head = true;

        let options = Options::from_flags(["--with-docs", "CC=gcc-14"]);
        let argv = build_argv(&command_fixture(), &formula, &flags(), &options);
        let strs: Vec<_> = argv.iter().map(|s| s.to_string_lossy().to_string()).collect();
        assert!(strs.contains(&"--HEAD".to_string()));
        // Assignments come before option flags.
        let cc_pos = strs.iter().position(|s| s == "CC=gcc-14").unwrap();
        let opt_pos = strs.iter().position(|s| s == "--with-docs").unwrap();
        assert!(cc_pos < opt_pos);
    }

    /// A stand-in interpreter: a shell script that ignores the `-W0 -I ...`
    /// preamble and performs whatever its body says.
    #[cfg(unix)]
    fn stub_interpreter(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-interp");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_run_build_creates_keg() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path().join("prefix"));
        let formula = Formula::new("alpha", "1.0");

        let command = BuildCommand {
            interpreter: stub_interpreter(
                tmp.path(),
                "mkdir -p \"$HOMEBREW_FORMULA_PREFIX/bin\" && echo ok > \"$HOMEBREW_FORMULA_PREFIX/bin/alpha\"",
            ),
            library_path: tmp.path().to_path_buf(),
            script: tmp.path().join("build.rb"),
        };

        run_build(&layout, &formula, &command, &flags(), &Options::new()).unwrap();
        assert!(layout.keg_prefix("alpha", "1.0").join("bin/alpha").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_build_failure_removes_partial_prefix() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path().join("prefix"));
        let formula = Formula::new("alpha", "1.0");

        let command = BuildCommand {
            interpreter: stub_interpreter(
                tmp.path(),
                "mkdir -p \"$HOMEBREW_FORMULA_PREFIX/bin\"; exit 1",
            ),
            library_path: tmp.path().to_path_buf(),
            script: tmp.path().join("build.rb"),
        };

        let err = run_build(&layout, &formula, &command, &flags(), &Options::new()).unwrap_err();
        assert!(matches!(err, KegError::BuildFailed(_)));
        assert!(!layout.keg_prefix("alpha", "1.0").exists());
        assert!(!layout.rack("alpha").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_build_empty_prefix_rejected() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path().join("prefix"));
        let formula = Formula::new("alpha", "1.0");

        let command = BuildCommand {
            interpreter: stub_interpreter(tmp.path(), "mkdir -p \"$HOMEBREW_FORMULA_PREFIX\""),
            library_path: tmp.path().to_path_buf(),
            script: tmp.path().join("build.rb"),
        };

        let err = run_build(&layout, &formula, &command, &flags(), &Options::new()).unwrap_err();
        assert!(matches!(err, KegError::EmptyInstallation(_)));
        assert!(!layout.rack("alpha").exists());
    }
}
