//! Install orchestration.
//!
//! One [`Installer`] owns one formula's journey from uninstalled to linked:
//! preflight checks, recursive dependency installs, the pour-or-build
//! decision, and the finishing pass that links the keg into the prefix.
//! Dependency installs recurse through a derived installer that suppresses
//! its own dependency expansion.
//!
//! Process-wide state (the attempted set, the held locks, the global
//! failure flag) lives in an [`InstallContext`] owned by the root install
//! and threaded by reference into children.

use crate::build::{self, BuildCommand};
use crate::cellar::{self, Layout};
use crate::deps::{ExpandedDep, Expansion};
use crate::error::{KegError, Result};
use crate::formula::{Formula, FormulaSource};
use crate::interrupt;
use crate::keg::{self, Keg};
use crate::lock::FormulaLock;
use crate::options::Options;
use crate::pour::{self, BottleSource};
use crate::relocate;
use crate::tab::Tab;
use anyhow::Context;
use colored::Colorize;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Bottle architectures `--bottle-arch` accepts.
const KNOWN_BOTTLE_ARCHS: &[&str] = &[
    "core2",
    "penryn",
    "nehalem",
    "sandybridge",
    "ivybridge",
    "haswell",
    "x86_64",
    "arm64",
];

/// External collaborators the installer delegates to. Every hook is
/// optional; the default implementation claims nothing and does nothing.
pub trait Hooks {
    /// An external system wants to provide the bottle itself.
    fn claims_bottle(&self, _formula: &Formula) -> bool {
        false
    }

    fn pour(&self, _layout: &Layout, _formula: &Formula) -> Result<()> {
        Ok(())
    }

    /// Post-build cleanup (pruning .la files and the like).
    fn clean(&self, _layout: &Layout, _formula: &Formula) -> Result<()> {
        Ok(())
    }

    fn post_install(&self, _layout: &Layout, _formula: &Formula) -> Result<()> {
        Ok(())
    }
}

/// Mode flags for one install invocation. A plain record with explicit
/// predicates; children derive theirs from the root's.
#[derive(Debug, Clone, Default)]
pub struct InstallerFlags {
    pub build_from_source: bool,
    pub build_bottle: bool,
    pub bottle_arch: Option<String>,
    pub force_bottle: bool,
    pub force: bool,
    pub ignore_deps: bool,
    pub only_deps: bool,
    pub interactive: bool,
    pub git: bool,
    pub verbose: bool,
    pub debug: bool,
    pub quieter: bool,
    pub cc: Option<String>,
    pub build_env: Option<String>,
    pub sandbox: bool,
    /// A bottle archive already on disk; bypasses fetch and the
    /// modified-formula gate.
    pub local_bottle: Option<PathBuf>,
    /// Developer mode re-raises pour failures instead of falling back.
    pub developer: bool,
}

/// Process-wide installer state shared across the root and its children.
#[derive(Default)]
pub struct InstallContext {
    attempted: Mutex<HashSet<String>>,
    locks: Mutex<Vec<FormulaLock>>,
    failed: AtomicBool,
}

impl InstallContext {
    pub fn new() -> Self {
        InstallContext::default()
    }

    pub fn already_attempted(&self, name: &str) -> bool {
        self.attempted.lock().unwrap().contains(name)
    }

    /// Insert `name`; false when it was already present.
    fn mark_attempted(&self, name: &str) -> bool {
        self.attempted.lock().unwrap().insert(name.to_string())
    }

    pub fn attempted(&self) -> Vec<String> {
        let mut names: Vec<_> = self.attempted.lock().unwrap().iter().cloned().collect();
        names.sort();
        names
    }

    fn holds_locks(&self) -> bool {
        !self.locks.lock().unwrap().is_empty()
    }

    fn hold_locks(&self, locks: Vec<FormulaLock>) {
        self.locks.lock().unwrap().extend(locks);
    }

    fn release_locks(&self) {
        self.locks.lock().unwrap().clear();
    }

    pub fn mark_failure(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    /// A non-fatal step (link, plist, clean, post-install) failed even
    /// though the installation itself succeeded.
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

pub struct Installer<'a, S: FormulaSource> {
    layout: Layout,
    store: &'a S,
    ctx: &'a InstallContext,
    formula: Formula,
    /// Options requested for this formula's build.
    options: Options,
    flags: InstallerFlags,
    build_command: BuildCommand,
    hooks: Option<&'a dyn Hooks>,

    pub show_header: bool,
    show_summary_heading: bool,
    poured_bottle: bool,
    pour_failed: bool,
    hold_locks: bool,
    start_time: Option<Instant>,
    etc_var_preinstall: Vec<PathBuf>,
    /// The keg this install produced (the staged path may carry a bottle
    /// revision suffix the formula version lacks).
    installed_keg_path: Option<PathBuf>,
}

impl<'a, S: FormulaSource> Installer<'a, S> {
    pub fn new(
        layout: Layout,
        store: &'a S,
        ctx: &'a InstallContext,
        formula: Formula,
        options: Options,
        flags: InstallerFlags,
    ) -> Self {
        let build_command = BuildCommand::detect(&layout);
        Installer {
            layout,
            store,
            ctx,
            formula,
            options,
            flags,
            build_command,
            hooks: None,
            show_header: false,
            show_summary_heading: false,
            poured_bottle: false,
            pour_failed: false,
            hold_locks: false,
            start_time: None,
            etc_var_preinstall: vec![],
            installed_keg_path: None,
        }
    }

    pub fn set_build_command(&mut self, command: BuildCommand) {
        self.build_command = command;
    }

    pub fn set_hooks(&mut self, hooks: &'a dyn Hooks) {
        self.hooks = Some(hooks);
    }

    /// Run the whole sequence: preflight, install, finish. Locks the root
    /// acquired are released exactly once, on every exit path.
    pub fn run(&mut self) -> Result<()> {
        let result = self.prelude().and_then(|()| self.install());
        match result {
            Ok(()) => self.finish(),
            Err(e) => {
                if self.hold_locks {
                    self.ctx.release_locks();
                    self.hold_locks = false;
                }
                Err(e)
            }
        }
    }

    // ---- decision: bottle or source -------------------------------------

    /// Will this install come from a bottle?
    ///
    /// With `warn` set, a cellar incompatibility (the only silent-by-default
    /// gate worth telling the user about) is reported.
    pub fn pour_bottle(&self, warn: bool) -> bool {
        if let Some(hooks) = self.hooks {
            if hooks.claims_bottle(&self.formula) {
                return true;
            }
        }

        if self.pour_failed {
            return false;
        }

        if self.flags.force_bottle && self.formula.bottle.is_some() {
            return true;
        }

        if self.flags.build_from_source || self.flags.build_bottle || self.flags.interactive {
            return false;
        }

        if !self.options.is_empty() {
            return false;
        }

        if self.formula.file_modified && self.flags.local_bottle.is_none() {
            return false;
        }

        // A bottle already on disk needs no descriptor.
        if self.flags.local_bottle.is_some() {
            return true;
        }

        let Some(bottle) = &self.formula.bottle else {
            return false;
        };

        if !self.formula.pour_bottle_ok {
            return false;
        }

        if !bottle.cellar.compatible_with(&self.layout.cellar) {
            if warn {
                println!(
                    "{} Building {} from source: the bottle needs a different Cellar",
                    "⚠".yellow(),
                    self.formula.name.bold()
                );
            }
            return false;
        }

        true
    }

    // ---- preflight -------------------------------------------------------

    /// Load the transitive closure, acquire locks, and run the sanity
    /// gates that must pass before anything mutates.
    pub fn prelude(&mut self) -> Result<()> {
        let closure = self.load_closure()?;

        if !self.ctx.holds_locks() {
            let mut locks = vec![FormulaLock::acquire(&self.layout, &self.formula.name)?];
            let mut dep_names: Vec<_> = closure.iter().map(|f| f.name.clone()).collect();
            dep_names.sort();
            for name in dep_names {
                locks.push(FormulaLock::acquire(&self.layout, &name)?);
            }
            self.ctx.hold_locks(locks);
            self.hold_locks = true;
        }

        if self.ctx.already_attempted(&self.formula.name) {
            return Err(KegError::AlreadyAttempted(self.formula.name.clone()));
        }

        if !self.flags.ignore_deps {
            let mut unlinked: Vec<String> = closure
                .iter()
                .filter(|dep| {
                    !dep.keg_only
                        && self.layout.installed(&dep.name)
                        && matches!(keg::linked_version(&self.layout, &dep.name), Ok(None))
                })
                .map(|dep| dep.name.clone())
                .collect();
            unlinked.sort();
            unlinked.dedup();
            if !unlinked.is_empty() {
                return Err(KegError::UnlinkedDependencies(unlinked));
            }
        }

        Ok(())
    }

    /// Every formula in the transitive dependency closure, loaded. A
    /// tap-unavailable load triggers one auto-tap and a retry; other load
    /// failures are annotated with the dependent and re-raised.
    fn load_closure(&self) -> Result<Vec<Formula>> {
        let mut loaded = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: Vec<(String, String)> = self
            .formula
            .deps
            .iter()
            .map(|d| (self.formula.name.clone(), d.name.clone()))
            .collect();
        let mut tapped_once = false;

        while let Some((dependent, name)) = queue.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }

            let formula = match self.store.load(&name) {
                Ok(f) => f,
                Err(KegError::TapFormulaUnavailable { tap, name }) if !tapped_once => {
                    tapped_once = true;
                    self.store.tap(&tap)?;
                    self.store
                        .load(&name)
                        .map_err(|e| e.annotate_dependent(&dependent))?
                }
                Err(e) => return Err(e.annotate_dependent(&dependent)),
            };

            for dep in &formula.deps {
                queue.push((formula.name.clone(), dep.name.clone()));
            }
            loaded.push(formula);
        }

        Ok(loaded)
    }

    /// Abort when a conflicting formula is linked (unless forced).
    pub fn check_conflicts(&self) -> Result<()> {
        if self.flags.force {
            return Ok(());
        }

        let mut linked_conflicts = Vec::new();
        for conflict in &self.formula.conflicts {
            let linked = matches!(
                keg::linked_version(&self.layout, &conflict.name),
                Ok(Some(_))
            );
            let opt_present = self
                .layout
                .opt_prefix(&conflict.name)
                .symlink_metadata()
                .is_ok();
            if linked && opt_present {
                linked_conflicts.push(conflict.name.clone());
            }
        }

        if let Some(first) = linked_conflicts.first() {
            return Err(KegError::Conflict {
                formula: self.formula.name.clone(),
                conflict: if linked_conflicts.len() == 1 {
                    first.clone()
                } else {
                    linked_conflicts.join(", ")
                },
            });
        }

        Ok(())
    }

    // ---- install ---------------------------------------------------------

    pub fn install(&mut self) -> Result<()> {
        // A different linked version means the user must unlink first; the
        // same version linked is a reinstall and proceeds.
        if let Ok(Some(linked)) = keg::linked_version(&self.layout, &self.formula.name) {
            if linked != self.formula.version {
                return Err(KegError::AlreadyLinked {
                    name: self.formula.name.clone(),
                    version: linked,
                });
            }
        }

        self.check_conflicts()?;

        if !self.flags.ignore_deps {
            self.compute_and_install_dependencies()?;
        }

        if self.flags.only_deps {
            return Ok(());
        }

        if self.flags.build_bottle {
            if let Some(arch) = &self.flags.bottle_arch {
                if !KNOWN_BOTTLE_ARCHS.contains(&arch.as_str()) {
                    return Err(KegError::UnknownBottleArch(arch.clone()));
                }
            }
        }

        let (_, deprecated) = self.formula.remap_deprecated_options(&self.options);
        for (old, new) in deprecated {
            println!(
                "{} --{old} is deprecated; use --{new} instead",
                "⚠".yellow()
            );
        }

        if self.show_header {
            println!(
                "==> Installing {} {}",
                self.formula.name.bold(),
                self.formula.version.dimmed()
            );
        }

        if !self.ctx.mark_attempted(&self.formula.name) {
            return Err(KegError::AlreadyAttempted(self.formula.name.clone()));
        }

        if self.pour_bottle(true) {
            match self.pour() {
                Ok(()) => self.poured_bottle = true,
                Err(e) if !self.flags.developer => {
                    self.pour_failed = true;
                    println!(
                        "{} Bottle installation failed: {e}",
                        "⚠".yellow()
                    );
                    println!("Falling back to building {} from source", self.formula.name.bold());
                }
                Err(e) => {
                    return Err(KegError::PourFailed {
                        formula: self.formula.name.clone(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        if self.flags.build_bottle {
            self.etc_var_preinstall = cellar::etc_var_snapshot(&self.layout);
        }

        if !self.poured_bottle {
            if self.formula.file_modified && !self.flags.build_from_source {
                println!(
                    "{} {} was modified locally; pass --build-from-source to silence this",
                    "⚠".yellow(),
                    self.formula.name.bold()
                );
            }

            // The bottle path may have skipped build-time deps; recompute.
            // Already-installed deps expand to Skip, so this is idempotent.
            if self.pour_failed && !self.flags.ignore_deps {
                self.compute_and_install_dependencies()?;
            }

            self.build()?;
            self.clean();
        }

        if self.flags.build_bottle {
            pour::mirror_new_etc_var(&self.layout, &self.formula, &self.etc_var_preinstall)?;
        }

        let keg_path = self.installed_keg();
        let empty = fs::read_dir(&keg_path)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true);
        if empty {
            println!(
                "{} Nothing was installed to {}",
                "⚠".yellow(),
                keg_path.display()
            );
        }

        Ok(())
    }

    fn installed_keg(&self) -> PathBuf {
        self.installed_keg_path
            .clone()
            .unwrap_or_else(|| self.formula.prefix(&self.layout))
    }

    // ---- dependencies ----------------------------------------------------

    fn compute_and_install_dependencies(&mut self) -> Result<()> {
        let root_pours = self.pour_bottle(false);
        let mut expansion = Expansion::new(
            &self.layout,
            self.store,
            &self.formula,
            &self.options,
            root_pours,
            self.flags.build_bottle,
        );

        let (unsatisfied, materialized) = expansion.expand_requirements()?;

        let mut fatal = Vec::new();
        for (dependent, reqs) in &unsatisfied {
            for req in reqs {
                println!(
                    "{} {} requirement of {} is not satisfied",
                    "✗".red(),
                    req.name.bold(),
                    dependent
                );
                if req.fatal {
                    fatal.push(req.name.clone());
                }
            }
        }
        if !fatal.is_empty() {
            return Err(KegError::UnsatisfiedRequirements {
                formula: self.formula.name.clone(),
                requirements: fatal,
            });
        }

        let plan = expansion.expand_dependencies(materialized)?;

        if !plan.is_empty() {
            println!(
                "==> Installing dependencies for {}: {}",
                self.formula.name.bold(),
                plan.iter()
                    .map(|e| e.dep.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
                    .cyan()
            );
            for entry in &plan {
                self.install_dependency(entry)?;
            }
        }

        Ok(())
    }

    /// Install one dependency with an in-place upgrade that is crash-safe
    /// up to a single rename: the live keg is stashed at a `.tmp` sibling
    /// and restored (and re-linked) if anything fails.
    fn install_dependency(&mut self, entry: &ExpandedDep) -> Result<()> {
        let df = self
            .store
            .load(&entry.dep.name)
            .map_err(|e| e.annotate_dependent(&self.formula.name))?;
        let tab = Tab::for_formula(&self.layout, &df.name);

        let previously_linked = keg::linked_keg(&self.layout, &df.name)?;
        if let Some(linked) = &previously_linked {
            linked.unlink()?;
        }

        let stash = self.stash_installed_keg(&df, previously_linked.as_ref())?;

        let result = self.run_dependency_install(&df, &tab, entry);

        match result {
            Ok(()) => {
                interrupt::uninterruptible(|| {
                    if let Some((_, tmp)) = &stash {
                        if let Err(e) = fs::remove_dir_all(tmp) {
                            tracing::warn!("failed to remove stash {}: {e}", tmp.display());
                        }
                    }
                });
                Ok(())
            }
            Err(e) => {
                interrupt::uninterruptible(|| {
                    if let Some((original, tmp)) = &stash {
                        // Only restore when the failed install didn't leave
                        // its own directory at the original path.
                        if !original.exists() {
                            if let Err(e) = fs::rename(tmp, original) {
                                tracing::warn!(
                                    "failed to restore {} from stash: {e}",
                                    original.display()
                                );
                            }
                        }
                    }
                    if let Some(linked) = &previously_linked {
                        if linked.exists() {
                            let _ = linked.link();
                            let _ = linked.optlink();
                            let _ = linked.record_linked();
                        }
                    }
                });
                Err(e)
            }
        }
    }

    /// Rename the installed keg (the linked one, else the newest) to a
    /// `.tmp` sibling. Returns `(original, stash)` paths.
    fn stash_installed_keg(
        &self,
        df: &Formula,
        previously_linked: Option<&Keg>,
    ) -> Result<Option<(PathBuf, PathBuf)>> {
        let existing = match previously_linked {
            Some(keg) => Some(keg.path.clone()),
            None => self
                .layout
                .installed_kegs(&df.name)?
                .first()
                .map(|keg| keg.path.clone()),
        };

        let Some(original) = existing else {
            return Ok(None);
        };
        if !original.exists() {
            return Ok(None);
        }

        let mut tmp_name = original.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = original.with_file_name(tmp_name);

        fs::rename(&original, &tmp)
            .with_context(|| format!("Failed to stash {}", original.display()))?;

        Ok(Some((original, tmp)))
    }

    fn run_dependency_install(
        &mut self,
        df: &Formula,
        tab: &Tab,
        entry: &ExpandedDep,
    ) -> Result<()> {
        let (remapped, _) = df.remap_deprecated_options(&entry.dep.options);
        let options = tab
            .used_options()
            .union(&remapped)
            .union(&entry.options);

        let child_flags = InstallerFlags {
            ignore_deps: true,
            build_from_source: self.flags.build_from_source,
            verbose: self.flags.verbose,
            debug: self.flags.debug,
            ..InstallerFlags::default()
        };

        let mut child = Installer::new(
            self.layout.clone(),
            self.store,
            self.ctx,
            df.clone(),
            options,
            child_flags,
        );
        child.build_command = self.build_command.clone();
        child.hooks = self.hooks;
        child.show_header = true;

        child.prelude()?;
        child.install()?;
        child.finish()
    }

    // ---- pour / build ----------------------------------------------------

    fn pour(&mut self) -> Result<()> {
        if let Some(hooks) = self.hooks {
            if hooks.claims_bottle(&self.formula) {
                hooks.pour(&self.layout, &self.formula)?;
                self.installed_keg_path = Some(self.formula.prefix(&self.layout));
                return Ok(());
            }
        }

        let source = match &self.flags.local_bottle {
            Some(path) => BottleSource::Local(path.clone()),
            None => {
                let spec = self
                    .formula
                    .bottle
                    .as_ref()
                    .ok_or_else(|| KegError::NoBottle(self.formula.name.clone()))?;
                BottleSource::Remote(spec)
            }
        };

        let staged = pour::pour_bottle(&self.layout, &self.formula, source, self.flags.quieter)?;
        self.installed_keg_path = Some(staged);
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        self.start_time = Some(Instant::now());

        build::run_build(
            &self.layout,
            &self.formula,
            &self.build_command,
            &self.flags,
            &self.options,
        )?;

        let keg_path = self.formula.prefix(&self.layout);
        let tab = Tab::new_for_build(
            &self.options,
            self.flags.cc.clone(),
            self.flags.build_bottle,
        );
        tab.write(&keg_path).map_err(KegError::Other)?;

        self.installed_keg_path = Some(keg_path);
        Ok(())
    }

    fn clean(&mut self) {
        if let Some(hooks) = self.hooks {
            if let Err(e) = hooks.clean(&self.layout, &self.formula) {
                println!("{} Cleaning {} failed: {e}", "⚠".yellow(), self.formula.name);
                self.ctx.mark_failure();
                self.show_summary_heading = true;
            }
        }
    }

    // ---- finish ----------------------------------------------------------

    pub fn finish(&mut self) -> Result<()> {
        let result = self.finish_inner();

        if self.hold_locks {
            self.ctx.release_locks();
            self.hold_locks = false;
        }

        result
    }

    fn finish_inner(&mut self) -> Result<()> {
        if self.flags.only_deps {
            return Ok(());
        }

        if self.formula.plist.is_some() {
            if let Err(e) = self.install_plist() {
                println!(
                    "{} Failed to install service plist for {}: {e}",
                    "⚠".yellow(),
                    self.formula.name
                );
                self.ctx.mark_failure();
                self.show_summary_heading = true;
            }
        }

        self.link_keg()?;

        if self.poured_bottle || cfg!(target_os = "macos") {
            if let Err(e) = relocate::relocate_keg(&self.layout, &self.installed_keg()) {
                println!(
                    "{} Failed to fix install names for {}: {e}",
                    "⚠".yellow(),
                    self.formula.name
                );
                self.ctx.mark_failure();
                self.show_summary_heading = true;
            }
        }

        // A bottle must not bake post-install effects into the archive.
        if self.formula.post_install && !self.flags.build_bottle {
            if let Some(hooks) = self.hooks {
                if let Err(e) = hooks.post_install(&self.layout, &self.formula) {
                    println!(
                        "{} post_install for {} failed: {e}",
                        "⚠".yellow(),
                        self.formula.name
                    );
                    self.ctx.mark_failure();
                    self.show_summary_heading = true;
                }
            }
        }

        self.summary();

        Ok(())
    }

    /// Atomic plist install: write to a temp sibling, set mode, rename.
    fn install_plist(&self) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let Some(plist) = &self.formula.plist else {
            return Ok(());
        };

        let keg_path = self.installed_keg();
        let plist_path = keg_path.join(format!("homebrew.mxcl.{}.plist", self.formula.name));
        let tmp_path = plist_path.with_extension("plist.tmp");

        fs::write(&tmp_path, plist)
            .with_context(|| format!("Failed to write: {}", tmp_path.display()))?;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o644))?;
        fs::rename(&tmp_path, &plist_path)
            .with_context(|| format!("Failed to install: {}", plist_path.display()))?;

        let logs = self.formula.logs(&self.layout);
        if plist.contains(&logs.display().to_string()) {
            fs::create_dir_all(&logs)?;
        }

        Ok(())
    }

    fn link_keg(&mut self) -> Result<()> {
        let keg_path = self.installed_keg();
        let Some(keg) = Keg::from_path(&self.layout, &keg_path) else {
            return Ok(());
        };

        if self.formula.keg_only {
            if let Err(e) = keg.optlink() {
                println!(
                    "{} Failed to create opt link for {}: {e}",
                    "⚠".yellow(),
                    self.formula.name
                );
                self.ctx.mark_failure();
                self.show_summary_heading = true;
            }
            return Ok(());
        }

        if keg.linked() {
            // Stale record from an interrupted run; clear it and relink.
            keg.remove_linked_record()?;
        }

        match keg.link() {
            Ok(_) => {
                keg.optlink()?;
                keg.record_linked()?;
                Ok(())
            }
            Err(KegError::LinkConflict { .. }) => {
                let conflicts = keg.link_dry_run_overwrite().unwrap_or_default();
                println!(
                    "{} Could not link {}: files already exist in the prefix:",
                    "✗".red(),
                    self.formula.name.bold()
                );
                for file in &conflicts {
                    println!("  {}", file.display());
                }
                println!(
                    "Run `keg link --overwrite {}` to overwrite them",
                    self.formula.name
                );
                self.ctx.mark_failure();
                self.show_summary_heading = true;
                Ok(())
            }
            Err(KegError::Io(e)) => {
                println!(
                    "{} Could not link {}: {e}",
                    "✗".red(),
                    self.formula.name.bold()
                );
                self.ctx.mark_failure();
                self.show_summary_heading = true;
                Ok(())
            }
            Err(e) => {
                // Something unexpected: take the half-made links back out
                // before propagating.
                interrupt::uninterruptible(|| {
                    let _ = keg.unlink();
                });
                Err(e)
            }
        }
    }

    fn summary(&self) {
        if self.show_summary_heading {
            println!("==> {}", "Summary".bold());
        }

        let keg_path = self.installed_keg();
        let (files, bytes) = tree_stats(&keg_path);

        let mut line = String::new();
        if let Some(badge) = install_badge() {
            line.push_str(&badge);
            line.push_str("  ");
        }
        line.push_str(&format!(
            "{}: {} files, {}",
            keg_path.display(),
            files,
            human_size(bytes)
        ));
        if let Some(start) = self.start_time {
            line.push_str(&format!(", built in {} seconds", start.elapsed().as_secs()));
        }
        println!("{line}");
    }
}

/// The celebratory summary emoji, overridable and suppressible from the
/// environment.
fn install_badge() -> Option<String> {
    if std::env::var_os("HOMEBREW_NO_EMOJI").is_some() {
        return None;
    }
    Some(
        std::env::var("HOMEBREW_INSTALL_BADGE").unwrap_or_else(|_| "\u{1F37A}".to_string()),
    )
}

fn tree_stats(path: &std::path::Path) -> (usize, u64) {
    let mut files = 0usize;
    let mut bytes = 0u64;
    for entry in walkdir::WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() {
            files += 1;
            bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    (files, bytes)
}

fn human_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes}B")
    }
}
