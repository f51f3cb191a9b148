//! Keghouse - a formula install engine
//!
//! Takes a declarative package description ("formula") from uninstalled to
//! linked and usable, recursively satisfying its dependency graph. Each
//! install either pours a prebuilt bottle or compiles from source in an
//! isolated child process, with transactional safety around in-place
//! upgrades: an interrupted install leaves the prefix either untouched or
//! completely installed, never half-done.
//!
//! # Architecture
//!
//! - **cellar.rs**: prefix/Cellar layout and installed-keg queries
//! - **options.rs**: build option sets and the with?/without? predicates
//! - **formula.rs**: the formula model the installer consumes
//! - **deps.rs**: requirement and dependency expansion into an install plan
//! - **installer.rs**: the orchestration core
//! - **build.rs**: source build in a pristine-environment child
//! - **pour.rs / download.rs / stage.rs**: the bottle path
//! - **keg.rs**: symlinking kegs into the shared prefix
//! - **lock.rs / interrupt.rs**: advisory locks and masked rollback windows
//!
//! # Quick Start
//!
//! ```no_run
//! use keghouse::{InstallContext, Installer, InstallerFlags, Layout, Options};
//! # use keghouse::{Formula, FormulaSource, Result, KegError};
//! # struct Store;
//! # impl FormulaSource for Store {
//! #     fn load(&self, name: &str) -> Result<Formula> { Err(KegError::FormulaUnavailable(name.into())) }
//! #     fn tap(&self, _: &str) -> Result<()> { Ok(()) }
//! # }
//!
//! fn main() -> anyhow::Result<()> {
//!     let layout = Layout::detect();
//!     let store = Store;
//!     let formula = store.load("ripgrep")?;
//!
//!     let ctx = InstallContext::new();
//!     let mut installer = Installer::new(
//!         layout,
//!         &store,
//!         &ctx,
//!         formula,
//!         Options::new(),
//!         InstallerFlags::default(),
//!     );
//!     installer.run()?;
//!
//!     Ok(())
//! }
//! ```

pub mod build;
pub mod cellar;
pub mod deps;
pub mod download;
pub mod error;
pub mod formula;
pub mod installer;
pub mod interrupt;
pub mod keg;
pub mod lock;
pub mod options;
pub mod pour;
pub mod relocate;
pub mod sandbox;
pub mod stage;
pub mod tab;

pub use build::BuildCommand;
pub use cellar::{InstalledKeg, Layout};
pub use deps::{ExpandedDep, Expansion, Visit};
pub use error::{KegError, Result};
pub use formula::{
    BottleCellar, BottleSpec, Conflict, DepTag, Dependency, Formula, FormulaSource, Requirement,
    RequirementCheck,
};
pub use installer::{Hooks, InstallContext, Installer, InstallerFlags};
pub use keg::{linked_keg, linked_version, Keg};
pub use options::{BuildOption, BuildOptions, Options};
pub use tab::Tab;
