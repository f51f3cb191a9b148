//! The formula model consumed by the installer.
//!
//! Formula definitions are loaded elsewhere (a tap checkout, a JSON API);
//! this module only describes the shape the installer consumes: dependency
//! edges with tags, requirements, a bottle descriptor, conflicts, and the
//! path locators into the cellar layout.

use crate::cellar::Layout;
use crate::error::Result;
use crate::options::Options;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tags carried by a dependency edge or a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepTag {
    Build,
    Run,
    Optional,
    Recommended,
    Universal,
}

/// One edge of the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<DepTag>,
    /// Options to pass to the target's build.
    #[serde(default, skip)]
    pub options: Options,
}

impl Dependency {
    pub fn new(name: impl Into<String>) -> Self {
        Dependency {
            name: name.into(),
            tags: vec![],
            options: Options::new(),
        }
    }

    pub fn with_tags(name: impl Into<String>, tags: Vec<DepTag>) -> Self {
        Dependency {
            name: name.into(),
            tags,
            options: Options::new(),
        }
    }

    pub fn build(&self) -> bool {
        self.tags.contains(&DepTag::Build)
    }

    pub fn run(&self) -> bool {
        self.tags.contains(&DepTag::Run)
    }

    pub fn optional(&self) -> bool {
        self.tags.contains(&DepTag::Optional)
    }

    pub fn recommended(&self) -> bool {
        self.tags.contains(&DepTag::Recommended)
    }

    /// The option name controlling an optional/recommended edge:
    /// `--with-<name>` / `--without-<name>`.
    pub fn option_name(&self) -> &str {
        &self.name
    }
}

/// How a requirement decides it is satisfied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementCheck {
    /// An environment variable must be set and non-empty.
    EnvSet(String),
    /// An executable must exist at this path.
    ExecutableAt(PathBuf),
    /// Pre-decided (loaders evaluate host facts at load time).
    Const(bool),
}

/// A named precondition on the host, possibly defaulting to a formula that
/// provides it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<DepTag>,
    #[serde(default)]
    pub fatal: bool,
    /// When set, the requirement can be materialized into a dependency on
    /// this formula.
    #[serde(default)]
    pub default_formula: Option<String>,
    pub check: RequirementCheck,
}

impl Requirement {
    pub fn satisfied(&self) -> bool {
        match &self.check {
            RequirementCheck::EnvSet(var) => {
                std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false)
            }
            RequirementCheck::ExecutableAt(path) => path.is_file(),
            RequirementCheck::Const(value) => *value,
        }
    }

    pub fn build(&self) -> bool {
        self.tags.contains(&DepTag::Build)
    }

    pub fn run(&self) -> bool {
        self.tags.contains(&DepTag::Run)
    }

    pub fn optional(&self) -> bool {
        self.tags.contains(&DepTag::Optional)
    }

    pub fn recommended(&self) -> bool {
        self.tags.contains(&DepTag::Recommended)
    }

    pub fn default_formula(&self) -> bool {
        self.default_formula.is_some()
    }

    /// Project the requirement onto its default formula as a dependency
    /// edge, carrying the requirement's tags.
    pub fn to_dependency(&self) -> Option<Dependency> {
        self.default_formula
            .as_ref()
            .map(|name| Dependency::with_tags(name.clone(), self.tags.clone()))
    }
}

/// Where a bottle expects the Cellar to live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleCellar {
    /// Relocatable; works in any cellar.
    Any,
    /// Built against a fixed cellar path.
    Fixed(PathBuf),
}

impl BottleCellar {
    pub fn compatible_with(&self, cellar: &Path) -> bool {
        match self {
            BottleCellar::Any => true,
            BottleCellar::Fixed(path) => path == cellar,
        }
    }
}

/// Prebuilt binary artifact descriptor for the current platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleSpec {
    pub url: String,
    pub sha256: String,
    pub cellar: BottleCellar,
}

/// A formula this one cannot be linked alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub name: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A declarative package description.
#[derive(Debug, Clone)]
pub struct Formula {
    pub name: String,
    pub full_name: String,
    pub version: String,
    pub tap: Option<String>,
    pub deps: Vec<Dependency>,
    pub requirements: Vec<Requirement>,
    /// Options the formula declares as selectable.
    pub options: Options,
    /// Old option name -> current spelling.
    pub deprecated_options: Vec<(String, String)>,
    pub conflicts: Vec<Conflict>,
    pub bottle: Option<BottleSpec>,
    pub plist: Option<String>,
    pub post_install: bool,
    pub keg_only: bool,
    pub head: bool,
    pub devel: bool,
    /// The formula requests the standard build environment.
    pub env_std: bool,
    pub requires_universal_deps: bool,
    /// The formula's own predicate permitting bottle use.
    pub pour_bottle_ok: bool,
    pub sandbox_disabled: bool,
    /// The formula definition file on disk, when loaded from one.
    pub path: Option<PathBuf>,
    /// The definition file differs from its committed state.
    pub file_modified: bool,
}

impl Formula {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        Formula {
            full_name: name.clone(),
            name,
            version: version.into(),
            tap: None,
            deps: vec![],
            requirements: vec![],
            options: Options::new(),
            deprecated_options: vec![],
            conflicts: vec![],
            bottle: None,
            plist: None,
            post_install: false,
            keg_only: false,
            head: false,
            devel: false,
            env_std: false,
            requires_universal_deps: false,
            pour_bottle_ok: true,
            sandbox_disabled: false,
            path: None,
            file_modified: false,
        }
    }

    pub fn prefix(&self, layout: &Layout) -> PathBuf {
        layout.keg_prefix(&self.name, &self.version)
    }

    pub fn rack(&self, layout: &Layout) -> PathBuf {
        layout.rack(&self.name)
    }

    pub fn opt_prefix(&self, layout: &Layout) -> PathBuf {
        layout.opt_prefix(&self.name)
    }

    pub fn bottle_prefix(&self, layout: &Layout) -> PathBuf {
        layout.bottle_prefix(&self.name, &self.version)
    }

    pub fn logs(&self, layout: &Layout) -> PathBuf {
        layout.logs(&self.name)
    }

    pub fn option_defined(&self, name: &str) -> bool {
        self.options.contains(name)
    }

    /// Remap any deprecated option spellings in `args` to their current
    /// names, reporting what was remapped.
    pub fn remap_deprecated_options(&self, args: &Options) -> (Options, Vec<(String, String)>) {
        let mut remapped = Options::new();
        let mut notices = Vec::new();
        for opt in args.iter() {
            match self
                .deprecated_options
                .iter()
                .find(|(old, _)| old == &opt.name)
            {
                Some((old, new)) => {
                    notices.push((old.clone(), new.clone()));
                    remapped.insert(crate::options::BuildOption::new(new.as_str()));
                }
                None => remapped.insert(opt.clone()),
            }
        }
        (remapped, notices)
    }
}

/// External formula loading collaborator. `load` resolves a name to a full
/// formula; `tap` fetches a tap so a failed load can be retried once.
pub trait FormulaSource {
    fn load(&self, name: &str) -> Result<Formula>;
    fn tap(&self, tap: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_to_dependency_carries_tags() {
        let req = Requirement {
            name: "xml2".into(),
            tags: vec![DepTag::Build],
            fatal: true,
            default_formula: Some("libxml2".into()),
            check: RequirementCheck::Const(false),
        };
        let dep = req.to_dependency().unwrap();
        assert_eq!(dep.name, "libxml2");
        assert!(dep.build());
    }

    #[test]
    fn test_bottle_cellar_compatibility() {
        let any = BottleCellar::Any;
        assert!(any.compatible_with(Path::new("/opt/homebrew/Cellar")));

        let fixed = BottleCellar::Fixed(PathBuf::from("/usr/local/Cellar"));
        assert!(fixed.compatible_with(Path::new("/usr/local/Cellar")));
        assert!(!fixed.compatible_with(Path::new("/opt/homebrew/Cellar")));
    }

    #[test]
    fn test_remap_deprecated_options() {
        let mut f = Formula::new("pkg", "1.0");
        f.deprecated_options
            .push(("with-check".into(), "with-tests".into()));

        let args = Options::from_flags(["--with-check", "--with-docs"]);
        let (remapped, notices) = f.remap_deprecated_options(&args);

        assert_eq!(remapped.flags(), vec!["--with-tests", "--with-docs"]);
        assert_eq!(notices, vec![("with-check".into(), "with-tests".into())]);
    }

    #[test]
    fn test_const_requirement() {
        let req = Requirement {
            name: "always".into(),
            tags: vec![],
            fatal: false,
            default_formula: None,
            check: RequirementCheck::Const(true),
        };
        assert!(req.satisfied());
    }
}
