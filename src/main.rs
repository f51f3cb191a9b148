use clap::{Parser, Subcommand};
use colored::Colorize;
use keghouse::{
    keg, Formula, FormulaSource, InstallContext, Installer, InstallerFlags, KegError, Keg, Layout,
    Options, Result,
};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keg")]
#[command(author, version, about = "A formula install engine: pours bottles or builds from source", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a formula and its dependencies
    Install {
        /// Formula name
        formula: String,

        /// Compile from source even if a bottle is available
        #[arg(long)]
        build_from_source: bool,

        /// Build a bottle-ready keg
        #[arg(long)]
        build_bottle: bool,

        /// Optimize the bottle for a specific architecture
        #[arg(long, requires = "build_bottle")]
        bottle_arch: Option<String>,

        /// Use a bottle even when options or local changes would normally
        /// force a source build
        #[arg(long)]
        force_bottle: bool,

        /// Skip installing dependencies
        #[arg(long)]
        ignore_dependencies: bool,

        /// Install only the dependencies, not the formula itself
        #[arg(long)]
        only_dependencies: bool,

        /// Drop into an interactive build shell
        #[arg(long)]
        interactive: bool,

        /// Create a git repository in the build directory
        #[arg(long)]
        git: bool,

        /// Install the HEAD version
        #[arg(long = "HEAD")]
        head: bool,

        /// Install the development version
        #[arg(long)]
        devel: bool,

        /// Compiler to pass to the build
        #[arg(long)]
        cc: Option<String>,

        /// Build environment to use (e.g. std)
        #[arg(long)]
        env: Option<String>,

        /// Run the build inside a sandbox
        #[arg(long)]
        sandbox: bool,

        /// Pour this local bottle archive instead of downloading
        #[arg(long, value_name = "PATH")]
        bottle_path: Option<PathBuf>,

        /// Install even if conflicting formulae are linked
        #[arg(long)]
        force: bool,

        /// Less output
        #[arg(long)]
        quieter: bool,

        /// Show debug output and re-raise pour failures
        #[arg(long)]
        debug: bool,

        /// Build options (--with-x, --without-y, NAME=VALUE)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        options: Vec<String>,
    },

    /// Symlink an installed keg into the prefix
    Link {
        /// Formula name
        formula: String,
    },

    /// Remove a formula's symlinks from the prefix
    Unlink {
        /// Formula name
        formula: String,
    },

    /// List installed kegs
    List,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let layout = Layout::detect();

    match cli.command {
        Commands::Install {
            formula,
            build_from_source,
            build_bottle,
            bottle_arch,
            force_bottle,
            ignore_dependencies,
            only_dependencies,
            interactive,
            git,
            head,
            devel,
            cc,
            env,
            sandbox,
            bottle_path,
            force,
            quieter,
            debug,
            options,
        } => {
            let store = JsonSource::new(&layout);
            let mut target = store.load(&formula)?;
            target.head = head;
            target.devel = devel;

            let flags = InstallerFlags {
                build_from_source,
                build_bottle,
                bottle_arch,
                force_bottle,
                force,
                ignore_deps: ignore_dependencies,
                only_deps: only_dependencies,
                interactive,
                git,
                verbose: cli.verbose,
                debug,
                quieter,
                cc,
                build_env: env,
                sandbox,
                local_bottle: bottle_path,
                developer: debug,
            };

            let ctx = InstallContext::new();
            let mut installer = Installer::new(
                layout,
                &store,
                &ctx,
                target,
                Options::from_flags(&options),
                flags,
            );
            installer.run()?;

            if ctx.failed() {
                std::process::exit(1);
            }
        }
        Commands::Link { formula } => {
            let kegs = layout.installed_kegs(&formula)?;
            let Some(newest) = kegs.first() else {
                anyhow::bail!("{formula} is not installed");
            };
            let keg = Keg::new(&layout, &formula, &newest.version);
            let linked = keg.link()?;
            keg.optlink()?;
            keg.record_linked()?;
            println!(
                "{} Linked {} files for {}",
                "✓".green(),
                linked.len().to_string().bold(),
                formula.cyan()
            );
        }
        Commands::Unlink { formula } => {
            match keg::linked_keg(&layout, &formula)? {
                Some(keg) => {
                    let unlinked = keg.unlink()?;
                    keg.remove_opt_record()?;
                    println!(
                        "{} Unlinked {} files for {}",
                        "✓".green(),
                        unlinked.len().to_string().bold(),
                        formula.cyan()
                    );
                }
                None => println!("{} {} is not linked", "⚠".yellow(), formula.bold()),
            }
        }
        Commands::List => {
            let cellar = &layout.cellar;
            if !cellar.exists() {
                println!("No kegs installed");
                return Ok(());
            }
            let mut names: Vec<_> = std::fs::read_dir(cellar)?
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .filter(|n| !n.starts_with('.'))
                .collect();
            names.sort();
            for name in names {
                for keg in layout.installed_kegs(&name)? {
                    println!("{} {}", keg.name.bold(), keg.version.dimmed());
                }
            }
        }
    }

    Ok(())
}

/// Formula descriptors as JSON documents in a directory tree, one file per
/// formula. This is the CLI's loading collaborator; the install engine only
/// sees the [`FormulaSource`] trait.
struct JsonSource {
    formula_dir: PathBuf,
}

#[derive(Deserialize)]
struct FormulaDoc {
    name: String,
    #[serde(default)]
    full_name: Option<String>,
    version: String,
    #[serde(default)]
    tap: Option<String>,
    #[serde(default)]
    dependencies: Vec<DependencyDoc>,
    #[serde(default)]
    requirements: Vec<keghouse::Requirement>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    deprecated_options: Vec<(String, String)>,
    #[serde(default)]
    conflicts: Vec<keghouse::Conflict>,
    #[serde(default)]
    bottle: Option<keghouse::BottleSpec>,
    #[serde(default)]
    plist: Option<String>,
    #[serde(default)]
    post_install: bool,
    #[serde(default)]
    keg_only: bool,
    #[serde(default)]
    env_std: bool,
    #[serde(default)]
    requires_universal_deps: bool,
    #[serde(default = "default_true")]
    pour_bottle_ok: bool,
    #[serde(default)]
    sandbox_disabled: bool,
}

#[derive(Deserialize)]
struct DependencyDoc {
    name: String,
    #[serde(default)]
    tags: Vec<keghouse::DepTag>,
    #[serde(default)]
    options: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl JsonSource {
    fn new(layout: &Layout) -> Self {
        let formula_dir = std::env::var_os("KEGHOUSE_FORMULA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| layout.prefix.join("Library").join("Formula"));
        JsonSource { formula_dir }
    }
}

impl FormulaSource for JsonSource {
    fn load(&self, name: &str) -> Result<Formula> {
        let path = self.formula_dir.join(format!("{name}.json"));
        let contents = std::fs::read_to_string(&path)
            .map_err(|_| KegError::FormulaUnavailable(name.to_string()))?;
        let doc: FormulaDoc = serde_json::from_str(&contents)?;

        let mut formula = Formula::new(doc.name, doc.version);
        if let Some(full_name) = doc.full_name {
            formula.full_name = full_name;
        }
        formula.tap = doc.tap;
        formula.deps = doc
            .dependencies
            .into_iter()
            .map(|d| {
                let mut dep = keghouse::Dependency::with_tags(d.name, d.tags);
                dep.options = Options::from_flags(&d.options);
                dep
            })
            .collect();
        formula.requirements = doc.requirements;
        formula.options = Options::from_flags(&doc.options);
        formula.deprecated_options = doc.deprecated_options;
        formula.conflicts = doc.conflicts;
        formula.bottle = doc.bottle;
        formula.plist = doc.plist;
        formula.post_install = doc.post_install;
        formula.keg_only = doc.keg_only;
        formula.env_std = doc.env_std;
        formula.requires_universal_deps = doc.requires_universal_deps;
        formula.pour_bottle_ok = doc.pour_bottle_ok;
        formula.sandbox_disabled = doc.sandbox_disabled;
        formula.path = Some(path);
        Ok(formula)
    }

    fn tap(&self, tap: &str) -> Result<()> {
        // Tap management lives outside the install engine; a missing tap
        // cannot be fetched here.
        Err(KegError::Other(anyhow::anyhow!(
            "tap {tap} is not available and auto-tapping is not configured"
        )))
    }
}
