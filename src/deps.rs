//! Requirement and dependency expansion: turning a formula's declared graph
//! into an ordered install plan.
//!
//! Expansion walks the transitive graph with a return-valued visitor: each
//! edge is judged [`Visit::Keep`], [`Visit::Prune`] (drop the node and its
//! subtree), or [`Visit::Skip`] (omit the node, keep walking its deps).
//! Pruning is driven by the per-dependent effective build options and by
//! whether the dependent will come from a bottle; a prebuilt artifact does
//! not need its build-time dependencies.

use crate::cellar::Layout;
use crate::error::{KegError, Result};
use crate::formula::{Dependency, Formula, FormulaSource, Requirement};
use crate::options::{BuildOptions, Options};
use crate::tab::Tab;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Visitor verdict for one edge of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Keep,
    Prune,
    Skip,
}

/// One entry of the install plan: a dependency plus the options its build
/// inherits from the dependents that pulled it in.
#[derive(Debug, Clone)]
pub struct ExpandedDep {
    pub dep: Dependency,
    pub options: Options,
}

/// Does a dependency's build edge get satisfied by a bottle rather than a
/// source build? True when the formula has a bottle, its own predicate
/// permits pouring, no options are in effect, and the bottle's cellar
/// matches ours.
pub fn install_bottle_for(formula: &Formula, build: &BuildOptions, layout: &Layout) -> bool {
    let Some(bottle) = &formula.bottle else {
        return false;
    };
    formula.pour_bottle_ok
        && build.used_args().is_empty()
        && bottle.cellar.compatible_with(&layout.cellar)
}

/// Is this edge already satisfied: the target's current version installed,
/// with a keg carrying (at least) the inherited options? An older installed
/// version does not satisfy; that is the upgrade case.
pub fn dep_satisfied(layout: &Layout, formula: &Formula, inherited: &Options) -> bool {
    let kegs = match layout.installed_kegs(&formula.name) {
        Ok(kegs) => kegs,
        Err(_) => return false,
    };

    let wanted = crate::cellar::strip_bottle_revision(&formula.version);
    let Some(matching) = kegs
        .iter()
        .find(|keg| crate::cellar::strip_bottle_revision(&keg.version) == wanted)
    else {
        return false;
    };

    let tab = Tab::for_keg(&matching.path);
    let used = tab.used_options();
    inherited.iter().all(|opt| used.contains(&opt.name))
}

/// Shared inputs for one expansion computation.
pub struct Expansion<'a, S: FormulaSource> {
    pub layout: &'a Layout,
    pub store: &'a S,
    pub root: &'a Formula,
    /// Effective args requested for the root install.
    pub root_options: &'a Options,
    /// Precomputed `pour_bottle?` decision for the root.
    pub root_pours: bool,
    pub build_bottle: bool,
    /// Per-dependency inherited options, filled during dependency
    /// expansion.
    inherited: HashMap<String, Options>,
}

impl<'a, S: FormulaSource> Expansion<'a, S> {
    pub fn new(
        layout: &'a Layout,
        store: &'a S,
        root: &'a Formula,
        root_options: &'a Options,
        root_pours: bool,
        build_bottle: bool,
    ) -> Self {
        Expansion {
            layout,
            store,
            root,
            root_options,
            root_pours,
            build_bottle,
            inherited: HashMap::new(),
        }
    }

    fn load(&self, name: &str) -> Result<Formula> {
        self.store.load(name)
    }

    /// Effective build configuration for a dependent: its persisted
    /// used-options unioned with the root's requested options (for the
    /// root) or with whatever it inherits from its dependents.
    fn effective_build(&self, dependent: &Formula) -> BuildOptions {
        let tab = Tab::for_formula(self.layout, &dependent.name);
        let args = if dependent.name == self.root.name {
            tab.used_options().union(self.root_options)
        } else {
            let inherited = self
                .inherited
                .get(&dependent.name)
                .cloned()
                .unwrap_or_default();
            tab.used_options().union(&inherited)
        };
        BuildOptions::new(args, dependent.options.clone())
    }

    fn will_pour(&self, dependent: &Formula) -> bool {
        if dependent.name == self.root.name {
            return self.root_pours;
        }
        install_bottle_for(dependent, &self.effective_build(dependent), self.layout)
    }

    /// Walk the transitive requirements, pruning per the visitor rules.
    ///
    /// Returns the unmet requirements grouped by dependent, and the
    /// dependency edges materialized from defaulted requirements (to be
    /// prepended to the declared deps before dependency expansion).
    pub fn expand_requirements(
        &mut self,
    ) -> Result<(BTreeMap<String, Vec<Requirement>>, Vec<Dependency>)> {
        let mut unsatisfied: BTreeMap<String, Vec<Requirement>> = BTreeMap::new();
        let mut materialized: Vec<Dependency> = Vec::new();
        let mut formulae = vec![self.root.clone()];
        let mut walked: HashSet<String> = HashSet::new();

        while let Some(formula) = formulae.pop() {
            if !walked.insert(formula.name.clone()) {
                continue;
            }

            for (dependent, req) in self.recursive_requirements(&formula)? {
                match self.visit_requirement(&dependent, &req)? {
                    RequirementVisit::Prune => {}
                    RequirementVisit::Materialize(dep) => {
                        let next = self
                            .load(&dep.name)
                            .map_err(|e| e.annotate_dependent(&dependent.name))?;
                        materialized.insert(0, dep);
                        formulae.push(next);
                    }
                    RequirementVisit::Unsatisfied => {
                        unsatisfied
                            .entry(dependent.name.clone())
                            .or_default()
                            .push(req);
                    }
                }
            }
        }

        Ok((unsatisfied, materialized))
    }

    fn visit_requirement(
        &self,
        dependent: &Formula,
        req: &Requirement,
    ) -> Result<RequirementVisit> {
        let build = self.effective_build(dependent);

        if (req.optional() || req.recommended()) && build.without(&req.name) {
            return Ok(RequirementVisit::Prune);
        }

        if req.build() && self.will_pour(dependent) {
            return Ok(RequirementVisit::Prune);
        }

        let satisfied = req.satisfied();

        if req.default_formula()
            && (!satisfied || !req.run())
            && (self.will_pour(dependent) || self.build_bottle)
        {
            if let Some(dep) = req.to_dependency() {
                return Ok(RequirementVisit::Materialize(dep));
            }
        }

        if satisfied {
            return Ok(RequirementVisit::Prune);
        }

        Ok(RequirementVisit::Unsatisfied)
    }

    /// `(dependent, requirement)` pairs over a formula and its transitive
    /// dependencies, skipping subtrees behind disabled optional edges.
    fn recursive_requirements(&self, formula: &Formula) -> Result<Vec<(Formula, Requirement)>> {
        let mut pairs = Vec::new();
        let mut visited = HashSet::new();
        self.collect_requirements(formula, &mut visited, &mut pairs)?;
        Ok(pairs)
    }

    fn collect_requirements(
        &self,
        formula: &Formula,
        visited: &mut HashSet<String>,
        pairs: &mut Vec<(Formula, Requirement)>,
    ) -> Result<()> {
        if !visited.insert(formula.name.clone()) {
            return Ok(());
        }

        for req in &formula.requirements {
            pairs.push((formula.clone(), req.clone()));
        }

        let build = self.effective_build(formula);
        for dep in &formula.deps {
            if (dep.optional() || dep.recommended()) && build.without(dep.option_name()) {
                continue;
            }
            let next = self
                .load(&dep.name)
                .map_err(|e| e.annotate_dependent(&formula.name))?;
            self.collect_requirements(&next, visited, pairs)?;
        }

        Ok(())
    }

    /// Produce the ordered install plan, leaves first.
    ///
    /// `materialized` comes from [`Expansion::expand_requirements`] and is
    /// prepended to the root's declared deps.
    pub fn expand_dependencies(
        &mut self,
        materialized: Vec<Dependency>,
    ) -> Result<Vec<ExpandedDep>> {
        let mut edges = materialized;
        edges.extend(self.root.deps.iter().cloned());

        let mut plan: Vec<ExpandedDep> = Vec::new();
        let mut planned: HashSet<String> = HashSet::new();
        let mut in_progress: HashSet<String> = HashSet::new();
        let root = self.root.clone();

        for dep in edges {
            self.visit_edge(
                &root,
                &dep,
                &mut plan,
                &mut planned,
                &mut in_progress,
            )?;
        }

        Ok(plan)
    }

    fn visit_edge(
        &mut self,
        dependent: &Formula,
        dep: &Dependency,
        plan: &mut Vec<ExpandedDep>,
        planned: &mut HashSet<String>,
        in_progress: &mut HashSet<String>,
    ) -> Result<()> {
        if in_progress.contains(&dep.name) {
            return Err(KegError::DependencyCycle(dep.name.clone()));
        }

        let inherited = self.inherit_options(dependent, dep)?;

        let formula = self
            .load(&dep.name)
            .map_err(|e| e.annotate_dependent(&dependent.name))?;

        let verdict = self.visit_dependency(dependent, dep, &formula, &inherited)?;
        if verdict == Visit::Prune {
            return Ok(());
        }

        if planned.contains(&dep.name) {
            // Another dependent already planned this dep; its edge options
            // still have to reach the planned entry, or a diamond like
            // X -> {B, C} -> D would drop C's options when B won the race.
            if let Some(entry) = plan.iter_mut().find(|e| e.dep.name == dep.name) {
                entry.options = entry.options.union(&inherited);
            }
            return Ok(());
        }

        in_progress.insert(dep.name.clone());
        for child in formula.deps.clone() {
            self.visit_edge(&formula, &child, plan, planned, in_progress)?;
        }
        in_progress.remove(&dep.name);

        if verdict == Visit::Keep && planned.insert(dep.name.clone()) {
            plan.push(ExpandedDep {
                dep: dep.clone(),
                options: inherited,
            });
        }

        Ok(())
    }

    /// Options flowing down this edge: the edge's declared options plus
    /// `universal` when the root build (or the dependent itself) wants
    /// universal deps and the target defines the option.
    fn inherit_options(&mut self, dependent: &Formula, dep: &Dependency) -> Result<Options> {
        let mut inherited = self
            .inherited
            .get(&dep.name)
            .cloned()
            .unwrap_or_default()
            .union(&dep.options);

        let universal_in_effect = self.root_options.contains("universal")
            || dependent.requires_universal_deps;
        if universal_in_effect && !dep.build() {
            let target = self
                .load(&dep.name)
                .map_err(|e| e.annotate_dependent(&dependent.name))?;
            if target.option_defined("universal") {
                inherited.insert(crate::options::BuildOption::new("universal"));
            }
        }

        self.inherited.insert(dep.name.clone(), inherited.clone());
        Ok(inherited)
    }

    fn visit_dependency(
        &self,
        dependent: &Formula,
        dep: &Dependency,
        formula: &Formula,
        inherited: &Options,
    ) -> Result<Visit> {
        let build = self.effective_build(dependent);

        if (dep.optional() || dep.recommended()) && build.without(dep.option_name()) {
            return Ok(Visit::Prune);
        }

        if dep.build() && self.will_pour(dependent) {
            return Ok(Visit::Prune);
        }

        if dep_satisfied(self.layout, formula, inherited) {
            return Ok(Visit::Skip);
        }

        Ok(Visit::Keep)
    }
}

enum RequirementVisit {
    Prune,
    Materialize(Dependency),
    Unsatisfied,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{BottleCellar, BottleSpec, DepTag, RequirementCheck};
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// In-memory formula source for expansion tests.
    pub(crate) struct MemorySource {
        formulae: RefCell<HashMap<String, Formula>>,
    }

    impl MemorySource {
        pub fn new(formulae: Vec<Formula>) -> Self {
            MemorySource {
                formulae: RefCell::new(
                    formulae.into_iter().map(|f| (f.name.clone(), f)).collect(),
                ),
            }
        }
    }

    impl FormulaSource for MemorySource {
        fn load(&self, name: &str) -> Result<Formula> {
            self.formulae
                .borrow()
                .get(name)
                .cloned()
                .ok_or_else(|| KegError::FormulaUnavailable(name.to_string()))
        }

        fn tap(&self, _tap: &str) -> Result<()> {
            Ok(())
        }
    }

    fn bottled(mut f: Formula) -> Formula {
        f.bottle = Some(BottleSpec {
            url: format!("https://example.invalid/{}.tar.gz", f.name),
            sha256: "0".repeat(64),
            cellar: BottleCellar::Any,
        });
        f
    }

    fn expansion_fixture() -> (TempDir, Layout) {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::at(tmp.path());
        (tmp, layout)
    }

    #[test]
    fn test_plan_is_leaves_first() {
        let (_tmp, layout) = expansion_fixture();
        // gamma -> beta -> alpha
        let mut gamma = Formula::new("gamma", "1.0");
        gamma.deps.push(Dependency::new("beta"));
        let mut beta = Formula::new("beta", "1.0");
        beta.deps.push(Dependency::new("alpha"));
        let alpha = Formula::new("alpha", "1.0");

        let store = MemorySource::new(vec![gamma.clone(), beta, alpha]);
        let opts = Options::new();
        let mut exp = Expansion::new(&layout, &store, &gamma, &opts, false, false);
        let plan = exp.expand_dependencies(vec![]).unwrap();

        let names: Vec<_> = plan.iter().map(|e| e.dep.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_shared_dep_planned_once() {
        let (_tmp, layout) = expansion_fixture();
        let mut root = Formula::new("root", "1.0");
        root.deps.push(Dependency::new("left"));
        root.deps.push(Dependency::new("right"));
        let mut left = Formula::new("left", "1.0");
        left.deps.push(Dependency::new("base"));
        let mut right = Formula::new("right", "1.0");
        right.deps.push(Dependency::new("base"));
        let base = Formula::new("base", "1.0");

        let store = MemorySource::new(vec![root.clone(), left, right, base]);
        let opts = Options::new();
        let mut exp = Expansion::new(&layout, &store, &root, &opts, false, false);
        let plan = exp.expand_dependencies(vec![]).unwrap();

        let names: Vec<_> = plan.iter().map(|e| e.dep.name.as_str()).collect();
        assert_eq!(names, vec!["base", "left", "right"]);
    }

    #[test]
    fn test_diamond_edges_merge_options() {
        let (_tmp, layout) = expansion_fixture();
        // root -> {b, c} -> d; only c's edge to d carries an option. The
        // planned entry for d must carry it no matter which parent wins
        // the traversal race.
        let mut root = Formula::new("root", "1.0");
        root.deps.push(Dependency::new("b"));
        root.deps.push(Dependency::new("c"));
        let mut b = Formula::new("b", "1.0");
        b.deps.push(Dependency::new("d"));
        let mut c = Formula::new("c", "1.0");
        let mut edge = Dependency::new("d");
        edge.options = Options::from_flags(["--with-foo"]);
        c.deps.push(edge);
        let d = Formula::new("d", "1.0");

        let store = MemorySource::new(vec![root.clone(), b, c, d]);
        let opts = Options::new();
        let mut exp = Expansion::new(&layout, &store, &root, &opts, false, false);
        let plan = exp.expand_dependencies(vec![]).unwrap();

        let names: Vec<_> = plan.iter().map(|e| e.dep.name.as_str()).collect();
        assert_eq!(names, vec!["d", "b", "c"]);

        let d_entry = plan.iter().find(|e| e.dep.name == "d").unwrap();
        assert!(d_entry.options.contains("with-foo"));
    }

    #[test]
    fn test_cycle_detected() {
        let (_tmp, layout) = expansion_fixture();
        let mut a = Formula::new("a", "1.0");
        a.deps.push(Dependency::new("b"));
        let mut b = Formula::new("b", "1.0");
        b.deps.push(Dependency::new("a"));

        let mut root = Formula::new("root", "1.0");
        root.deps.push(Dependency::new("a"));

        let store = MemorySource::new(vec![root.clone(), a, b]);
        let opts = Options::new();
        let mut exp = Expansion::new(&layout, &store, &root, &opts, false, false);
        assert!(matches!(
            exp.expand_dependencies(vec![]),
            Err(KegError::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_build_dep_pruned_when_root_pours() {
        let (_tmp, layout) = expansion_fixture();
        let mut root = bottled(Formula::new("root", "1.0"));
        root.deps
            .push(Dependency::with_tags("cmake", vec![DepTag::Build]));
        root.deps.push(Dependency::new("zlib"));
        let cmake = Formula::new("cmake", "3.30");
        let zlib = Formula::new("zlib", "1.3");

        let store = MemorySource::new(vec![root.clone(), cmake, zlib]);
        let opts = Options::new();

        let mut exp = Expansion::new(&layout, &store, &root, &opts, true, false);
        let plan = exp.expand_dependencies(vec![]).unwrap();
        let names: Vec<_> = plan.iter().map(|e| e.dep.name.as_str()).collect();
        assert_eq!(names, vec!["zlib"]);

        // Building from source keeps the build dep.
        let mut exp = Expansion::new(&layout, &store, &root, &opts, false, false);
        let plan = exp.expand_dependencies(vec![]).unwrap();
        let names: Vec<_> = plan.iter().map(|e| e.dep.name.as_str()).collect();
        assert_eq!(names, vec!["cmake", "zlib"]);
    }

    #[test]
    fn test_build_dep_of_poured_transitive_dep_pruned() {
        let (_tmp, layout) = expansion_fixture();
        let mut root = Formula::new("root", "1.0");
        root.deps.push(Dependency::new("lib"));
        let mut lib = bottled(Formula::new("lib", "2.0"));
        lib.deps
            .push(Dependency::with_tags("autoconf", vec![DepTag::Build]));
        let autoconf = Formula::new("autoconf", "2.72");

        let store = MemorySource::new(vec![root.clone(), lib, autoconf]);
        let opts = Options::new();
        let mut exp = Expansion::new(&layout, &store, &root, &opts, false, false);
        let plan = exp.expand_dependencies(vec![]).unwrap();

        let names: Vec<_> = plan.iter().map(|e| e.dep.name.as_str()).collect();
        assert_eq!(names, vec!["lib"]);
    }

    #[test]
    fn test_optional_dep_needs_with_flag() {
        let (_tmp, layout) = expansion_fixture();
        let mut root = Formula::new("root", "1.0");
        root.deps
            .push(Dependency::with_tags("docs", vec![DepTag::Optional]));
        let docs = Formula::new("docs", "1.0");

        let store = MemorySource::new(vec![root.clone(), docs]);

        let none = Options::new();
        let mut exp = Expansion::new(&layout, &store, &root, &none, false, false);
        assert!(exp.expand_dependencies(vec![]).unwrap().is_empty());

        let with = Options::from_flags(["--with-docs"]);
        let mut exp = Expansion::new(&layout, &store, &root, &with, false, false);
        let plan = exp.expand_dependencies(vec![]).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].dep.name, "docs");
    }

    #[test]
    fn test_recommended_dep_pruned_by_without() {
        let (_tmp, layout) = expansion_fixture();
        let mut root = Formula::new("root", "1.0");
        root.options = Options::from_flags(["--with-ssl"]);
        root.deps
            .push(Dependency::with_tags("ssl", vec![DepTag::Recommended]));
        let ssl = Formula::new("ssl", "3.0");

        let store = MemorySource::new(vec![root.clone(), ssl]);

        // Recommended is on by default.
        let none = Options::new();
        let mut exp = Expansion::new(&layout, &store, &root, &none, false, false);
        assert_eq!(exp.expand_dependencies(vec![]).unwrap().len(), 1);

        let without = Options::from_flags(["--without-ssl"]);
        let mut exp = Expansion::new(&layout, &store, &root, &without, false, false);
        assert!(exp.expand_dependencies(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_satisfied_dep_skipped_but_walk_continues() {
        let (_tmp, layout) = expansion_fixture();
        // root -> mid (installed) -> leaf (not installed)
        let mut root = Formula::new("root", "1.0");
        root.deps.push(Dependency::new("mid"));
        let mut mid = Formula::new("mid", "1.0");
        mid.deps.push(Dependency::new("leaf"));
        let leaf = Formula::new("leaf", "1.0");

        std::fs::create_dir_all(layout.keg_prefix("mid", "1.0")).unwrap();

        let store = MemorySource::new(vec![root.clone(), mid, leaf]);
        let opts = Options::new();
        let mut exp = Expansion::new(&layout, &store, &root, &opts, false, false);
        let plan = exp.expand_dependencies(vec![]).unwrap();

        let names: Vec<_> = plan.iter().map(|e| e.dep.name.as_str()).collect();
        assert_eq!(names, vec!["leaf"]);
    }

    #[test]
    fn test_universal_propagates_to_runtime_deps() {
        let (_tmp, layout) = expansion_fixture();
        let mut root = Formula::new("root", "1.0");
        root.options = Options::from_flags(["--universal"]);
        root.deps.push(Dependency::new("libpng"));
        root.deps
            .push(Dependency::with_tags("cmake", vec![DepTag::Build]));
        let mut libpng = Formula::new("libpng", "1.6");
        libpng.options = Options::from_flags(["--universal"]);
        let cmake = Formula::new("cmake", "3.30");

        let store = MemorySource::new(vec![root.clone(), libpng, cmake]);
        let universal = Options::from_flags(["--universal"]);
        let mut exp = Expansion::new(&layout, &store, &root, &universal, false, false);
        let plan = exp.expand_dependencies(vec![]).unwrap();

        let libpng_entry = plan.iter().find(|e| e.dep.name == "libpng").unwrap();
        assert!(libpng_entry.options.contains("universal"));

        let cmake_entry = plan.iter().find(|e| e.dep.name == "cmake").unwrap();
        assert!(!cmake_entry.options.contains("universal"));
    }

    #[test]
    fn test_satisfied_run_requirement_adds_no_default_formula() {
        let (_tmp, layout) = expansion_fixture();
        let mut root = bottled(Formula::new("root", "1.0"));
        root.requirements.push(Requirement {
            name: "x11".into(),
            tags: vec![DepTag::Run],
            fatal: true,
            default_formula: Some("xorg".into()),
            check: RequirementCheck::Const(true),
        });
        let xorg = Formula::new("xorg", "21.1");

        let store = MemorySource::new(vec![root.clone(), xorg]);
        let opts = Options::new();
        let mut exp = Expansion::new(&layout, &store, &root, &opts, true, false);
        let (unsatisfied, materialized) = exp.expand_requirements().unwrap();

        assert!(unsatisfied.is_empty());
        assert!(materialized.is_empty());
    }

    #[test]
    fn test_unsatisfied_default_formula_materialized_when_pouring() {
        let (_tmp, layout) = expansion_fixture();
        let mut root = bottled(Formula::new("root", "1.0"));
        root.requirements.push(Requirement {
            name: "x11".into(),
            tags: vec![],
            fatal: true,
            default_formula: Some("xorg".into()),
            check: RequirementCheck::Const(false),
        });
        let xorg = Formula::new("xorg", "21.1");

        let store = MemorySource::new(vec![root.clone(), xorg]);
        let opts = Options::new();
        let mut exp = Expansion::new(&layout, &store, &root, &opts, true, false);
        let (unsatisfied, materialized) = exp.expand_requirements().unwrap();

        assert!(unsatisfied.is_empty());
        assert_eq!(materialized.len(), 1);
        assert_eq!(materialized[0].name, "xorg");
    }

    #[test]
    fn test_unsatisfied_requirement_reported() {
        let (_tmp, layout) = expansion_fixture();
        let mut root = Formula::new("root", "1.0");
        root.requirements.push(Requirement {
            name: "xcode".into(),
            tags: vec![],
            fatal: true,
            default_formula: None,
            check: RequirementCheck::Const(false),
        });

        let store = MemorySource::new(vec![root.clone()]);
        let opts = Options::new();
        let mut exp = Expansion::new(&layout, &store, &root, &opts, false, false);
        let (unsatisfied, _) = exp.expand_requirements().unwrap();

        assert_eq!(unsatisfied.get("root").map(|v| v.len()), Some(1));
    }

    #[test]
    fn test_build_requirement_pruned_when_dependent_pours() {
        let (_tmp, layout) = expansion_fixture();
        let mut root = bottled(Formula::new("root", "1.0"));
        root.requirements.push(Requirement {
            name: "xcode".into(),
            tags: vec![DepTag::Build],
            fatal: true,
            default_formula: None,
            check: RequirementCheck::Const(false),
        });

        let store = MemorySource::new(vec![root.clone()]);
        let opts = Options::new();
        let mut exp = Expansion::new(&layout, &store, &root, &opts, true, false);
        let (unsatisfied, _) = exp.expand_requirements().unwrap();

        assert!(unsatisfied.is_empty());
    }

    #[test]
    fn test_install_bottle_for_gates() {
        let (_tmp, layout) = expansion_fixture();
        let plain = Formula::new("plain", "1.0");
        let empty = BuildOptions::new(Options::new(), Options::new());
        assert!(!install_bottle_for(&plain, &empty, &layout));

        let with_bottle = bottled(Formula::new("pkg", "1.0"));
        assert!(install_bottle_for(&with_bottle, &empty, &layout));

        // Options in effect force a source build.
        let with_opts = BuildOptions::new(Options::from_flags(["--with-ssl"]), Options::new());
        assert!(!install_bottle_for(&with_bottle, &with_opts, &layout));

        // Formula's own predicate can refuse.
        let mut refused = bottled(Formula::new("pkg2", "1.0"));
        refused.pour_bottle_ok = false;
        assert!(!install_bottle_for(&refused, &empty, &layout));

        // Incompatible cellar.
        let mut fixed = bottled(Formula::new("pkg3", "1.0"));
        fixed.bottle.as_mut().unwrap().cellar =
            BottleCellar::Fixed(std::path::PathBuf::from("/nonexistent/Cellar"));
        assert!(!install_bottle_for(&fixed, &empty, &layout));
    }
}
