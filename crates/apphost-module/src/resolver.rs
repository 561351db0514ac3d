//! Dependency resolution — activation order and graph defects.
//!
//! Produces an order in which every module appears after all of its
//! dependencies. Among modules that are ready at the same step, the
//! case-folded name decides, so the order is reproducible.
//!
//! Defects are recorded per module and never abort resolution:
//! - a dependency that names no known module (`MissingDependency`)
//! - a system module depending on an app module (`InvalidDependencyKind`)
//! - membership in a dependency cycle (`CyclicDependency`, naming the
//!   whole strongly connected component)
//! - depending, directly or transitively, on any of the above
//!   (`DependencyFaulted`)

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::error::ModuleError;
use crate::manifest::{ModuleKind, ModuleManifest, module_key};

/// A module excluded from the activation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveFailure {
    /// Display name of the faulted module.
    pub module: String,
    /// Why it cannot be activated.
    pub error: ModuleError,
}

/// Outcome of dependency resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Display names in activation order (dependencies first).
    pub order: Vec<String>,
    /// Faulted modules, sorted by name.
    pub failures: Vec<ResolveFailure>,
}

impl Resolution {
    /// Whether every module resolved.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the failure recorded for a module, if any.
    pub fn failure_for(&self, name: &str) -> Option<&ModuleError> {
        let key = module_key(name);
        self.failures
            .iter()
            .find(|f| module_key(&f.module) == key)
            .map(|f| &f.error)
    }
}

/// Node of the dependency graph.
struct Node<'a> {
    manifest: &'a ModuleManifest,
    /// Case-folded dependency keys.
    deps: BTreeSet<String>,
}

/// Topological resolver over module manifests.
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Resolves the activation order for `manifests`.
    pub fn resolve(manifests: &[ModuleManifest]) -> Resolution {
        let mut nodes: BTreeMap<String, Node<'_>> = BTreeMap::new();
        for manifest in manifests {
            let key = manifest.key();
            if nodes.contains_key(&key) {
                warn!(module = %manifest.name, "Duplicate manifest ignored by resolver");
                continue;
            }
            let deps = manifest.depends.iter().map(|d| module_key(d)).collect();
            nodes.insert(key, Node { manifest, deps });
        }

        let mut faults: BTreeMap<String, ModuleError> = BTreeMap::new();

        // Missing dependencies and kind violations.
        for (key, node) in &nodes {
            for dep in &node.manifest.depends {
                match nodes.get(&module_key(dep)) {
                    None => {
                        faults.insert(
                            key.clone(),
                            ModuleError::MissingDependency {
                                module: node.manifest.name.clone(),
                                dependency: dep.clone(),
                            },
                        );
                        break;
                    }
                    Some(target)
                        if node.manifest.kind == ModuleKind::System
                            && target.manifest.kind == ModuleKind::App =>
                    {
                        faults.insert(
                            key.clone(),
                            ModuleError::InvalidDependencyKind {
                                module: node.manifest.name.clone(),
                                dependency: target.manifest.name.clone(),
                            },
                        );
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
        propagate_faults(&nodes, &mut faults);

        let order = kahn_order(&nodes, &faults);

        // Whatever Kahn could not place is either on a cycle or behind one.
        let placed: BTreeSet<&String> = order.iter().collect();
        let remaining: BTreeSet<String> = nodes
            .keys()
            .filter(|k| !faults.contains_key(*k) && !placed.contains(k))
            .cloned()
            .collect();

        if !remaining.is_empty() {
            for component in strongly_connected(&nodes, &remaining) {
                let is_cycle = component.len() > 1
                    || component
                        .iter()
                        .any(|k| nodes[k].deps.contains(k));
                if !is_cycle {
                    continue;
                }
                let members: Vec<String> = component
                    .iter()
                    .map(|k| nodes[k].manifest.name.clone())
                    .collect();
                for key in &component {
                    faults.insert(
                        key.clone(),
                        ModuleError::CyclicDependency {
                            members: members.clone(),
                        },
                    );
                }
            }
            propagate_faults(&nodes, &mut faults);
        }

        let order: Vec<String> = order
            .iter()
            .map(|k| nodes[k].manifest.name.clone())
            .collect();

        let failures: Vec<ResolveFailure> = faults
            .into_iter()
            .map(|(key, error)| {
                warn!(module = %nodes[&key].manifest.name, error = %error, "Module excluded from activation");
                ResolveFailure {
                    module: nodes[&key].manifest.name.clone(),
                    error,
                }
            })
            .collect();

        debug!(order = ?order, failed = failures.len(), "Dependency resolution complete");

        Resolution { order, failures }
    }
}

/// Faults every module that depends on a faulted module, until fixpoint.
fn propagate_faults(nodes: &BTreeMap<String, Node<'_>>, faults: &mut BTreeMap<String, ModuleError>) {
    loop {
        let mut newly_faulted = Vec::new();
        for (key, node) in nodes {
            if faults.contains_key(key) {
                continue;
            }
            if let Some(dep) = node.deps.iter().find(|d| faults.contains_key(*d)) {
                newly_faulted.push((
                    key.clone(),
                    ModuleError::DependencyFaulted {
                        module: node.manifest.name.clone(),
                        dependency: nodes[dep].manifest.name.clone(),
                    },
                ));
            }
        }
        if newly_faulted.is_empty() {
            return;
        }
        faults.extend(newly_faulted);
    }
}

/// Kahn's algorithm over non-faulted nodes with a name-ordered ready set.
fn kahn_order(
    nodes: &BTreeMap<String, Node<'_>>,
    faults: &BTreeMap<String, ModuleError>,
) -> Vec<String> {
    let mut in_degree: HashMap<&String, usize> = HashMap::new();
    let mut dependents: HashMap<&String, Vec<&String>> = HashMap::new();

    for (key, node) in nodes {
        if faults.contains_key(key) {
            continue;
        }
        in_degree.insert(key, node.deps.len());
        for dep in &node.deps {
            dependents.entry(dep).or_default().push(key);
        }
    }

    let mut ready: BTreeSet<&String> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(key, _)| *key)
        .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(key) = ready.pop_first() {
        order.push(key.clone());
        for dependent in dependents.get(key).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(*dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }
    order
}

/// Tarjan's strongly connected components over the `within` subgraph.
/// Components are returned with members sorted by key.
fn strongly_connected(
    nodes: &BTreeMap<String, Node<'_>>,
    within: &BTreeSet<String>,
) -> Vec<Vec<String>> {
    struct Tarjan<'g, 'a> {
        nodes: &'g BTreeMap<String, Node<'a>>,
        within: &'g BTreeSet<String>,
        next_index: usize,
        index: HashMap<String, usize>,
        lowlink: HashMap<String, usize>,
        stack: Vec<String>,
        on_stack: BTreeSet<String>,
        components: Vec<Vec<String>>,
    }

    impl Tarjan<'_, '_> {
        fn visit(&mut self, key: &str) {
            self.index.insert(key.to_string(), self.next_index);
            self.lowlink.insert(key.to_string(), self.next_index);
            self.next_index += 1;
            self.stack.push(key.to_string());
            self.on_stack.insert(key.to_string());

            let nodes = self.nodes;
            let within = self.within;
            for dep in nodes[key].deps.iter().filter(|d| within.contains(*d)) {
                if !self.index.contains_key(dep) {
                    self.visit(dep);
                    let low = self.lowlink[key].min(self.lowlink[dep]);
                    self.lowlink.insert(key.to_string(), low);
                } else if self.on_stack.contains(dep) {
                    let low = self.lowlink[key].min(self.index[dep]);
                    self.lowlink.insert(key.to_string(), low);
                }
            }

            if self.lowlink[key] == self.index[key] {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack.remove(&member);
                    let done = member == key;
                    component.push(member);
                    if done {
                        break;
                    }
                }
                component.sort();
                self.components.push(component);
            }
        }
    }

    let mut tarjan = Tarjan {
        nodes,
        within,
        next_index: 0,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        components: Vec::new(),
    };

    for key in within {
        if !tarjan.index.contains_key(key) {
            tarjan.visit(key);
        }
    }
    tarjan.components
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(name: &str, deps: &[&str]) -> ModuleManifest {
        deps.iter().fold(
            ModuleManifest::new(name, "1.0", ModuleKind::System),
            |m, d| m.depends_on(*d),
        )
    }

    fn app(name: &str, deps: &[&str]) -> ModuleManifest {
        deps.iter().fold(
            ModuleManifest::new(name, "1.0", ModuleKind::App),
            |m, d| m.depends_on(*d),
        )
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_linear_chain() {
        let manifests = vec![
            app("reports", &["billing"]),
            app("billing", &["core"]),
            system("core", &[]),
        ];
        let resolution = DependencyResolver::resolve(&manifests);
        assert!(resolution.is_clean());
        assert_eq!(resolution.order, vec!["core", "billing", "reports"]);
    }

    #[test]
    fn test_ties_break_by_name_and_are_stable() {
        let manifests = vec![
            app("zeta", &["core"]),
            app("Alpha", &["core"]),
            app("mid", &["alpha", "zeta"]),
            system("core", &[]),
            app("beta", &[]),
        ];
        let first = DependencyResolver::resolve(&manifests);
        assert_eq!(first.order, vec!["beta", "core", "Alpha", "zeta", "mid"]);

        let mut reversed = manifests.clone();
        reversed.reverse();
        for _ in 0..5 {
            assert_eq!(DependencyResolver::resolve(&reversed).order, first.order);
        }
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let manifests = vec![
            system("core", &[]),
            system("auth", &["core"]),
            app("people", &["core", "auth"]),
            app("appointments", &["people"]),
            app("clock", &["core"]),
            app("dashboard", &["clock", "appointments"]),
        ];
        let resolution = DependencyResolver::resolve(&manifests);
        assert!(resolution.is_clean());
        for manifest in &manifests {
            for dep in &manifest.depends {
                assert!(
                    position(&resolution.order, dep) < position(&resolution.order, &manifest.name),
                    "{dep} must precede {}",
                    manifest.name
                );
            }
        }
    }

    #[test]
    fn test_two_node_cycle() {
        let manifests = vec![app("a", &["b"]), app("b", &["a"])];
        let resolution = DependencyResolver::resolve(&manifests);
        assert!(resolution.order.is_empty());
        assert_eq!(resolution.failures.len(), 2);
        for name in ["a", "b"] {
            assert_eq!(
                resolution.failure_for(name),
                Some(&ModuleError::CyclicDependency {
                    members: vec!["a".to_string(), "b".to_string()],
                })
            );
        }
    }

    #[test]
    fn test_cycle_does_not_block_others() {
        let manifests = vec![
            system("core", &[]),
            app("x", &["core", "z"]),
            app("y", &["x"]),
            app("z", &["y"]),
            app("after", &["x"]),
            app("clock", &["core"]),
        ];
        let resolution = DependencyResolver::resolve(&manifests);
        assert_eq!(resolution.order, vec!["core", "clock"]);
        let members = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        for name in ["x", "y", "z"] {
            assert_eq!(
                resolution.failure_for(name),
                Some(&ModuleError::CyclicDependency {
                    members: members.clone()
                })
            );
        }
        assert!(matches!(
            resolution.failure_for("after"),
            Some(ModuleError::DependencyFaulted { dependency, .. }) if dependency == "x"
        ));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let resolution = DependencyResolver::resolve(&[app("loop", &["loop"])]);
        assert_eq!(
            resolution.failure_for("loop"),
            Some(&ModuleError::CyclicDependency {
                members: vec!["loop".to_string()]
            })
        );
    }

    #[test]
    fn test_missing_dependency_cascades() {
        let manifests = vec![
            system("core", &[]),
            app("billing", &["core", "ledger"]),
            app("reports", &["billing"]),
        ];
        let resolution = DependencyResolver::resolve(&manifests);
        assert_eq!(resolution.order, vec!["core"]);
        assert_eq!(
            resolution.failure_for("billing"),
            Some(&ModuleError::MissingDependency {
                module: "billing".to_string(),
                dependency: "ledger".to_string(),
            })
        );
        assert_eq!(
            resolution.failure_for("reports"),
            Some(&ModuleError::DependencyFaulted {
                module: "reports".to_string(),
                dependency: "billing".to_string(),
            })
        );
    }

    #[test]
    fn test_system_cannot_depend_on_app() {
        let manifests = vec![system("core", &["clock"]), app("clock", &[])];
        let resolution = DependencyResolver::resolve(&manifests);
        assert_eq!(resolution.order, vec!["clock"]);
        assert!(matches!(
            resolution.failure_for("core"),
            Some(ModuleError::InvalidDependencyKind { .. })
        ));
    }

    #[test]
    fn test_dependency_names_are_case_insensitive() {
        let manifests = vec![system("Core", &[]), app("Clock", &["CORE"])];
        let resolution = DependencyResolver::resolve(&manifests);
        assert!(resolution.is_clean());
        assert_eq!(resolution.order, vec!["Core", "Clock"]);
    }
}
