//! The typed resource dependency graph.
//!
//! Nodes are keyed by [`ResourceName`]; an edge `child → parent` means
//! *child depends on parent*. The graph stays acyclic at all times:
//! [`add_child`](Graph::add_child) runs an incremental DFS from the new
//! parent and rejects edges that would close a cycle. It also rejects
//! edges that would make a remote-origin node depend on anything but
//! its remote subtree: local resources may depend on remote resources,
//! but never the other way around, which keeps the local and remote
//! graphs from ever becoming mutually referential.
//!
//! Removal is two-phase: [`mark_for_removal`](Graph::mark_for_removal)
//! tombstones a subgraph, [`remove_marked`](Graph::remove_marked) sweeps
//! and returns the removed nodes dependents-first so the caller can
//! close them before anything they depend on.
//!
//! All orderings are deterministic: nodes live in `BTreeMap`s and the
//! topological sorts break ties by name, so build order is stable
//! across runs.

use crate::errors::ResourceError;
use crate::node::GraphNode;
use rover_types::{Api, ResourceName};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Typed DAG of resource nodes.
#[derive(Clone, Default)]
pub struct Graph {
    nodes: BTreeMap<ResourceName, Arc<GraphNode>>,
    /// child → the nodes it depends on.
    parents: BTreeMap<ResourceName, BTreeSet<ResourceName>>,
    /// parent → the nodes depending on it.
    children: BTreeMap<ResourceName, BTreeSet<ResourceName>>,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node.
    ///
    /// Re-adding the same node under the same name is a no-op; a
    /// different node under an existing name is rejected.
    pub fn add_node(&mut self, name: ResourceName, node: Arc<GraphNode>) -> Result<(), ResourceError> {
        if let Some(existing) = self.nodes.get(&name) {
            if Arc::ptr_eq(existing, &node) {
                return Ok(());
            }
            return Err(ResourceError::DuplicateName(name));
        }
        self.nodes.insert(name, node);
        Ok(())
    }

    /// Returns the node registered under `name`.
    #[must_use]
    pub fn node(&self, name: &ResourceName) -> Option<Arc<GraphNode>> {
        self.nodes.get(name).cloned()
    }

    /// All node names, in deterministic (sorted) order.
    #[must_use]
    pub fn names(&self) -> Vec<ResourceName> {
        self.nodes.keys().cloned().collect()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names of every node exposing the given API.
    #[must_use]
    pub fn find_nodes_by_api(&self, api: &Api) -> Vec<ResourceName> {
        self.nodes
            .keys()
            .filter(|name| &name.api == api)
            .cloned()
            .collect()
    }

    /// Partial-match resolver: nodes matching local name and API across
    /// every remote path. Callers treat more than one hit as a clash.
    #[must_use]
    pub fn find_nodes_by_short_name_and_api(&self, name: &ResourceName) -> Vec<ResourceName> {
        self.nodes
            .keys()
            .filter(|candidate| candidate.name == name.name && candidate.api == name.api)
            .cloned()
            .collect()
    }

    /// Adds the dependency edge `child → parent`.
    ///
    /// Idempotent for an existing edge.
    ///
    /// # Errors
    ///
    /// - [`NotFound`](ResourceError::NotFound) when either endpoint is
    ///   not a node
    /// - [`Cycle`](ResourceError::Cycle) when the edge would close a
    ///   directed cycle
    /// - [`RemoteContainment`](ResourceError::RemoteContainment) when a
    ///   remote-origin node would depend on a local resource
    pub fn add_child(
        &mut self,
        child: ResourceName,
        parent: ResourceName,
    ) -> Result<(), ResourceError> {
        if !self.nodes.contains_key(&child) {
            return Err(ResourceError::NotFound(child));
        }
        if !self.nodes.contains_key(&parent) {
            return Err(ResourceError::NotFound(parent));
        }
        if child == parent {
            return Err(ResourceError::Cycle { child, parent });
        }
        if child.contains_remote_names()
            && !parent.contains_remote_names()
            && !parent.api.is_remote()
        {
            return Err(ResourceError::RemoteContainment { child, parent });
        }
        if self
            .parents
            .get(&child)
            .is_some_and(|deps| deps.contains(&parent))
        {
            return Ok(());
        }
        if self.depends_on(&parent, &child) {
            return Err(ResourceError::Cycle { child, parent });
        }
        self.parents.entry(child.clone()).or_default().insert(parent.clone());
        self.children.entry(parent).or_default().insert(child);
        Ok(())
    }

    /// Removes the dependency edge `child → parent`, if present.
    pub fn remove_child(&mut self, child: &ResourceName, parent: &ResourceName) {
        if let Some(deps) = self.parents.get_mut(child) {
            deps.remove(parent);
        }
        if let Some(dependents) = self.children.get_mut(parent) {
            dependents.remove(child);
        }
    }

    /// Direct dependencies of `name`, sorted.
    #[must_use]
    pub fn get_all_parents_of(&self, name: &ResourceName) -> Vec<ResourceName> {
        self.parents
            .get(name)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependents of `name`, sorted.
    #[must_use]
    pub fn get_all_children_of(&self, name: &ResourceName) -> Vec<ResourceName> {
        self.children
            .get(name)
            .map(|dependents| dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True when `node` transitively depends on `target`.
    fn depends_on(&self, node: &ResourceName, target: &ResourceName) -> bool {
        let mut stack = vec![node.clone()];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if &current == target {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(deps) = self.parents.get(&current) {
                stack.extend(deps.iter().cloned());
            }
        }
        false
    }

    /// The subgraph of `root` and everything that transitively depends
    /// on it, with edges restricted to that set.
    ///
    /// # Errors
    ///
    /// [`NotFound`](ResourceError::NotFound) when `root` is not a node.
    pub fn sub_graph_from(&self, root: &ResourceName) -> Result<Graph, ResourceError> {
        if !self.nodes.contains_key(root) {
            return Err(ResourceError::NotFound(root.clone()));
        }
        let mut members = BTreeSet::new();
        let mut stack = vec![root.clone()];
        while let Some(current) = stack.pop() {
            if !members.insert(current.clone()) {
                continue;
            }
            if let Some(dependents) = self.children.get(&current) {
                stack.extend(dependents.iter().cloned());
            }
        }

        let mut sub = Graph::new();
        for name in &members {
            sub.nodes.insert(name.clone(), self.nodes[name].clone());
        }
        for name in &members {
            if let Some(deps) = self.parents.get(name) {
                for parent in deps {
                    if members.contains(parent) {
                        sub.parents.entry(name.clone()).or_default().insert(parent.clone());
                        sub.children.entry(parent.clone()).or_default().insert(name.clone());
                    }
                }
            }
        }
        Ok(sub)
    }

    /// Kahn's sort, dependents first, ties broken by name.
    ///
    /// This is the close order: every node appears before everything it
    /// depends on.
    #[must_use]
    pub fn topological_sort(&self) -> Vec<ResourceName> {
        // Pending dependent count per node; a node is ready once all of
        // its dependents have been emitted.
        let mut pending: BTreeMap<ResourceName, usize> = self
            .nodes
            .keys()
            .map(|name| {
                let dependents = self.children.get(name).map_or(0, BTreeSet::len);
                (name.clone(), dependents)
            })
            .collect();

        let mut ready: BTreeSet<ResourceName> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| name.clone())
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(name) = ready.pop_first() {
            if let Some(deps) = self.parents.get(&name) {
                for parent in deps {
                    if let Some(count) = pending.get_mut(parent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(parent.clone());
                        }
                    }
                }
            }
            order.push(name);
        }
        debug_assert_eq!(order.len(), self.nodes.len(), "graph must stay acyclic");
        order
    }

    /// Dependencies first: the build order of a complete-config pass.
    #[must_use]
    pub fn reverse_topological_sort(&self) -> Vec<ResourceName> {
        let mut order = self.topological_sort();
        order.reverse();
        order
    }

    /// Rewrites every reconfigure-pending node's symbolic dependency
    /// strings into graph edges.
    ///
    /// Unresolved dependencies are recorded on the node (which stays
    /// uninitialized) without aborting the pass; the first error is
    /// returned for the caller's debug log.
    pub fn resolve_dependencies(&mut self) -> Result<(), ResourceError> {
        let mut first_err: Option<ResourceError> = None;
        let names: Vec<ResourceName> = self.nodes.keys().cloned().collect();
        for name in names {
            let node = self.nodes[&name].clone();
            if !node.needs_reconfigure() {
                continue;
            }
            let mut unresolved = Vec::new();
            for dep in node.dependencies() {
                match self.resolve_symbolic(&name, &dep) {
                    Ok(parent) => {
                        if let Err(err) = self.add_child(name.clone(), parent.clone()) {
                            warn!(resource = %name, dependency = %parent, error = %err,
                                "cannot add resolved dependency edge");
                            node.set_last_error(err.clone());
                            unresolved.push(dep);
                            first_err.get_or_insert(err);
                        }
                    }
                    Err(err) => {
                        debug!(resource = %name, dependency = %dep, error = %err,
                            "dependency not resolvable yet");
                        node.set_last_error(err.clone());
                        unresolved.push(dep);
                        first_err.get_or_insert(err);
                    }
                }
            }
            node.set_unresolved_dependencies(unresolved);
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolves one symbolic dependency of `child` to a node name.
    fn resolve_symbolic(
        &self,
        child: &ResourceName,
        dep: &str,
    ) -> Result<ResourceName, ResourceError> {
        // Fully qualified names resolve directly.
        if dep.contains('/') {
            if let Ok(full) = dep.parse::<ResourceName>() {
                if self.nodes.contains_key(&full) {
                    return Ok(full);
                }
            }
            return Err(ResourceError::MissingParent {
                child: child.clone(),
                parent: dep.to_string(),
            });
        }

        // Remote-qualified short names ("r1:a") match exactly; a bare
        // name prefers the local resource and only then matches across
        // remotes, where more than one hit is a clash.
        if dep.contains(':') {
            let mut matches: Vec<ResourceName> = self
                .nodes
                .keys()
                .filter(|candidate| *candidate != child && candidate.short_name() == dep)
                .cloned()
                .collect();
            return match matches.len() {
                0 => Err(ResourceError::MissingParent {
                    child: child.clone(),
                    parent: dep.to_string(),
                }),
                1 => Ok(matches.swap_remove(0)),
                _ => Err(ResourceError::RemoteResourceClash(dep.to_string())),
            };
        }

        if let Some(local) = self
            .nodes
            .keys()
            .find(|candidate| {
                *candidate != child && !candidate.contains_remote_names() && candidate.name == dep
            })
            .cloned()
        {
            return Ok(local);
        }

        let mut matches: Vec<ResourceName> = self
            .nodes
            .keys()
            .filter(|candidate| *candidate != child && candidate.name == dep)
            .cloned()
            .collect();
        match matches.len() {
            0 => Err(ResourceError::MissingParent {
                child: child.clone(),
                parent: dep.to_string(),
            }),
            1 => Ok(matches.swap_remove(0)),
            _ => Err(ResourceError::RemoteResourceClash(dep.to_string())),
        }
    }

    /// Tombstones every node of `subgraph` that is present here.
    pub fn mark_for_removal(&self, subgraph: &Graph) {
        for name in subgraph.names() {
            if let Some(node) = self.nodes.get(&name) {
                node.mark_for_removal();
            }
        }
    }

    /// Sweeps tombstoned nodes out of the graph.
    ///
    /// Returns the removed nodes dependents-first, so the caller closes
    /// every node before anything it depends on.
    pub fn remove_marked(&mut self) -> Vec<Arc<GraphNode>> {
        let marked: Vec<ResourceName> = self
            .topological_sort()
            .into_iter()
            .filter(|name| self.nodes[name].marked_for_removal())
            .collect();
        let mut removed = Vec::with_capacity(marked.len());
        for name in marked {
            if let Some(node) = self.remove_node(&name) {
                removed.push(node);
            }
        }
        removed
    }

    fn remove_node(&mut self, name: &ResourceName) -> Option<Arc<GraphNode>> {
        let node = self.nodes.remove(name)?;
        if let Some(deps) = self.parents.remove(name) {
            for parent in deps {
                if let Some(dependents) = self.children.get_mut(&parent) {
                    dependents.remove(name);
                }
            }
        }
        if let Some(dependents) = self.children.remove(name) {
            for child in dependents {
                if let Some(deps) = self.parents.get_mut(&child) {
                    deps.remove(name);
                }
            }
        }
        Some(node)
    }
}
