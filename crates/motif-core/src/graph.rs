//! PatternGraph: the dependency-graph engine.
//!
//! [`PatternGraph`] is the single entry point for building, querying, and
//! editing a pattern pipeline. It owns three stores that its methods keep
//! consistent:
//!
//! - **Node storage** (`nodes`): id → [`PatternNode`], the forward adjacency
//!   implicit in each node's reference lists.
//! - **Reverse index** (`outputs`): id → set of consumer ids, always the
//!   exact transpose of every node's references. Maintained incrementally on
//!   each edit, never rebuilt wholesale.
//! - **Cache store** (`cache`): id → last synthesized [`Pattern`]. An absent
//!   slot means uncomputed or invalidated; a present slot always matches what
//!   evaluating the node against the current graph would produce.
//!
//! All three are private. Mutations go through [`create`](PatternGraph::create),
//! [`update`](PatternGraph::update), and [`delete`](PatternGraph::delete),
//! which enforce acyclicity, rewire the reverse index, and drive eager
//! recomputation of the downstream cone. Traversals (cycle validation,
//! synthesis, populate) run on explicit work stacks so graph depth is bounded
//! by memory, not the call stack.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::id::NodeId;
use crate::node::PatternNode;
use crate::pattern::Pattern;
use crate::transform::{Modifier, Transform};

/// The graph container: node storage, reverse-edge index, and output cache.
///
/// Generic over the capability type `M`; [`Transform`] is the stock choice.
/// One instance owns all of its state and is not internally synchronized: a
/// multi-threaded embedding must serialize calls on one graph.
#[derive(Debug, Clone)]
pub struct PatternGraph<M = Transform> {
    /// Node storage; reference lists inside nodes are the forward edges.
    nodes: HashMap<NodeId, PatternNode<M>>,
    /// Reverse index: for each node, the nodes consuming it as an input.
    outputs: HashMap<NodeId, BTreeSet<NodeId>>,
    /// Per-node slot for the last synthesized value.
    cache: HashMap<NodeId, Pattern>,
    /// Next id handed out by `create`. Never decremented, so ids are not
    /// reused after a delete.
    next_node_id: u32,
}

impl<M> PatternGraph<M> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        PatternGraph {
            nodes: HashMap::new(),
            outputs: HashMap::new(),
            cache: HashMap::new(),
            next_node_id: 0,
        }
    }

    /// Builds a graph from an initial id → node mapping, atomically.
    ///
    /// Every reference must name a key of `nodes` and the reference relation
    /// must be acyclic; otherwise construction fails (`NodeNotFound` or
    /// `CycleDetected`) and no graph is produced. The id counter starts past
    /// the largest supplied id.
    pub fn from_nodes(nodes: HashMap<NodeId, PatternNode<M>>) -> Result<Self, GraphError> {
        // Referential integrity first, so the cycle walk never leaves the
        // mapping.
        for node in nodes.values() {
            for r in node.references() {
                if !nodes.contains_key(&r) {
                    return Err(GraphError::NodeNotFound { id: r });
                }
            }
        }

        let next_node_id = nodes.keys().map(|id| id.0 + 1).max().unwrap_or(0);
        let mut graph = PatternGraph {
            outputs: nodes.keys().map(|&id| (id, BTreeSet::new())).collect(),
            nodes,
            cache: HashMap::new(),
            next_node_id,
        };
        for (&id, node) in &graph.nodes {
            for r in node.references() {
                if let Some(consumers) = graph.outputs.get_mut(&r) {
                    consumers.insert(id);
                }
            }
        }

        if let Some(id) = graph.first_cycle() {
            return Err(GraphError::CycleDetected { id });
        }

        #[cfg(debug_assertions)]
        graph.assert_consistency();

        Ok(graph)
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// Returns the node stored at `id`, if any.
    pub fn node(&self, id: NodeId) -> Option<&PatternNode<M>> {
        self.nodes.get(&id)
    }

    /// True if `id` names a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of reference edges between live nodes.
    pub fn edge_count(&self) -> usize {
        self.outputs.values().map(BTreeSet::len).sum()
    }

    /// Ids of all live nodes, in no particular order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// The consumers of `id` (nodes referencing it), if `id` is live.
    pub fn consumers(&self, id: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.outputs.get(&id)
    }

    /// The cached value for `id`, if one is present.
    pub fn cached(&self, id: NodeId) -> Option<&Pattern> {
        self.cache.get(&id)
    }

    // -----------------------------------------------------------------------
    // Cycle validation
    // -----------------------------------------------------------------------

    /// Reports whether any reference path in the graph revisits a node.
    ///
    /// Each node is examined once across the whole call: subgraphs shared
    /// between walk roots are not re-walked once proven cycle-free.
    pub fn has_cycle(&self) -> bool {
        self.first_cycle().is_some()
    }

    /// Reports whether a cycle is reachable from `start` alone.
    pub fn has_cycle_from(&self, start: NodeId) -> bool {
        let mut visited = HashSet::new();
        self.cycle_from(start, &mut visited).is_some()
    }

    /// First node found to lie on a cycle, if any.
    fn first_cycle(&self) -> Option<NodeId> {
        let mut visited = HashSet::new();
        let mut roots: Vec<NodeId> = self.nodes.keys().copied().collect();
        roots.sort_unstable();
        for root in roots {
            if visited.contains(&root) {
                continue;
            }
            if let Some(on_cycle) = self.cycle_from(root, &mut visited) {
                return Some(on_cycle);
            }
        }
        None
    }

    /// Depth-first walk from `start` over an explicit frame stack.
    ///
    /// `visited` carries cleared nodes across calls; a node on the current
    /// path seen again is returned as the cycle witness. References to ids
    /// with no node are treated as "no cycle here" (existence is a separate
    /// check).
    fn cycle_from(&self, start: NodeId, visited: &mut HashSet<NodeId>) -> Option<NodeId> {
        if visited.contains(&start) || !self.nodes.contains_key(&start) {
            return None;
        }

        let mut on_path: HashSet<NodeId> = HashSet::new();
        // Each frame holds a node plus its references not yet followed.
        let mut stack: Vec<(NodeId, Vec<NodeId>)> = vec![(start, self.pending_references(start))];
        on_path.insert(start);

        loop {
            let next = match stack.last_mut() {
                Some((_, rest)) => rest.pop(),
                None => return None,
            };
            match next {
                Some(next) => {
                    if on_path.contains(&next) {
                        return Some(next);
                    }
                    if visited.contains(&next) || !self.nodes.contains_key(&next) {
                        continue;
                    }
                    on_path.insert(next);
                    stack.push((next, self.pending_references(next)));
                }
                None => {
                    // Every reference followed: the node is cycle-free.
                    if let Some((done, _)) = stack.pop() {
                        on_path.remove(&done);
                        visited.insert(done);
                    }
                }
            }
        }
    }

    /// The references of `id`, reversed so popping from the back yields
    /// declaration order.
    fn pending_references(&self, id: NodeId) -> Vec<NodeId> {
        let mut refs: Vec<NodeId> = match self.nodes.get(&id) {
            Some(node) => node.references().collect(),
            None => Vec::new(),
        };
        refs.reverse();
        refs
    }

    // -----------------------------------------------------------------------
    // Reverse-index maintenance
    // -----------------------------------------------------------------------

    /// Adds `id` as a consumer in the outputs-set of every referenced node.
    fn wire(&mut self, id: NodeId, refs: &[NodeId]) {
        for r in refs {
            if let Some(consumers) = self.outputs.get_mut(r) {
                consumers.insert(id);
            }
        }
    }

    /// Removes `id` from the outputs-set of every referenced node.
    fn unwire(&mut self, id: NodeId, refs: &[NodeId]) {
        for r in refs {
            if let Some(consumers) = self.outputs.get_mut(r) {
                consumers.remove(&id);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutation: create
    // -----------------------------------------------------------------------

    /// Inserts a new node and returns its freshly allocated id.
    ///
    /// Every reference must name a live node; errors with `NodeNotFound` on
    /// the first absent one, leaving the graph untouched. Nothing is
    /// synthesized: the new cache slot starts empty and fills lazily. A new
    /// node cannot close a cycle because nothing references its fresh id yet.
    pub fn create(&mut self, node: PatternNode<M>) -> Result<NodeId, GraphError> {
        for r in node.references() {
            if !self.nodes.contains_key(&r) {
                return Err(GraphError::NodeNotFound { id: r });
            }
        }

        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let refs: Vec<NodeId> = node.references().collect();
        self.wire(id, &refs);
        self.nodes.insert(id, node);
        self.outputs.insert(id, BTreeSet::new());

        #[cfg(debug_assertions)]
        self.assert_consistency();

        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Debug consistency assertion
    // -----------------------------------------------------------------------

    /// Verifies the derived stores against node storage: outputs keys mirror
    /// node keys, every outputs-set is the exact transpose of the reference
    /// lists, and every cache slot belongs to a live node.
    ///
    /// Only called in debug builds (via `cfg(debug_assertions)`).
    #[cfg(debug_assertions)]
    fn assert_consistency(&self) {
        assert_eq!(
            self.outputs.len(),
            self.nodes.len(),
            "outputs key set drifted from node storage"
        );
        for id in self.nodes.keys() {
            assert!(
                self.outputs.contains_key(id),
                "node {id} has no outputs entry"
            );
        }
        for (id, consumers) in &self.outputs {
            for c in consumers {
                let node = self
                    .nodes
                    .get(c)
                    .unwrap_or_else(|| panic!("consumer {c} of {id} is not a live node"));
                assert!(
                    node.references().any(|r| r == *id),
                    "outputs lists {c} as a consumer of {id}, but {c} does not reference it"
                );
            }
        }
        for (id, node) in &self.nodes {
            for r in node.references() {
                // Dangling references (post-delete) have no outputs entry.
                if let Some(consumers) = self.outputs.get(&r) {
                    assert!(
                        consumers.contains(id),
                        "reference {id} -> {r} missing from the reverse index"
                    );
                }
            }
        }
        for id in self.cache.keys() {
            assert!(
                self.nodes.contains_key(id),
                "cache slot for removed node {id}"
            );
        }
    }
}

impl<M: Modifier> PatternGraph<M> {
    // -----------------------------------------------------------------------
    // Synthesis
    // -----------------------------------------------------------------------

    /// Resolves the output pattern for `id`, computing uncached upstream
    /// values on demand.
    ///
    /// Repeated calls without an intervening mutation return the same cached
    /// instance. Errors with `NodeNotFound` if `id`, or any reference reached
    /// during evaluation, names no live node.
    pub fn synth(&mut self, id: NodeId) -> Result<&Pattern, GraphError> {
        self.evaluate(id)?;
        Ok(self.cache.get(&id).expect("evaluation fills the cache slot"))
    }

    /// Recomputes `id` unconditionally and returns the fresh value.
    ///
    /// Upstream values are still reused from cache where present; only the
    /// slot for `id` itself is discarded first.
    pub fn resynth(&mut self, id: NodeId) -> Result<&Pattern, GraphError> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::NodeNotFound { id });
        }
        self.cache.remove(&id);
        self.synth(id)
    }

    /// Eagerly recomputes `id` and its entire downstream consumer cone.
    ///
    /// Errors with `NodeNotFound` only if `id` is absent. The cone is
    /// collected once over the reverse index and recomputed in topological
    /// order, each member exactly once per call. A member that fails to
    /// evaluate (a reference left dangling by an earlier delete) is left
    /// with an empty slot; the failure surfaces on its next explicit synth.
    pub fn populate(&mut self, id: NodeId) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::NodeNotFound { id });
        }
        self.populate_all(&[id]);
        Ok(())
    }

    /// Work-stack evaluation of `id` and its uncached upstream closure.
    ///
    /// A frame stays on the stack until every reference it needs is cached,
    /// then its capability is applied. No native recursion.
    fn evaluate(&mut self, id: NodeId) -> Result<(), GraphError> {
        if self.cache.contains_key(&id) {
            return Ok(());
        }

        let mut stack: Vec<NodeId> = vec![id];
        while let Some(&current) = stack.last() {
            if self.cache.contains_key(&current) {
                stack.pop();
                continue;
            }
            let node = match self.nodes.get(&current) {
                Some(node) => node,
                None => return Err(GraphError::NodeNotFound { id: current }),
            };

            let mut missing: Vec<NodeId> = Vec::new();
            for r in node.references() {
                if !self.cache.contains_key(&r) {
                    if !self.nodes.contains_key(&r) {
                        return Err(GraphError::NodeNotFound { id: r });
                    }
                    missing.push(r);
                }
            }

            if missing.is_empty() {
                // Everything upstream is cached: apply the capability, in
                // declaration order, positional then named.
                let inputs: Vec<Pattern> =
                    node.inputs.iter().map(|&r| self.resolve(r)).collect();
                let kwinputs: indexmap::IndexMap<String, Pattern> = node
                    .kwinputs
                    .iter()
                    .map(|(name, &r)| (name.clone(), self.resolve(r)))
                    .collect();
                let value = node.modifier.apply(&inputs, &kwinputs);
                self.cache.insert(current, value);
                stack.pop();
            } else {
                // Depth-first: push reversed so the first missing reference
                // is evaluated next.
                missing.reverse();
                stack.extend(missing);
            }
        }
        Ok(())
    }

    /// Cached value for a reference; null references resolve to the empty
    /// pattern.
    fn resolve(&self, r: Option<NodeId>) -> Pattern {
        r.and_then(|id| self.cache.get(&id))
            .cloned()
            .unwrap_or_default()
    }

    /// Recomputes the union of the downstream cones of `roots` in
    /// topological order, clearing each slot before re-evaluating so a
    /// failed member ends empty, never stale.
    fn populate_all(&mut self, roots: &[NodeId]) {
        for member in self.downstream_order(roots) {
            self.cache.remove(&member);
            let _ = self.evaluate(member);
        }
    }

    /// Members reachable from `roots` over reverse edges (roots included),
    /// topologically ordered so producers precede consumers.
    fn downstream_order(&self, roots: &[NodeId]) -> Vec<NodeId> {
        // Membership: breadth-first over the reverse index.
        let mut members: BTreeSet<NodeId> = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for &root in roots {
            if self.nodes.contains_key(&root) && members.insert(root) {
                queue.push_back(root);
            }
        }
        while let Some(n) = queue.pop_front() {
            if let Some(consumers) = self.outputs.get(&n) {
                for &c in consumers {
                    if members.insert(c) {
                        queue.push_back(c);
                    }
                }
            }
        }

        // Kahn's algorithm restricted to the member set. In-degree counts
        // distinct member references only; the reverse index is a set, so
        // decrements match.
        let mut indegree: HashMap<NodeId, usize> = HashMap::with_capacity(members.len());
        for &m in &members {
            let distinct: BTreeSet<NodeId> = match self.nodes.get(&m) {
                Some(node) => node.references().filter(|r| members.contains(r)).collect(),
                None => BTreeSet::new(),
            };
            indegree.insert(m, distinct.len());
        }

        let mut ready: VecDeque<NodeId> = members
            .iter()
            .copied()
            .filter(|m| indegree[m] == 0)
            .collect();
        let mut order: Vec<NodeId> = Vec::with_capacity(members.len());
        while let Some(n) = ready.pop_front() {
            order.push(n);
            if let Some(consumers) = self.outputs.get(&n) {
                for &c in consumers {
                    if let Some(d) = indegree.get_mut(&c) {
                        *d -= 1;
                        if *d == 0 {
                            ready.push_back(c);
                        }
                    }
                }
            }
        }
        order
    }

    // -----------------------------------------------------------------------
    // Mutation: update / delete
    // -----------------------------------------------------------------------

    /// Replaces the node at `id` and eagerly recomputes its downstream cone.
    ///
    /// The replacement is staged first: if it would close a cycle, the prior
    /// node is restored (the graph is exactly as before the call) and the
    /// call fails with `CycleDetected`. On success the reverse index is
    /// rewired from the old references to the new, the cone is repopulated,
    /// and the freshly cached value for `id` is returned.
    ///
    /// Errors with `NodeNotFound` if `id` is absent or the replacement
    /// references an absent node; neither case mutates the graph. A
    /// reference left dangling by an earlier delete, deeper upstream of
    /// `id`, also surfaces as `NodeNotFound`; the structural change stands
    /// in that case and only the value is unavailable.
    pub fn update(&mut self, id: NodeId, node: PatternNode<M>) -> Result<&Pattern, GraphError> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::NodeNotFound { id });
        }
        for r in node.references() {
            if !self.nodes.contains_key(&r) {
                return Err(GraphError::NodeNotFound { id: r });
            }
        }

        let previous = self
            .nodes
            .insert(id, node)
            .expect("target checked present above");

        if self.has_cycle_from(id) {
            self.nodes.insert(id, previous);
            return Err(GraphError::CycleDetected { id });
        }

        // Commit: move consumer entries from the old references to the new.
        let old_refs: Vec<NodeId> = previous.references().collect();
        self.unwire(id, &old_refs);
        let new_refs: Vec<NodeId> = self.nodes[&id].references().collect();
        self.wire(id, &new_refs);

        self.populate_all(&[id]);

        #[cfg(debug_assertions)]
        self.assert_consistency();

        // An empty slot here means the repopulation hit a dangling upstream
        // reference; re-evaluating surfaces that error instead of panicking.
        self.evaluate(id)?;
        Ok(self.cache.get(&id).expect("evaluation fills the cache slot"))
    }

    /// Removes a node, its outputs entry, and its cache slot, then eagerly
    /// repopulates its former consumers.
    ///
    /// Consumers are not rewired: each still names the deleted id and will
    /// report `NodeNotFound` on its next synthesis until the caller updates
    /// it. Their slots are cleared by the repopulation pass, so they are
    /// empty rather than stale.
    pub fn delete(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = match self.nodes.remove(&id) {
            Some(node) => node,
            None => return Err(GraphError::NodeNotFound { id }),
        };

        let consumers: Vec<NodeId> = self
            .outputs
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let refs: Vec<NodeId> = node.references().collect();
        self.unwire(id, &refs);
        self.outputs.remove(&id);
        self.cache.remove(&id);

        self.populate_all(&consumers);

        #[cfg(debug_assertions)]
        self.assert_consistency();

        Ok(())
    }
}

impl<M> Default for PatternGraph<M> {
    fn default() -> Self {
        PatternGraph::new()
    }
}

/// Only the node mapping is serialized; the reverse index and cache are
/// derived state, rebuilt by validation on deserialization.
impl<M: Serialize> Serialize for PatternGraph<M> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PatternGraph", 1)?;
        state.serialize_field("nodes", &self.nodes)?;
        state.end()
    }
}

/// Deserialization validates exactly like [`PatternGraph::from_nodes`]:
/// cyclic or dangling stored graphs are rejected.
impl<'de, M: Deserialize<'de>> Deserialize<'de> for PatternGraph<M> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawGraph<M> {
            nodes: HashMap<NodeId, PatternNode<M>>,
        }

        let raw = RawGraph::deserialize(deserializer)?;
        PatternGraph::from_nodes(raw.nodes).map_err(serde::de::Error::custom)
    }
}
