//! Graph node records.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// A graph entry: one capability plus references to upstream nodes.
///
/// `inputs` are positional upstream references and `kwinputs` named ones;
/// `None` in either position means "use the empty pattern". The insertion
/// order of `kwinputs` is preserved and is the order named values reach the
/// capability. Nodes are plain values; all graph bookkeeping lives in the
/// owning [`PatternGraph`](crate::graph::PatternGraph).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternNode<M> {
    /// The capability evaluated for this node.
    pub modifier: M,
    /// Positional upstream references, in declaration order.
    #[serde(default)]
    pub inputs: Vec<Option<NodeId>>,
    /// Named upstream references, in insertion order.
    #[serde(default)]
    pub kwinputs: IndexMap<String, Option<NodeId>>,
}

impl<M> PatternNode<M> {
    /// Creates a node with no upstream references.
    pub fn leaf(modifier: M) -> Self {
        PatternNode {
            modifier,
            inputs: Vec::new(),
            kwinputs: IndexMap::new(),
        }
    }

    /// Creates a node with positional references only.
    pub fn with_inputs(modifier: M, inputs: Vec<Option<NodeId>>) -> Self {
        PatternNode {
            modifier,
            inputs,
            kwinputs: IndexMap::new(),
        }
    }

    /// Every non-null upstream id, positional first, then named in
    /// insertion order. Duplicates are yielded as written.
    pub fn references(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs
            .iter()
            .copied()
            .flatten()
            .chain(self.kwinputs.values().copied().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_skip_nulls_and_keep_declaration_order() {
        let mut node = PatternNode::with_inputs((), vec![Some(NodeId(2)), None, Some(NodeId(0))]);
        node.kwinputs.insert("accent".to_string(), Some(NodeId(5)));
        node.kwinputs.insert("ghost".to_string(), None);
        node.kwinputs.insert("bass".to_string(), Some(NodeId(1)));

        let refs: Vec<NodeId> = node.references().collect();
        assert_eq!(refs, vec![NodeId(2), NodeId(0), NodeId(5), NodeId(1)]);
    }

    #[test]
    fn leaf_has_no_references() {
        let node = PatternNode::leaf(());
        assert_eq!(node.references().count(), 0);
    }

    #[test]
    fn serde_defaults_allow_omitting_reference_lists() {
        let node: PatternNode<String> =
            serde_json::from_str(r#"{"modifier":"anything"}"#).unwrap();
        assert!(node.inputs.is_empty());
        assert!(node.kwinputs.is_empty());
    }
}
