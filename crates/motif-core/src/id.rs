//! Stable ID newtype for graph nodes.
//!
//! A `NodeId` is an opaque handle into one graph's node set. The newtype
//! wrapper keeps raw integers from being passed where a node reference is
//! expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable node identifier, unique within one graph instance.
///
/// Allocated by the owning [`PatternGraph`](crate::graph::PatternGraph) on
/// `create` from a monotonically increasing counter, and never reused after
/// `delete`. Ordered so that id sets iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        assert_eq!(format!("{}", NodeId(7)), "7");
    }

    #[test]
    fn node_id_ordering_follows_inner_value() {
        assert!(NodeId(0) < NodeId(1));
        assert!(NodeId(9) < NodeId(10));
    }

    #[test]
    fn serde_roundtrip() {
        let id = NodeId(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn usable_as_json_map_key() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(NodeId(3), "three");
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"3":"three"}"#);
        let back: HashMap<NodeId, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[&NodeId(3)], "three");
    }
}
