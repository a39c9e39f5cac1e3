//! Error types for the graph engine.
//!
//! [`GraphError`] covers every caller-visible failure: missing nodes
//! (including references left dangling by an earlier delete) and structural
//! edits that would close a cycle. Operations either fully succeed or fail
//! with one of these and leave the graph unchanged.

use thiserror::Error;

use crate::id::NodeId;

/// Errors produced by graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// An operation referenced a node id absent from the graph.
    ///
    /// Raised for the target of `synth`/`populate`/`update`/`delete`, for
    /// input references inside `create`/`update`/construction, and at
    /// synthesis time for references left dangling by a delete.
    #[error("node not found: {id}")]
    NodeNotFound { id: NodeId },

    /// A structural edit would make the graph cyclic.
    ///
    /// `id` is a node lying on the detected cycle. Construction fails
    /// outright; `update` rolls back to the pre-call state.
    #[error("cycle detected through node {id}")]
    CycleDetected { id: NodeId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_node() {
        let err = GraphError::NodeNotFound { id: NodeId(5) };
        assert_eq!(err.to_string(), "node not found: 5");

        let err = GraphError::CycleDetected { id: NodeId(2) };
        assert_eq!(err.to_string(), "cycle detected through node 2");
    }
}
