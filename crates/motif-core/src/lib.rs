pub mod error;
pub mod graph;
pub mod id;
pub mod node;
pub mod pattern;
pub mod transform;

// Re-export commonly used types
pub use error::GraphError;
pub use graph::PatternGraph;
pub use id::NodeId;
pub use node::PatternNode;
pub use pattern::{beat, Beat, Note, Pattern, DEFAULT_VELOCITY};
pub use transform::{Modifier, Transform};
