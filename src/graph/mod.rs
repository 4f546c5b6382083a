pub mod blackboard;
pub mod model;

pub use blackboard::{Blackboard, BlackboardEntry, BlackboardError};
pub use model::{Edge, EdgeKind, GraphError, Node, NodeId, NodeKind, NodeStatus, TaskGraph};
