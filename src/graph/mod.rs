//! 图执行层：节点、边、图结构与遍历引擎

pub mod edge;
pub mod engine;
#[allow(clippy::module_inception)]
pub mod graph;
pub mod node;

pub use edge::{Edge, EdgeCondition, EdgePredicate, EdgeTransform, RunContext};
pub use engine::{parse_tool_calls, GraphEngine};
pub use graph::{Graph, GraphBuilder};
pub use node::{Node, NodeId, NodeKind, NodeValue, TransformFn};
