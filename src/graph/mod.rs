//! 关系图：元组 -> 节点/边，平行边曲率，子图作用域

pub mod builder;
pub mod curvature;
pub mod scope;
pub mod types;

pub use builder::RelationshipGraphBuilder;
pub use scope::RelationshipScope;
pub use types::{CurveType, Graph, GraphEdge, GraphNode, GraphStyle, NeighborRelations};
