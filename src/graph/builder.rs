//! 关系图构建：关系元组 -> 可渲染图
//!
//! 纯函数，无 I/O、无状态：相同输入总是得到相同的图。

use std::collections::{BTreeSet, HashMap};

use crate::core::error::GraphBuildError;
use crate::graph::curvature::assign_group;
use crate::graph::types::{Graph, GraphEdge, GraphNode, GraphStyle};
use crate::model::{Entity, EntityId, RelationshipTuple};

/// 关系图构建器
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraphBuilder {
    style: GraphStyle,
}

impl RelationshipGraphBuilder {
    pub fn new(style: GraphStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &GraphStyle {
        &self.style
    }

    /// 构建图
    ///
    /// - 每个被元组或 focus_ids 引用的实体恰好一个节点（先按元组出现顺序，再按 id 升序补齐焦点）
    /// - 每个元组恰好一条边，顺序与输入一致
    /// - 同一无序节点对上的平行边按输入顺序分配对称曲率
    pub fn build(
        &self,
        tuples: &[RelationshipTuple],
        entities: &[Entity],
        focus_ids: &BTreeSet<EntityId>,
    ) -> Result<Graph, GraphBuildError> {
        let by_id: HashMap<EntityId, &Entity> = entities.iter().map(|e| (e.id, e)).collect();

        let mut order: Vec<EntityId> = Vec::new();
        let mut degree: HashMap<EntityId, usize> = HashMap::new();
        for tuple in tuples {
            for id in [tuple.source, tuple.target] {
                let d = degree.entry(id).or_insert(0);
                if *d == 0 {
                    order.push(id);
                }
                *d += 1;
            }
        }
        for id in focus_ids {
            if !degree.contains_key(id) {
                degree.insert(*id, 0);
                order.push(*id);
            }
        }

        let nodes = order
            .iter()
            .map(|id| self.node(*id, by_id.get(id).copied(), focus_ids.contains(id), degree[id]))
            .collect();

        // 按无序节点对分组；组内保持输入顺序
        let mut groups: HashMap<(EntityId, EntityId), Vec<usize>> = HashMap::new();
        for (index, tuple) in tuples.iter().enumerate() {
            groups.entry(tuple.pair_key()).or_default().push(index);
        }

        let mut slots = vec![None; tuples.len()];
        for (pair, members) in &groups {
            if members.is_empty() {
                return Err(GraphBuildError::InvalidGroup { pair: *pair });
            }
            let ladder = assign_group(members.len(), &self.style)?;
            for (slot, index) in ladder.into_iter().zip(members) {
                slots[*index] = Some(slot);
            }
        }

        let edges = tuples
            .iter()
            .zip(slots)
            .enumerate()
            .map(|(index, (tuple, slot))| {
                let slot = slot.ok_or(GraphBuildError::InvalidGroup { pair: tuple.pair_key() })?;
                Ok(GraphEdge {
                    id: format!("{}->{}:{}#{}", tuple.source, tuple.target, tuple.kind.as_str(), index),
                    source: tuple.source,
                    target: tuple.target,
                    kind: tuple.kind,
                    color: tuple.kind.color().to_string(),
                    curve_type: slot.curve_type,
                    curvature: slot.curvature,
                })
            })
            .collect::<Result<Vec<_>, GraphBuildError>>()?;

        Ok(Graph { nodes, edges })
    }

    fn node(&self, id: EntityId, entity: Option<&Entity>, focus: bool, degree: usize) -> GraphNode {
        let label = entity
            .map(|e| e.display_label.clone())
            .unwrap_or_else(|| format!("Participant {}", id));
        let color = if focus {
            self.style.focus_color.clone()
        } else {
            self.style.neighbor_color.clone()
        };
        GraphNode {
            id,
            label,
            color,
            size: self.style.base_node_size + (degree as f64).sqrt(),
            focus,
            x: None,
            y: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::CurveType;
    use crate::model::RelationKind;

    fn entities() -> Vec<Entity> {
        vec![
            Entity::from_names(1, "Alice", "Nguyen"),
            Entity::from_names(2, "Bob", "Smith"),
            Entity::from_names(3, "Chloe", "Tran"),
        ]
    }

    fn sample() -> Vec<RelationshipTuple> {
        vec![
            RelationshipTuple::new(1, 2, RelationKind::HasFriend),
            RelationshipTuple::new(2, 1, RelationKind::GetAdvice),
            RelationshipTuple::new(1, 2, RelationKind::HasFriend),
            RelationshipTuple::new(2, 3, RelationKind::Disrespect),
        ]
    }

    #[test]
    fn test_one_edge_per_tuple_one_node_per_entity() {
        let builder = RelationshipGraphBuilder::default();
        let graph = builder.build(&sample(), &entities(), &BTreeSet::new()).unwrap();
        assert_eq!(graph.edges.len(), 4);
        assert_eq!(graph.nodes.len(), 3);
        let ids: Vec<i64> = graph.nodes.iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_counts_do_not_depend_on_order() {
        let builder = RelationshipGraphBuilder::default();
        let mut tuples = sample();
        let forward = builder.build(&tuples, &entities(), &BTreeSet::new()).unwrap();
        tuples.reverse();
        let backward = builder.build(&tuples, &entities(), &BTreeSet::new()).unwrap();
        assert_eq!(forward.edges.len(), backward.edges.len());
        assert_eq!(forward.nodes.len(), backward.nodes.len());

        let curvatures = |g: &Graph| {
            let mut c: Vec<i64> = g.edges.iter().map(|e| (e.curvature * 1e9).round() as i64).collect();
            c.sort();
            c
        };
        assert_eq!(curvatures(&forward), curvatures(&backward));
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = RelationshipGraphBuilder::default();
        let focus: BTreeSet<EntityId> = [EntityId(2)].into_iter().collect();
        let a = builder.build(&sample(), &entities(), &focus).unwrap();
        let b = builder.build(&sample(), &entities(), &focus).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parallel_edges_in_both_directions_share_a_ladder() {
        let builder = RelationshipGraphBuilder::default();
        let graph = builder.build(&sample(), &entities(), &BTreeSet::new()).unwrap();

        // 1<->2 三条边：-1, 0, +1
        let pair: Vec<&GraphEdge> = graph.edges.iter().take(3).collect();
        assert_eq!(pair[0].curve_type, CurveType::Curved);
        assert_eq!(pair[1].curve_type, CurveType::Straight);
        assert_eq!(pair[1].curvature, 0.0);
        assert_eq!(pair[2].curve_type, CurveType::Curved);
        assert!((pair[0].curvature + pair[2].curvature).abs() < 1e-12);

        // 2->3 单独一条
        assert_eq!(graph.edges[3].curve_type, CurveType::Straight);
        assert_eq!(graph.edges[3].curvature, 0.0);
    }

    #[test]
    fn test_focus_nodes_and_colors() {
        let builder = RelationshipGraphBuilder::default();
        let focus: BTreeSet<EntityId> = [EntityId(3), EntityId(9)].into_iter().collect();
        let graph = builder.build(&sample(), &entities(), &focus).unwrap();

        // 9 没有任何关系，但作为焦点仍有节点
        assert_eq!(graph.nodes.len(), 4);
        let lonely = graph.node(EntityId(9)).unwrap();
        assert_eq!(lonely.label, "Participant 9");
        assert_eq!(lonely.color, "#111111");
        assert!(lonely.focus);

        assert_eq!(graph.node(EntityId(3)).unwrap().color, "#111111");
        assert_eq!(graph.node(EntityId(1)).unwrap().color, "#cccccc");
        assert_eq!(graph.node(EntityId(1)).unwrap().label, "Alice (Nguyen)");
    }

    #[test]
    fn test_edge_color_follows_kind() {
        let builder = RelationshipGraphBuilder::default();
        let graph = builder.build(&sample(), &entities(), &BTreeSet::new()).unwrap();
        assert_eq!(graph.edges[0].color, "#0000FF");
        assert_eq!(graph.edges[1].color, "#00A73E");
        assert_eq!(graph.edges[3].color, "#660066");
        assert_eq!(graph.edges[1].id, "2->1:get_advice#1");
    }

    #[test]
    fn test_node_size_reflects_degree() {
        let builder = RelationshipGraphBuilder::default();
        let graph = builder.build(&sample(), &entities(), &BTreeSet::new()).unwrap();
        let two = graph.node(EntityId(2)).unwrap().size;
        let three = graph.node(EntityId(3)).unwrap().size;
        assert!(two > three);
        assert_eq!(three, 2.0);
    }

    #[test]
    fn test_empty_input() {
        let builder = RelationshipGraphBuilder::default();
        let graph = builder.build(&[], &entities(), &BTreeSet::new()).unwrap();
        assert!(graph.nodes.is_empty());
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_neighbors_and_layout() {
        let builder = RelationshipGraphBuilder::default();
        let graph = builder
            .build(&sample(), &entities(), &BTreeSet::new())
            .unwrap()
            .with_circular_layout(0.5);
        assert!(graph.nodes.iter().all(|n| n.x.is_some() && n.y.is_some()));
        assert!((graph.nodes[0].x.unwrap() - 0.5).abs() < 1e-12);

        let neighbors = graph.neighbors_of(EntityId(2));
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].neighbor, EntityId(1));
        assert_eq!(neighbors[0].kinds, vec![RelationKind::GetAdvice]);
        assert_eq!(neighbors[1].kinds, vec![RelationKind::Disrespect]);
    }
}
