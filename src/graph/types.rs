//! 可渲染图的数据结构

use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::Serialize;

use crate::model::{EntityId, RelationKind};

/// 渲染样式参数
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStyle {
    /// 曲率饱和幅度 A
    pub curvature_amplitude: f64,
    /// 曲率基本单位，最终曲率 = 公式值 × unit
    pub curvature_unit: f64,
    pub focus_color: String,
    pub neighbor_color: String,
    pub base_node_size: f64,
}

impl Default for GraphStyle {
    fn default() -> Self {
        Self {
            curvature_amplitude: 3.5,
            curvature_unit: 0.1,
            focus_color: "#111111".to_string(),
            neighbor_color: "#cccccc".to_string(),
            base_node_size: 1.0,
        }
    }
}

impl GraphStyle {
    /// 任意数量平行边下曲率绝对值的上界
    pub fn max_curvature(&self) -> f64 {
        self.curvature_amplitude * self.curvature_unit
    }

    /// 幅度为 0 时公式退化为 NaN，单位为负会翻转阶梯
    pub fn has_valid_curvature(&self) -> bool {
        self.curvature_amplitude.is_finite()
            && self.curvature_amplitude > 0.0
            && self.curvature_unit.is_finite()
            && self.curvature_unit > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveType {
    Straight,
    Curved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: EntityId,
    pub label: String,
    pub color: String,
    pub size: f64,
    /// 是否为显式选中的焦点实体
    pub focus: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: EntityId,
    pub target: EntityId,
    pub kind: RelationKind,
    pub color: String,
    pub curve_type: CurveType,
    /// 相对于节点对规范方向（min id -> max id）的弯曲系数
    pub curvature: f64,
}

/// 详情面板中一个邻居及其关系列表
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborRelations {
    pub neighbor: EntityId,
    pub label: String,
    pub kinds: Vec<RelationKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn node(&self, id: EntityId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn curved_edge_count(&self) -> usize {
        self.edges
            .iter()
            .filter(|e| e.curve_type == CurveType::Curved)
            .count()
    }

    /// 节点 i 放在角度 2πi/n 的圆上（渲染端需要初始坐标时使用）
    pub fn with_circular_layout(mut self, radius: f64) -> Self {
        let n = self.nodes.len().max(1) as f64;
        for (i, node) in self.nodes.iter_mut().enumerate() {
            let angle = i as f64 * 2.0 * PI / n;
            node.x = Some(radius * angle.cos());
            node.y = Some(radius * angle.sin());
        }
        self
    }

    /// 以 id 为起点的出边，按邻居聚合；邻居顺序与节点顺序一致
    pub fn neighbors_of(&self, id: EntityId) -> Vec<NeighborRelations> {
        let mut grouped: BTreeMap<EntityId, Vec<RelationKind>> = BTreeMap::new();
        for edge in self.edges.iter().filter(|e| e.source == id && e.target != id) {
            grouped.entry(edge.target).or_default().push(edge.kind);
        }

        self.nodes
            .iter()
            .filter_map(|node| {
                grouped.remove(&node.id).map(|kinds| NeighborRelations {
                    neighbor: node.id,
                    label: node.label.clone(),
                    kinds,
                })
            })
            .collect()
    }
}
