//! 数据模型：参与者、关系元组、分配任务选项与分配结果
//!
//! 所有数据都以 ProcessId 为作用域：同一个 Entity id 在不同 ProcessId 下是不同的实体，
//! 不会跨 ProcessId 合并。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// 分配任务完成后产出的过程标识，所有下游查询都以它为作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub i64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 参与者（学生）ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 班级 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub i64);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 后端分配的任务 ID（后端以字符串返回）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// 参与者属性值：数值或文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

/// 参与者（学生）。对给定 ProcessId 拉取后不可变，身份为 (ProcessId, id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    #[serde(rename = "label")]
    pub display_label: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// 班级归属存放在该属性里
pub const CLASS_ATTRIBUTE: &str = "class_id";

impl Entity {
    pub fn new(id: i64, display_label: impl Into<String>) -> Self {
        Self {
            id: EntityId(id),
            display_label: display_label.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// 按「名 (姓)」约定生成标签
    pub fn from_names(id: i64, first_name: &str, last_name: &str) -> Self {
        Self::new(id, format!("{} ({})", first_name, last_name))
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_class(self, class_id: ClassId) -> Self {
        self.with_attribute(CLASS_ATTRIBUTE, AttributeValue::Number(class_id.0 as f64))
    }

    /// 所属班级；属性缺失或不是整数时返回 None
    pub fn class_id(&self) -> Option<ClassId> {
        match self.attributes.get(CLASS_ATTRIBUTE)? {
            AttributeValue::Number(n) if n.fract() == 0.0 => Some(ClassId(*n as i64)),
            AttributeValue::Text(s) => s.trim().parse().ok().map(ClassId),
            _ => None,
        }
    }
}

/// 关系类型，每种类型对应固定颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    HasFriend,
    HasInfluence,
    GetAdvice,
    HasFeedback,
    SpendMoreTime,
    Disrespect,
}

impl RelationKind {
    pub const ALL: [RelationKind; 6] = [
        RelationKind::HasFriend,
        RelationKind::HasInfluence,
        RelationKind::GetAdvice,
        RelationKind::HasFeedback,
        RelationKind::SpendMoreTime,
        RelationKind::Disrespect,
    ];

    /// 边颜色（固定调色板）
    pub fn color(self) -> &'static str {
        match self {
            RelationKind::HasFriend => "#0000FF",
            RelationKind::HasInfluence => "#FF9900",
            RelationKind::GetAdvice => "#00A73E",
            RelationKind::HasFeedback => "#E7000C",
            RelationKind::SpendMoreTime => "#0069A9",
            RelationKind::Disrespect => "#660066",
        }
    }

    /// 详情面板里展示的动词短语
    pub fn label(self) -> &'static str {
        match self {
            RelationKind::HasFriend => "has friend",
            RelationKind::HasInfluence => "has influence",
            RelationKind::GetAdvice => "gets advice",
            RelationKind::HasFeedback => "has feedback",
            RelationKind::SpendMoreTime => "spends more time",
            RelationKind::Disrespect => "disrespects",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::HasFriend => "has_friend",
            RelationKind::HasInfluence => "has_influence",
            RelationKind::GetAdvice => "get_advice",
            RelationKind::HasFeedback => "has_feedback",
            RelationKind::SpendMoreTime => "spend_more_time",
            RelationKind::Disrespect => "disrespect",
        }
    }
}

/// 一条有向、带类型、带权重的关系。同一对节点可以有多条（甚至同类型重复）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipTuple {
    #[serde(rename = "source_id")]
    pub source: EntityId,
    #[serde(rename = "target_id")]
    pub target: EntityId,
    #[serde(rename = "relation_kind")]
    pub kind: RelationKind,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl RelationshipTuple {
    pub fn new(source: i64, target: i64, kind: RelationKind) -> Self {
        Self {
            source: EntityId(source),
            target: EntityId(target),
            kind,
            weight: 1.0,
        }
    }

    /// 无序节点对键 {min, max}
    pub fn pair_key(&self) -> (EntityId, EntityId) {
        if self.source <= self.target {
            (self.source, self.target)
        } else {
            (self.target, self.source)
        }
    }

    pub fn touches(&self, id: EntityId) -> bool {
        self.source == id || self.target == id
    }
}

/// 分配算法选项（后端 /run 的 option 字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationOption {
    #[default]
    Balanced,
    Academic,
    Mental,
    Social,
}

impl std::str::FromStr for AllocationOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "academic" => Ok(Self::Academic),
            "mental" => Ok(Self::Mental),
            "social" => Ok(Self::Social),
            other => Err(format!("unknown allocation option: {}", other)),
        }
    }
}

/// 聚合指标：指标名 -> 分数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateMetrics(pub BTreeMap<String, f64>);

impl AggregateMetrics {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for AggregateMetrics {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// 组合后的分配结果视图模型。按 ProcessId 缓存，只会被整体替换，不会原地修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationResult {
    pub process_id: ProcessId,
    pub aggregate_metrics: AggregateMetrics,
    pub entities: Arc<Vec<Entity>>,
}

impl AllocationResult {
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entity(id).is_some()
    }
}
