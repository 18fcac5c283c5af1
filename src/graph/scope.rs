//! 子图作用域：某个参与者的关系网、某个班级内部的关系、某一种关系类型
//!
//! 已经缓存了某 ProcessId 的全量元组时，子图通过过滤 + 重新构图得到，不再重新拉取。

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{ClassId, Entity, EntityId, RelationKind, RelationshipTuple};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum RelationshipScope {
    All,
    /// 与某个参与者直接相连的关系
    Participant(EntityId),
    /// 两端都属于该班级的关系
    Class(ClassId),
    /// 某一种关系类型
    Kind(RelationKind),
}

impl RelationshipScope {
    /// 从全量元组中取出该作用域的子集，保持原顺序
    pub fn filter(&self, tuples: &[RelationshipTuple], entities: &[Entity]) -> Vec<RelationshipTuple> {
        match self {
            RelationshipScope::All => tuples.to_vec(),
            RelationshipScope::Participant(id) => {
                tuples.iter().filter(|t| t.touches(*id)).cloned().collect()
            }
            RelationshipScope::Class(class_id) => {
                let members = class_members(entities, *class_id);
                tuples
                    .iter()
                    .filter(|t| members.contains(&t.source) && members.contains(&t.target))
                    .cloned()
                    .collect()
            }
            RelationshipScope::Kind(kind) => {
                tuples.iter().filter(|t| t.kind == *kind).cloned().collect()
            }
        }
    }

    /// 该作用域下默认高亮的焦点集合
    pub fn focus_ids(&self, entities: &[Entity]) -> BTreeSet<EntityId> {
        match self {
            RelationshipScope::All | RelationshipScope::Kind(_) => BTreeSet::new(),
            RelationshipScope::Participant(id) => [*id].into_iter().collect(),
            RelationshipScope::Class(class_id) => {
                class_members(entities, *class_id).into_iter().collect()
            }
        }
    }
}

fn class_members(entities: &[Entity], class_id: ClassId) -> HashSet<EntityId> {
    entities
        .iter()
        .filter(|e| e.class_id() == Some(class_id))
        .map(|e| e.id)
        .collect()
}
