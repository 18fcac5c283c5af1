//! 外部协作方抽象
//!
//! - AllocationBackend：提交 / 轮询分配任务、对话式重分配、应用变更、通用聊天
//! - GraphDataSource：按 ProcessId 拉取聚合指标、参与者列表、关系元组
//!
//! 核心逻辑只依赖这两个 trait；HTTP 实现见 `http`，测试与演示用的脚本实现见 `mock`。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::BackendError;
use crate::graph::RelationshipScope;
use crate::model::{
    AggregateMetrics, AllocationOption, ClassId, Entity, EntityId, JobId, ProcessId,
    RelationshipTuple,
};

/// 轮询响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Processing,
    Completed(ProcessId),
    Failed,
    /// 后端不认识该任务
    NotFound,
}

/// 「应用变更」的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyStatus {
    Success { process_id: ProcessId },
    Failed,
}

/// 参与者列表过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFilter {
    pub class_id: Option<ClassId>,
    /// 标签模糊匹配（不区分大小写）
    pub search: Option<String>,
}

impl EntityFilter {
    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(class_id) = self.class_id {
            if entity.class_id() != Some(class_id) {
                return false;
            }
        }
        match &self.search {
            Some(q) => entity
                .display_label
                .to_lowercase()
                .contains(&q.trim().to_lowercase()),
            None => true,
        }
    }
}

/// 分配后端（黑盒），只通过请求 / 轮询契约访问
#[async_trait]
pub trait AllocationBackend: Send + Sync {
    /// 提交分配任务，返回后端任务 ID
    async fn submit_job(&self, option: AllocationOption) -> Result<JobId, BackendError>;

    /// 查询任务状态
    async fn poll_job(&self, job_id: &JobId) -> Result<PollStatus, BackendError>;

    /// 对话触发的重分配：把 target 移到 class，后端同步返回新的 ProcessId
    async fn submit_reallocation(
        &self,
        target: EntityId,
        class: ClassId,
    ) -> Result<ProcessId, BackendError>;

    /// 把某个 ProcessId 的变更保存为正式结果，不产生新的 ProcessId
    async fn apply_reallocation(&self, process_id: ProcessId) -> Result<ApplyStatus, BackendError>;

    /// 最近一次分配的 ProcessId（启动时作为初始结果）
    async fn latest_process_id(&self) -> Result<Option<ProcessId>, BackendError>;

    /// 通用聊天回复（消息不是重分配请求时使用）
    async fn chat(&self, message: &str) -> Result<String, BackendError>;
}

/// 图 / 指标数据源
#[async_trait]
pub trait GraphDataSource: Send + Sync {
    async fn fetch_metrics(&self, process_id: ProcessId) -> Result<AggregateMetrics, BackendError>;

    async fn fetch_entities(
        &self,
        process_id: ProcessId,
        filter: Option<&EntityFilter>,
    ) -> Result<Vec<Entity>, BackendError>;

    async fn fetch_relationships(
        &self,
        process_id: ProcessId,
        scope: &RelationshipScope,
    ) -> Result<Vec<RelationshipTuple>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_filter() {
        let alice = Entity::from_names(1, "Alice", "Nguyen").with_class(ClassId(2));
        assert!(EntityFilter::default().matches(&alice));
        assert!(EntityFilter {
            class_id: Some(ClassId(2)),
            search: Some("nguy".into()),
        }
        .matches(&alice));
        assert!(!EntityFilter {
            class_id: Some(ClassId(3)),
            search: None,
        }
        .matches(&alice));
    }
}
