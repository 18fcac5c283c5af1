//! 状态定义：任务快照 Job 与结果视图状态 ResultState
//!
//! UI 只读这些轻量投影；Job 只由编排器的轮询循环修改，ResultState 只由 Dashboard 修改。

use std::sync::Arc;

use serde::Serialize;

use crate::model::{AllocationOption, AllocationResult, ClassId, EntityId, JobId, ProcessId};

/// 任务状态机阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Submitted,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// 任务来源
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// 表单提交的分配任务
    Allocation { option: AllocationOption },
    /// 对话触发的重分配子任务
    Reallocation { target: EntityId, class: ClassId },
    /// 重新挂接到上次会话留下的任务
    Resumed,
}

/// 当前槽位上任务的快照
#[derive(Clone, Debug, Serialize)]
pub struct Job {
    /// 每次提交递增；旧代的响应一律丢弃
    pub generation: u64,
    pub kind: Option<JobKind>,
    pub job_id: Option<JobId>,
    pub status: JobStatus,
    pub result_process_id: Option<ProcessId>,
    pub poll_count: u32,
    pub error: Option<String>,
    /// 毫秒时间戳
    pub submitted_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl Default for Job {
    fn default() -> Self {
        Self {
            generation: 0,
            kind: None,
            job_id: None,
            status: JobStatus::Idle,
            result_process_id: None,
            poll_count: 0,
            error: None,
            submitted_at: None,
            finished_at: None,
        }
    }
}

impl Job {
    pub(crate) fn submitted(generation: u64, kind: JobKind) -> Self {
        Self {
            generation,
            kind: Some(kind),
            status: JobStatus::Submitted,
            submitted_at: Some(chrono::Utc::now().timestamp_millis()),
            ..Self::default()
        }
    }

    pub(crate) fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.finished_at = Some(chrono::Utc::now().timestamp_millis());
    }
}

/// 结果面板的状态
#[derive(Clone, Debug, Default)]
pub enum ResultState {
    #[default]
    Empty,
    Loading(ProcessId),
    Ready(Arc<AllocationResult>),
    Failed {
        process_id: ProcessId,
        message: String,
    },
}

impl ResultState {
    pub fn process_id(&self) -> Option<ProcessId> {
        match self {
            ResultState::Empty => None,
            ResultState::Loading(pid) => Some(*pid),
            ResultState::Ready(r) => Some(r.process_id),
            ResultState::Failed { process_id, .. } => Some(*process_id),
        }
    }

    pub fn result(&self) -> Option<&Arc<AllocationResult>> {
        match self {
            ResultState::Ready(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ResultState::Loading(_))
    }
}
