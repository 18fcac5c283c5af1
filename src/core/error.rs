//! 错误分类
//!
//! - BackendError：与外部分配后端 / 图数据源通信失败
//! - JobError：提交、轮询、应用变更失败（统一呈现为任务 failed，不自动重试）
//! - CompositionError：指标或参与者任一拉取失败，整个 AllocationResult 失败
//! - GraphBuildError：程序错误（空分组 / 非正 maxIndex），直接失败而不是画错图
//! - GraphViewError：取图时上面两类错误的并集
//! - SelectionError：选中了当前结果之外的实体

use thiserror::Error;

use crate::model::{EntityId, JobId, ProcessId};

/// 外部协作方（HTTP 后端、数据源）返回的错误；可在多个等待方之间共享，因此实现 Clone
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Transport(String),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed backend response: {0}")]
    Decode(String),

    #[error("Backend rejected request: {0}")]
    Rejected(String),
}

/// 任务编排错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("Job submission failed: {0}")]
    Submission(#[source] BackendError),

    #[error("Job polling failed: {0}")]
    Poll(#[source] BackendError),

    #[error("Job {0} failed on backend")]
    Failed(JobId),

    #[error("Job {0} not found on backend")]
    NotFound(JobId),

    #[error("No active process to apply")]
    NoActiveProcess,

    #[error("Applying process {process_id} failed: {source}")]
    Apply {
        process_id: ProcessId,
        #[source]
        source: BackendError,
    },
}

/// 结果组合错误：不暴露半成品
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositionError {
    #[error("Fetching metrics for process {process_id} failed: {source}")]
    Metrics {
        process_id: ProcessId,
        #[source]
        source: BackendError,
    },

    #[error("Fetching entities for process {process_id} failed: {source}")]
    Entities {
        process_id: ProcessId,
        #[source]
        source: BackendError,
    },

    #[error("Fetching relationships for process {process_id} failed: {source}")]
    Relationships {
        process_id: ProcessId,
        #[source]
        source: BackendError,
    },
}

impl CompositionError {
    pub fn process_id(&self) -> ProcessId {
        match self {
            CompositionError::Metrics { process_id, .. }
            | CompositionError::Entities { process_id, .. }
            | CompositionError::Relationships { process_id, .. } => *process_id,
        }
    }
}

/// 构图错误（程序错误，不可由用户恢复）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphBuildError {
    #[error("Invalid parallel-edge group {pair:?}: group is empty")]
    InvalidGroup { pair: (EntityId, EntityId) },

    #[error("Curved edge requested with non-positive max index {max_index} (offset {offset})")]
    NonPositiveMaxIndex { offset: f64, max_index: f64 },

    #[error("Curvature amplitude and unit must be positive (amplitude {amplitude}, unit {unit})")]
    InvalidStyle { amplitude: f64, unit: f64 },
}

/// 取图错误：数据拉取失败或构图失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphViewError {
    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Build(#[from] GraphBuildError),
}

/// 选中态错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("No allocation result is loaded")]
    NoActiveResult,

    #[error("Entity {id} is not part of process {process_id}")]
    UnknownEntity { id: EntityId, process_id: ProcessId },
}

/// 对话路径错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("Chat backend failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Reallocation failed: {0}")]
    Reallocation(#[from] JobError),
}
