//! 核心编排层：错误分类、任务状态、任务编排、选中态、结果组合与对比、Dashboard

pub mod compare;
pub mod composer;
pub mod dashboard;
pub mod error;
pub mod orchestrator;
pub mod selection;
pub mod state;

pub use compare::{Comparison, MetricsDelta};
pub use composer::ResultComposer;
pub use dashboard::Dashboard;
pub use error::{
    BackendError, ChatError, CompositionError, GraphBuildError, GraphViewError, JobError,
    SelectionError,
};
pub use orchestrator::{JobOrchestrator, JobTicket};
pub use selection::{GraphEventSink, SelectionCoordinator};
pub use state::{Job, JobKind, JobStatus, ResultState};
