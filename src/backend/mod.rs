//! 外部协作方：分配后端与图数据源（trait + HTTP 实现 + 脚本实现）

pub mod http;
pub mod mock;
pub mod traits;
pub mod wire;

pub use http::HttpBackend;
pub use mock::{demo_collaborators, DataPart, Dataset, InMemoryDataSource, PollStep, ScriptedBackend};
pub use traits::{AllocationBackend, ApplyStatus, EntityFilter, GraphDataSource, PollStatus};
