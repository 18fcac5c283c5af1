//! 后端 HTTP 接口的请求 / 响应结构

use serde::{Deserialize, Serialize};

use crate::backend::traits::{ApplyStatus, PollStatus};
use crate::core::error::BackendError;
use crate::model::{AllocationOption, ClassId, EntityId, ProcessId};

#[derive(Debug, Serialize)]
pub struct RunRequest {
    pub option: AllocationOption,
    pub save_data: bool,
}

#[derive(Debug, Deserialize)]
pub struct RunResponse {
    pub job_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JobStatusResponse {
    pub status: String,
    #[serde(default)]
    pub result: Option<i64>,
}

impl JobStatusResponse {
    pub fn into_status(self) -> Result<PollStatus, BackendError> {
        match self.status.as_str() {
            "processing" => Ok(PollStatus::Processing),
            "failed" => Ok(PollStatus::Failed),
            "not_found" => Ok(PollStatus::NotFound),
            "completed" => self
                .result
                .map(|pid| PollStatus::Completed(ProcessId(pid)))
                .ok_or_else(|| BackendError::Decode("completed job without result".to_string())),
            other => Err(BackendError::Decode(format!("unknown job status: {}", other))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReallocateRequest {
    pub target_id: EntityId,
    pub class_id: ClassId,
}

#[derive(Debug, Deserialize)]
pub struct ReallocateResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub process_id: Option<i64>,
}

impl ReallocateResponse {
    pub fn into_process_id(self) -> Result<ProcessId, BackendError> {
        match (self.status.as_str(), self.process_id) {
            ("success", Some(pid)) => Ok(ProcessId(pid)),
            _ => Err(BackendError::Rejected(
                self.message.unwrap_or_else(|| format!("reallocation {}", self.status)),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SaveRequest {
    pub process_id: ProcessId,
}

#[derive(Debug, Deserialize)]
pub struct SaveResponse {
    pub status: String,
    #[serde(default)]
    pub process_id: Option<i64>,
}

impl From<SaveResponse> for ApplyStatus {
    fn from(r: SaveResponse) -> Self {
        match (r.status.as_str(), r.process_id) {
            ("success", Some(pid)) => ApplyStatus::Success {
                process_id: ProcessId(pid),
            },
            _ => ApplyStatus::Failed,
        }
    }
}

/// 没有任何分配时后端返回的是字符串 "Not found"
#[derive(Debug, Deserialize)]
pub struct LatestProcessResponse {
    pub latest_process_id: serde_json::Value,
}

impl LatestProcessResponse {
    pub fn process_id(&self) -> Option<ProcessId> {
        match &self.latest_process_id {
            serde_json::Value::Number(n) => n.as_i64().map(ProcessId),
            serde_json::Value::String(s) => s.parse().ok().map(ProcessId),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}
