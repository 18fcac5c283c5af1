//! 基于 reqwest 的 HTTP 后端：同时实现 AllocationBackend 与 GraphDataSource

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::backend::traits::{
    AllocationBackend, ApplyStatus, EntityFilter, GraphDataSource, PollStatus,
};
use crate::backend::wire::*;
use crate::core::error::BackendError;
use crate::graph::RelationshipScope;
use crate::model::{
    AggregateMetrics, AllocationOption, ClassId, Entity, EntityId, JobId, ProcessId,
    RelationshipTuple,
};

/// HTTP 后端客户端
pub struct HttpBackend {
    client: Client,
    base_url: String,
    save_data: bool,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout_secs: u64, save_data: bool) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            save_data,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, BackendError> {
        let resp = req
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AllocationBackend for HttpBackend {
    async fn submit_job(&self, option: AllocationOption) -> Result<JobId, BackendError> {
        let body = RunRequest {
            option,
            save_data: self.save_data,
        };
        let resp: RunResponse = self
            .send(self.client.post(self.url("/run")).json(&body))
            .await?;
        if let Some(status) = &resp.status {
            // 同一任务已在队列里时后端会直接返回已有 job_id
            tracing::debug!("Backend answered run request with status '{}'", status);
        }
        Ok(JobId(resp.job_id))
    }

    async fn poll_job(&self, job_id: &JobId) -> Result<PollStatus, BackendError> {
        let resp: JobStatusResponse = self
            .send(self.client.get(self.url(&format!("/job-status/{}", job_id))))
            .await?;
        resp.into_status()
    }

    async fn submit_reallocation(
        &self,
        target: EntityId,
        class: ClassId,
    ) -> Result<ProcessId, BackendError> {
        let body = ReallocateRequest {
            target_id: target,
            class_id: class,
        };
        let resp: ReallocateResponse = self
            .send(self.client.post(self.url("/reallocate")).json(&body))
            .await?;
        resp.into_process_id()
    }

    async fn apply_reallocation(&self, process_id: ProcessId) -> Result<ApplyStatus, BackendError> {
        let resp: SaveResponse = self
            .send(
                self.client
                    .post(self.url("/reallocate/save"))
                    .json(&SaveRequest { process_id }),
            )
            .await?;
        Ok(resp.into())
    }

    async fn latest_process_id(&self) -> Result<Option<ProcessId>, BackendError> {
        let resp: LatestProcessResponse = self
            .send(self.client.get(self.url("/latest-process-id")))
            .await?;
        Ok(resp.process_id())
    }

    async fn chat(&self, message: &str) -> Result<String, BackendError> {
        let resp: ChatResponse = self
            .send(self.client.post(self.url("/chat")).json(&ChatRequest { message }))
            .await?;
        Ok(resp.response)
    }
}

#[async_trait]
impl GraphDataSource for HttpBackend {
    async fn fetch_metrics(&self, process_id: ProcessId) -> Result<AggregateMetrics, BackendError> {
        self.send(
            self.client
                .get(self.url(&format!("/processes/{}/metrics", process_id))),
        )
        .await
    }

    async fn fetch_entities(
        &self,
        process_id: ProcessId,
        filter: Option<&EntityFilter>,
    ) -> Result<Vec<Entity>, BackendError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(f) = filter {
            if let Some(class_id) = f.class_id {
                query.push(("class_id", class_id.to_string()));
            }
            if let Some(search) = &f.search {
                query.push(("search", search.clone()));
            }
        }
        self.send(
            self.client
                .get(self.url(&format!("/processes/{}/participants", process_id)))
                .query(&query),
        )
        .await
    }

    async fn fetch_relationships(
        &self,
        process_id: ProcessId,
        scope: &RelationshipScope,
    ) -> Result<Vec<RelationshipTuple>, BackendError> {
        let query: Vec<(&str, String)> = match scope {
            RelationshipScope::All => vec![],
            RelationshipScope::Participant(id) => vec![("participant_id", id.to_string())],
            RelationshipScope::Class(class_id) => vec![("class_id", class_id.to_string())],
            RelationshipScope::Kind(kind) => vec![("kind", kind.as_str().to_string())],
        };
        self.send(
            self.client
                .get(self.url(&format!("/processes/{}/relationships", process_id)))
                .query(&query),
        )
        .await
    }
}

/// 绑定一个临时端口后立即释放，得到一个当前无人监听的地址
#[cfg(test)]
pub(crate) fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = HttpBackend::new("http://localhost:8000/", 5, true);
        assert_eq!(backend.url("/run"), "http://localhost:8000/run");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let backend = HttpBackend::new(&unreachable_url(), 1, true);
        let err = backend.submit_job(AllocationOption::Balanced).await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }
}
