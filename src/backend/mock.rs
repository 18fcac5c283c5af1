//! 脚本化的内存协作方（用于测试与无后端时的演示，无需网络）
//!
//! ScriptedBackend 为每个提交的任务按顺序回放预设的轮询响应；
//! InMemoryDataSource 按 ProcessId 返回固定数据集，并记录调用次数。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::traits::{
    AllocationBackend, ApplyStatus, EntityFilter, GraphDataSource, PollStatus,
};
use crate::core::error::BackendError;
use crate::graph::RelationshipScope;
use crate::model::{
    AggregateMetrics, AllocationOption, ClassId, Entity, EntityId, JobId, ProcessId,
    RelationKind, RelationshipTuple,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// 一次轮询的预设响应
#[derive(Debug, Clone)]
pub struct PollStep {
    pub response: Result<PollStatus, BackendError>,
    pub delay: Duration,
}

impl PollStep {
    pub fn ready(status: PollStatus) -> Self {
        Self {
            response: Ok(status),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(status: PollStatus, delay: Duration) -> Self {
        Self {
            response: Ok(status),
            delay,
        }
    }

    pub fn error(err: BackendError) -> Self {
        Self {
            response: Err(err),
            delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct ScriptState {
    next_job: u64,
    queued_scripts: VecDeque<Vec<PollStep>>,
    scripts: HashMap<JobId, VecDeque<PollStep>>,
    last_step: HashMap<JobId, PollStep>,
    poll_counts: HashMap<JobId, usize>,
    submit_failures: VecDeque<BackendError>,
    submitted: Vec<AllocationOption>,
    reallocations: Vec<(EntityId, ClassId)>,
    next_reallocation_pid: i64,
    applied: Vec<ProcessId>,
    latest: Option<ProcessId>,
    chat_replies: VecDeque<String>,
    chats: Vec<String>,
}

/// 脚本化分配后端
pub struct ScriptedBackend {
    state: Mutex<ScriptState>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState {
                next_job: 1,
                next_reallocation_pid: 100,
                ..Default::default()
            }),
        }
    }

    /// 下一次 submit_job 得到的任务按该脚本回放；脚本用完后重复最后一步
    pub fn script_next_job(&self, steps: Vec<PollStep>) -> &Self {
        lock(&self.state).queued_scripts.push_back(steps);
        self
    }

    /// 为已知任务 ID 设置脚本（用于 resume）
    pub fn script_job(&self, job_id: JobId, steps: Vec<PollStep>) -> &Self {
        lock(&self.state).scripts.insert(job_id, steps.into());
        self
    }

    pub fn fail_next_submit(&self, err: BackendError) -> &Self {
        lock(&self.state).submit_failures.push_back(err);
        self
    }

    pub fn set_latest(&self, pid: Option<ProcessId>) -> &Self {
        lock(&self.state).latest = pid;
        self
    }

    /// 重分配返回的 ProcessId 从 start 开始递增
    pub fn set_reallocation_start(&self, start: i64) -> &Self {
        lock(&self.state).next_reallocation_pid = start;
        self
    }

    pub fn queue_chat_reply(&self, reply: &str) -> &Self {
        lock(&self.state).chat_replies.push_back(reply.to_string());
        self
    }

    pub fn poll_count(&self, job_id: &JobId) -> usize {
        lock(&self.state).poll_counts.get(job_id).copied().unwrap_or(0)
    }

    pub fn submitted(&self) -> Vec<AllocationOption> {
        lock(&self.state).submitted.clone()
    }

    pub fn reallocations(&self) -> Vec<(EntityId, ClassId)> {
        lock(&self.state).reallocations.clone()
    }

    pub fn applied(&self) -> Vec<ProcessId> {
        lock(&self.state).applied.clone()
    }

    pub fn chats(&self) -> Vec<String> {
        lock(&self.state).chats.clone()
    }
}

#[async_trait]
impl AllocationBackend for ScriptedBackend {
    async fn submit_job(&self, option: AllocationOption) -> Result<JobId, BackendError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.submit_failures.pop_front() {
            return Err(err);
        }
        state.submitted.push(option);
        let job_id = JobId(state.next_job.to_string());
        state.next_job += 1;
        let script = state.queued_scripts.pop_front().unwrap_or_default();
        state.scripts.insert(job_id.clone(), script.into());
        Ok(job_id)
    }

    async fn poll_job(&self, job_id: &JobId) -> Result<PollStatus, BackendError> {
        let step = {
            let mut state = lock(&self.state);
            *state.poll_counts.entry(job_id.clone()).or_insert(0) += 1;
            let next = state.scripts.get_mut(job_id).and_then(|s| s.pop_front());
            match next {
                Some(step) => {
                    state.last_step.insert(job_id.clone(), step.clone());
                    step
                }
                None => match state.last_step.get(job_id) {
                    Some(last) => PollStep {
                        response: last.response.clone(),
                        delay: Duration::ZERO,
                    },
                    None if state.scripts.contains_key(job_id) => {
                        PollStep::ready(PollStatus::Processing)
                    }
                    None => PollStep::ready(PollStatus::NotFound),
                },
            }
        };
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.response
    }

    async fn submit_reallocation(
        &self,
        target: EntityId,
        class: ClassId,
    ) -> Result<ProcessId, BackendError> {
        let mut state = lock(&self.state);
        state.reallocations.push((target, class));
        let pid = ProcessId(state.next_reallocation_pid);
        state.next_reallocation_pid += 1;
        Ok(pid)
    }

    async fn apply_reallocation(&self, process_id: ProcessId) -> Result<ApplyStatus, BackendError> {
        let mut state = lock(&self.state);
        state.applied.push(process_id);
        state.latest = Some(process_id);
        Ok(ApplyStatus::Success { process_id })
    }

    async fn latest_process_id(&self) -> Result<Option<ProcessId>, BackendError> {
        Ok(lock(&self.state).latest)
    }

    async fn chat(&self, message: &str) -> Result<String, BackendError> {
        let mut state = lock(&self.state);
        state.chats.push(message.to_string());
        Ok(state
            .chat_replies
            .pop_front()
            .unwrap_or_else(|| "I can explain the allocation or move a student for you.".to_string()))
    }
}

/// 某个 ProcessId 的完整数据
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub metrics: AggregateMetrics,
    pub entities: Vec<Entity>,
    pub relationships: Vec<RelationshipTuple>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataPart {
    Metrics,
    Entities,
    Relationships,
}

/// 内存数据源
#[derive(Default)]
pub struct InMemoryDataSource {
    datasets: Mutex<HashMap<ProcessId, Dataset>>,
    failures: Mutex<HashSet<(ProcessId, DataPart)>>,
    delay: Duration,
    metrics_calls: AtomicUsize,
    entities_calls: AtomicUsize,
    relationships_calls: AtomicUsize,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次拉取前等待 delay，用于制造并发重叠
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn insert(&self, pid: ProcessId, dataset: Dataset) {
        lock(&self.datasets).insert(pid, dataset);
    }

    pub fn fail(&self, pid: ProcessId, part: DataPart) {
        lock(&self.failures).insert((pid, part));
    }

    pub fn recover(&self, pid: ProcessId, part: DataPart) {
        lock(&self.failures).remove(&(pid, part));
    }

    pub fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }

    pub fn entities_calls(&self) -> usize {
        self.entities_calls.load(Ordering::SeqCst)
    }

    pub fn relationships_calls(&self) -> usize {
        self.relationships_calls.load(Ordering::SeqCst)
    }

    async fn dataset(&self, pid: ProcessId, part: DataPart) -> Result<Dataset, BackendError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if lock(&self.failures).contains(&(pid, part)) {
            return Err(BackendError::Status {
                status: 503,
                body: format!("{:?} unavailable for process {}", part, pid),
            });
        }
        lock(&self.datasets)
            .get(&pid)
            .cloned()
            .ok_or_else(|| BackendError::Status {
                status: 404,
                body: format!("process {} not found", pid),
            })
    }
}

#[async_trait]
impl GraphDataSource for InMemoryDataSource {
    async fn fetch_metrics(&self, process_id: ProcessId) -> Result<AggregateMetrics, BackendError> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.dataset(process_id, DataPart::Metrics).await?.metrics)
    }

    async fn fetch_entities(
        &self,
        process_id: ProcessId,
        filter: Option<&EntityFilter>,
    ) -> Result<Vec<Entity>, BackendError> {
        self.entities_calls.fetch_add(1, Ordering::SeqCst);
        let entities = self.dataset(process_id, DataPart::Entities).await?.entities;
        Ok(match filter {
            Some(f) => entities.into_iter().filter(|e| f.matches(e)).collect(),
            None => entities,
        })
    }

    async fn fetch_relationships(
        &self,
        process_id: ProcessId,
        scope: &RelationshipScope,
    ) -> Result<Vec<RelationshipTuple>, BackendError> {
        self.relationships_calls.fetch_add(1, Ordering::SeqCst);
        let data = self.dataset(process_id, DataPart::Relationships).await?;
        Ok(scope.filter(&data.relationships, &data.entities))
    }
}

/// 演示数据：两个班六名学生，任务轮询两次后完成
pub fn demo_collaborators(process_id: ProcessId) -> (ScriptedBackend, InMemoryDataSource) {
    let backend = ScriptedBackend::new();
    backend.script_next_job(vec![
        PollStep::ready(PollStatus::Processing),
        PollStep::ready(PollStatus::Processing),
        PollStep::ready(PollStatus::Completed(process_id)),
    ]);

    let names = [
        ("Alice", "Nguyen"),
        ("Bob", "Smith"),
        ("Chloe", "Tran"),
        ("David", "Lee"),
        ("Eve", "Walker"),
        ("Frank", "Ho"),
    ];
    let entities = names
        .iter()
        .enumerate()
        .map(|(i, (first, last))| {
            Entity::from_names(i as i64 + 1, first, last).with_class(ClassId(i as i64 / 3 + 1))
        })
        .collect();

    let relationships = vec![
        RelationshipTuple::new(1, 2, RelationKind::HasFriend),
        RelationshipTuple::new(2, 1, RelationKind::HasFriend),
        RelationshipTuple::new(1, 2, RelationKind::GetAdvice),
        RelationshipTuple::new(2, 3, RelationKind::HasInfluence),
        RelationshipTuple::new(3, 4, RelationKind::Disrespect),
        RelationshipTuple::new(4, 5, RelationKind::SpendMoreTime),
        RelationshipTuple::new(5, 4, RelationKind::HasFeedback),
        RelationshipTuple::new(5, 6, RelationKind::HasFriend),
    ];

    let source = InMemoryDataSource::new();
    source.insert(
        process_id,
        Dataset {
            metrics: [("academic", 0.78), ("social", 0.85), ("overall", 0.88)]
                .into_iter()
                .collect(),
            entities,
            relationships,
        },
    );
    (backend, source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_replays_then_repeats_last() {
        let backend = ScriptedBackend::new();
        backend.script_next_job(vec![
            PollStep::ready(PollStatus::Processing),
            PollStep::ready(PollStatus::Completed(ProcessId(3))),
        ]);
        let job = backend.submit_job(AllocationOption::Academic).await.unwrap();
        assert_eq!(backend.poll_job(&job).await.unwrap(), PollStatus::Processing);
        assert_eq!(backend.poll_job(&job).await.unwrap(), PollStatus::Completed(ProcessId(3)));
        assert_eq!(backend.poll_job(&job).await.unwrap(), PollStatus::Completed(ProcessId(3)));
        assert_eq!(backend.poll_count(&job), 3);
        assert_eq!(backend.poll_job(&JobId::from("missing")).await.unwrap(), PollStatus::NotFound);
    }

    #[tokio::test]
    async fn test_data_source_failures_and_counters() {
        let source = InMemoryDataSource::new();
        source.insert(ProcessId(1), Dataset::default());
        source.fail(ProcessId(1), DataPart::Metrics);
        assert!(source.fetch_metrics(ProcessId(1)).await.is_err());
        source.recover(ProcessId(1), DataPart::Metrics);
        assert!(source.fetch_metrics(ProcessId(1)).await.is_ok());
        assert!(source.fetch_entities(ProcessId(2), None).await.is_err());
        assert_eq!(source.metrics_calls(), 2);
        assert_eq!(source.entities_calls(), 1);
    }
}
