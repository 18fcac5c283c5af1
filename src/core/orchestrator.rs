//! 任务编排器：分配任务的提交 -> 轮询 -> 完成 / 失败
//!
//! 状态机：idle -> submitted -> processing -> {completed, failed}
//!
//! - 每次提交在快照里递增 generation；轮询响应的写入是「同代才写」的比较-写入，
//!   在 watch 通道锁内完成，旧任务的在途响应因此永远不会覆盖新任务
//! - 轮询只在 processing 且仍是当前代时继续，离开 processing 即停止（状态驱动的取消）
//! - 提交 / 轮询出错一律记为 failed，不自动重试
//! - 完成时把 resultProcessId 发布给所有订阅方，取代之前的 ProcessId

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backend::{AllocationBackend, ApplyStatus, PollStatus};
use crate::core::error::{BackendError, JobError};
use crate::core::state::{Job, JobKind, JobStatus};
use crate::model::{AllocationOption, ClassId, EntityId, JobId, ProcessId};

/// 提交后返回给调用方的回执
#[derive(Debug, Clone, PartialEq)]
pub struct JobTicket {
    pub generation: u64,
    pub job_id: Option<JobId>,
    /// 提交即得到结果时（重分配）直接带回 ProcessId
    pub process_id: Option<ProcessId>,
}

struct Shared {
    backend: Arc<dyn AllocationBackend>,
    poll_interval: Duration,
    job_tx: watch::Sender<Job>,
    process_tx: watch::Sender<Option<ProcessId>>,
    cancel: CancellationToken,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.job_tx.borrow().generation == generation
    }

    /// 开启新一代任务，之前的任务被放弃
    fn begin(&self, kind: JobKind) -> u64 {
        let mut generation = 0;
        self.job_tx.send_modify(|job| {
            generation = job.generation + 1;
            *job = Job::submitted(generation, kind);
        });
        generation
    }

    /// 仅当 generation 仍为当前代且任务未终止时修改快照
    fn apply(&self, generation: u64, f: impl FnOnce(&mut Job)) -> bool {
        self.job_tx.send_if_modified(|job| {
            if job.generation != generation || job.status.is_terminal() {
                return false;
            }
            f(job);
            true
        })
    }

    fn publish_process(&self, pid: ProcessId) {
        let changed = self.process_tx.send_if_modified(|current| {
            if *current == Some(pid) {
                return false;
            }
            *current = Some(pid);
            true
        });
        if changed {
            tracing::info!("Active process is now {}", pid);
        }
    }

    fn fail(&self, generation: u64, err: &JobError) -> bool {
        self.apply(generation, |job| {
            job.error = Some(err.to_string());
            job.finish(JobStatus::Failed);
        })
    }

    fn resolve(&self, generation: u64, pid: ProcessId) -> bool {
        self.apply(generation, |job| {
            job.result_process_id = Some(pid);
            job.finish(JobStatus::Completed);
            // 在通道锁内发布，保证与代数检查原子
            self.publish_process(pid);
        })
    }

    /// 写入一次轮询响应；返回是否继续轮询
    fn apply_poll(
        &self,
        generation: u64,
        job_id: &JobId,
        response: Result<PollStatus, BackendError>,
    ) -> bool {
        let mut keep_polling = false;
        let applied = self.apply(generation, |job| {
            job.poll_count += 1;
            match &response {
                Ok(PollStatus::Processing) => {
                    job.status = JobStatus::Processing;
                    keep_polling = true;
                }
                Ok(PollStatus::Completed(pid)) => {
                    job.result_process_id = Some(*pid);
                    job.finish(JobStatus::Completed);
                    self.publish_process(*pid);
                }
                Ok(PollStatus::Failed) => {
                    job.error = Some(JobError::Failed(job_id.clone()).to_string());
                    job.finish(JobStatus::Failed);
                }
                Ok(PollStatus::NotFound) => {
                    job.error = Some(JobError::NotFound(job_id.clone()).to_string());
                    job.finish(JobStatus::Failed);
                }
                Err(e) => {
                    job.error = Some(JobError::Poll(e.clone()).to_string());
                    job.finish(JobStatus::Failed);
                }
            }
        });

        if !applied {
            tracing::debug!(
                "Discarding stale poll response for job {} (generation {})",
                job_id,
                generation
            );
            return false;
        }
        match &response {
            Ok(PollStatus::Processing) => tracing::debug!("Job {} still processing", job_id),
            Ok(PollStatus::Completed(pid)) => {
                tracing::info!("Job {} completed with process {}", job_id, pid)
            }
            Ok(other) => tracing::warn!("Job {} ended as {:?}", job_id, other),
            Err(e) => tracing::warn!("Polling job {} failed: {}", job_id, e),
        }
        keep_polling
    }
}

/// 单槽位任务编排器：同一时刻只跟踪一个任务，新提交放弃旧任务
pub struct JobOrchestrator {
    shared: Arc<Shared>,
}

impl JobOrchestrator {
    pub fn new(backend: Arc<dyn AllocationBackend>, poll_interval: Duration) -> Self {
        let (job_tx, _) = watch::channel(Job::default());
        let (process_tx, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                backend,
                poll_interval,
                job_tx,
                process_tx,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn subscribe_job(&self) -> watch::Receiver<Job> {
        self.shared.job_tx.subscribe()
    }

    pub fn subscribe_process(&self) -> watch::Receiver<Option<ProcessId>> {
        self.shared.process_tx.subscribe()
    }

    pub fn job(&self) -> Job {
        self.shared.job_tx.borrow().clone()
    }

    pub fn active_process(&self) -> Option<ProcessId> {
        *self.shared.process_tx.borrow()
    }

    /// 直接把某个已有 ProcessId 设为当前（启动时加载最近一次结果等）
    pub fn activate(&self, pid: ProcessId) {
        self.shared.publish_process(pid);
    }

    /// 提交分配任务并开始轮询
    pub async fn submit(&self, option: AllocationOption) -> Result<JobTicket, JobError> {
        let generation = self.shared.begin(JobKind::Allocation { option });
        tracing::info!("Submitting allocation job ({:?}, generation {})", option, generation);

        match self.shared.backend.submit_job(option).await {
            Ok(job_id) => {
                self.track(generation, job_id.clone());
                Ok(JobTicket {
                    generation,
                    job_id: Some(job_id),
                    process_id: None,
                })
            }
            Err(e) => {
                let err = JobError::Submission(e);
                tracing::warn!("{}", err);
                self.shared.fail(generation, &err);
                Err(err)
            }
        }
    }

    /// 对话触发的重分配子任务：后端同步返回 ProcessId，submitted 直接进入 completed
    pub async fn reallocate(&self, target: EntityId, class: ClassId) -> Result<JobTicket, JobError> {
        let generation = self.shared.begin(JobKind::Reallocation { target, class });
        tracing::info!(
            "Submitting reallocation of participant {} to class {} (generation {})",
            target,
            class,
            generation
        );

        match self.shared.backend.submit_reallocation(target, class).await {
            Ok(pid) => {
                if !self.shared.resolve(generation, pid) {
                    tracing::debug!("Reallocation result {} arrived for a superseded job", pid);
                }
                Ok(JobTicket {
                    generation,
                    job_id: None,
                    process_id: Some(pid),
                })
            }
            Err(e) => {
                let err = JobError::Submission(e);
                tracing::warn!("{}", err);
                self.shared.fail(generation, &err);
                Err(err)
            }
        }
    }

    /// 重新挂接到一个已知任务 ID 并继续轮询
    pub fn resume(&self, job_id: JobId) -> JobTicket {
        let generation = self.shared.begin(JobKind::Resumed);
        tracing::info!("Resuming job {} (generation {})", job_id, generation);
        self.track(generation, job_id.clone());
        JobTicket {
            generation,
            job_id: Some(job_id),
            process_id: None,
        }
    }

    /// 「应用变更」：一次性请求，以当前 ProcessId 为键，不产生新的 ProcessId
    pub async fn apply_changes(&self) -> Result<ApplyStatus, JobError> {
        let process_id = self.active_process().ok_or(JobError::NoActiveProcess)?;
        let status = self
            .shared
            .backend
            .apply_reallocation(process_id)
            .await
            .map_err(|source| JobError::Apply { process_id, source })?;
        tracing::info!("Applied process {}: {:?}", process_id, status);
        Ok(status)
    }

    /// 等待某一代任务终止；若它先被更新的提交取代则返回 None
    pub async fn wait_for_terminal(&self, generation: u64) -> Option<Job> {
        let mut rx = self.shared.job_tx.subscribe();
        let job = rx
            .wait_for(|job| job.generation != generation || job.status.is_terminal())
            .await
            .ok()
            .map(|r| (*r).clone())?;
        (job.generation == generation).then_some(job)
    }

    /// 视图卸载：停止所有轮询，丢弃在途响应
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
    }

    fn track(&self, generation: u64, job_id: JobId) {
        let accepted = self.shared.apply(generation, |job| {
            job.job_id = Some(job_id.clone());
            job.status = JobStatus::Processing;
        });
        if !accepted {
            tracing::debug!("Job {} superseded before polling started", job_id);
            return;
        }
        let shared = Arc::clone(&self.shared);
        tokio::spawn(poll_loop(shared, generation, job_id));
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

/// 单任务轮询循环：响应按发出顺序逐个写入（上一次返回后才发下一次）
async fn poll_loop(shared: Arc<Shared>, generation: u64, job_id: JobId) {
    loop {
        if !shared.is_current(generation) {
            break;
        }
        let response = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            r = shared.backend.poll_job(&job_id) => r,
        };
        if shared.cancel.is_cancelled() || !shared.apply_poll(generation, &job_id, response) {
            break;
        }
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.poll_interval) => {}
        }
    }
    tracing::debug!("Stopped polling job {} (generation {})", job_id, generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PollStep, ScriptedBackend};

    const TICK: Duration = Duration::from_millis(5);

    fn setup() -> (Arc<ScriptedBackend>, JobOrchestrator) {
        let backend = Arc::new(ScriptedBackend::new());
        let orchestrator = JobOrchestrator::new(backend.clone(), TICK);
        (backend, orchestrator)
    }

    #[tokio::test]
    async fn test_submit_polls_until_completed() {
        let (backend, orchestrator) = setup();
        backend.script_next_job(vec![
            PollStep::ready(PollStatus::Processing),
            PollStep::ready(PollStatus::Processing),
            PollStep::ready(PollStatus::Completed(ProcessId(7))),
        ]);

        let ticket = orchestrator.submit(AllocationOption::Academic).await.unwrap();
        let job = orchestrator.wait_for_terminal(ticket.generation).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result_process_id, Some(ProcessId(7)));
        assert_eq!(job.poll_count, 3);
        assert!(job.finished_at.is_some());
        assert_eq!(orchestrator.active_process(), Some(ProcessId(7)));
        assert_eq!(backend.submitted(), vec![AllocationOption::Academic]);

        // 终止后不再轮询
        tokio::time::sleep(TICK * 6).await;
        assert_eq!(backend.poll_count(ticket.job_id.as_ref().unwrap()), 3);
    }

    #[tokio::test]
    async fn test_failed_job_keeps_previous_process() {
        let (backend, orchestrator) = setup();
        orchestrator.activate(ProcessId(3));
        backend.script_next_job(vec![
            PollStep::ready(PollStatus::Processing),
            PollStep::ready(PollStatus::Failed),
        ]);

        let ticket = orchestrator.submit(AllocationOption::Balanced).await.unwrap();
        let job = orchestrator.wait_for_terminal(ticket.generation).await.unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("failed on backend"));
        assert_eq!(orchestrator.active_process(), Some(ProcessId(3)));

        tokio::time::sleep(TICK * 6).await;
        assert_eq!(backend.poll_count(ticket.job_id.as_ref().unwrap()), 2);
    }

    #[tokio::test]
    async fn test_submission_error_is_not_retried() {
        let (backend, orchestrator) = setup();
        backend.fail_next_submit(BackendError::Transport("connection refused".into()));

        let err = orchestrator.submit(AllocationOption::Social).await.unwrap_err();
        assert!(matches!(err, JobError::Submission(_)));
        assert_eq!(orchestrator.job().status, JobStatus::Failed);
        assert!(backend.submitted().is_empty());
        assert_eq!(orchestrator.active_process(), None);
    }

    #[tokio::test]
    async fn test_poll_error_marks_job_failed() {
        let (backend, orchestrator) = setup();
        backend.script_next_job(vec![PollStep::error(BackendError::Status {
            status: 502,
            body: "bad gateway".into(),
        })]);

        let ticket = orchestrator.submit(AllocationOption::Balanced).await.unwrap();
        let job = orchestrator.wait_for_terminal(ticket.generation).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("502"));
    }

    #[tokio::test]
    async fn test_stale_poll_response_is_ignored() {
        let (backend, orchestrator) = setup();
        // 第一个任务的轮询响应迟迟才回来，且声称已完成
        backend.script_next_job(vec![PollStep::delayed(
            PollStatus::Completed(ProcessId(1)),
            Duration::from_millis(80),
        )]);
        backend.script_next_job(vec![
            PollStep::ready(PollStatus::Processing),
            PollStep::ready(PollStatus::Completed(ProcessId(2))),
        ]);

        let mut process_rx = orchestrator.subscribe_process();
        let first = orchestrator.submit(AllocationOption::Balanced).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = orchestrator.submit(AllocationOption::Mental).await.unwrap();

        assert!(orchestrator.wait_for_terminal(first.generation).await.is_none());
        let job = orchestrator.wait_for_terminal(second.generation).await.unwrap();
        assert_eq!(job.result_process_id, Some(ProcessId(2)));

        // 等旧响应落地
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(orchestrator.active_process(), Some(ProcessId(2)));
        let job = orchestrator.job();
        assert_eq!(job.generation, second.generation);
        assert_eq!(job.result_process_id, Some(ProcessId(2)));
        assert_eq!(backend.poll_count(first.job_id.as_ref().unwrap()), 1);

        // ProcessId 只被发布过一次
        assert!(process_rx.has_changed().unwrap());
        assert_eq!(*process_rx.borrow_and_update(), Some(ProcessId(2)));
        assert!(!process_rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_reallocation_supersedes_active_process() {
        let (backend, orchestrator) = setup();
        orchestrator.activate(ProcessId(7));

        let ticket = orchestrator.reallocate(EntityId(32394), ClassId(2)).await.unwrap();
        assert_eq!(ticket.process_id, Some(ProcessId(100)));

        let job = orchestrator.job();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(
            job.kind,
            Some(JobKind::Reallocation {
                target: EntityId(32394),
                class: ClassId(2)
            })
        );
        assert_eq!(orchestrator.active_process(), Some(ProcessId(100)));
        assert_eq!(backend.reallocations(), vec![(EntityId(32394), ClassId(2))]);
    }

    #[tokio::test]
    async fn test_apply_changes_uses_active_process() {
        let (backend, orchestrator) = setup();
        assert_eq!(
            orchestrator.apply_changes().await.unwrap_err(),
            JobError::NoActiveProcess
        );

        orchestrator.activate(ProcessId(5));
        let status = orchestrator.apply_changes().await.unwrap();
        assert_eq!(status, ApplyStatus::Success { process_id: ProcessId(5) });
        assert_eq!(backend.applied(), vec![ProcessId(5)]);
        // 应用变更不产生新的 ProcessId
        assert_eq!(orchestrator.active_process(), Some(ProcessId(5)));
    }

    #[tokio::test]
    async fn test_resume_unknown_job_fails() {
        let (_backend, orchestrator) = setup();
        let ticket = orchestrator.resume(JobId::from("ghost"));
        let job = orchestrator.wait_for_terminal(ticket.generation).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_polling() {
        let (backend, orchestrator) = setup();
        backend.script_next_job(vec![PollStep::ready(PollStatus::Processing)]);

        let ticket = orchestrator.submit(AllocationOption::Balanced).await.unwrap();
        tokio::time::sleep(TICK * 4).await;
        orchestrator.shutdown();
        tokio::time::sleep(TICK * 2).await;
        let polls = backend.poll_count(ticket.job_id.as_ref().unwrap());
        assert!(polls >= 1);

        tokio::time::sleep(TICK * 8).await;
        assert_eq!(backend.poll_count(ticket.job_id.as_ref().unwrap()), polls);
        assert_eq!(orchestrator.job().status, JobStatus::Processing);
    }
}
