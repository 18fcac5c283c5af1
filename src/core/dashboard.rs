//! Dashboard：一个视图树的挂载点，把编排器、选中态、组合器串起来并对外暴露响应式值
//!
//! 活动 ProcessId 每次变化的固定顺序：
//! 选中态重置 -> `Loading(pid)` -> compose -> 绑定实体 -> 发布图 -> `Ready`。
//! 被取代的 ProcessId 的结果在写入前被丢弃（对 `Loading(pid)` 做比较-写入）。

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backend::{AllocationBackend, ApplyStatus, GraphDataSource};
use crate::config::Settings;
use crate::core::compare::{self, Comparison};
use crate::core::composer::ResultComposer;
use crate::core::error::{BackendError, CompositionError, GraphViewError, JobError, SelectionError};
use crate::core::orchestrator::{JobOrchestrator, JobTicket};
use crate::core::selection::{GraphEventSink, SelectionCoordinator};
use crate::core::state::{Job, ResultState};
use crate::graph::{Graph, RelationshipGraphBuilder, RelationshipScope};
use crate::model::{AllocationOption, AllocationResult, ClassId, EntityId, ProcessId};

struct ViewContext {
    selection: Arc<SelectionCoordinator>,
    composer: ResultComposer,
    result_tx: watch::Sender<ResultState>,
    graph_tx: watch::Sender<Option<Arc<Graph>>>,
}

impl ViewContext {
    fn begin_load(&self, process_id: ProcessId) {
        self.selection.reset_scope(process_id);
        self.graph_tx.send_replace(None);
        self.result_tx.send_replace(ResultState::Loading(process_id));
        tracing::info!("Loading process {}", process_id);
    }

    async fn finish_load(&self, process_id: ProcessId) {
        let outcome = async {
            let result = self.composer.compose(process_id).await?;
            let graph = self
                .composer
                .graph(process_id, RelationshipScope::All, &BTreeSet::new())
                .await?;
            Ok::<_, GraphViewError>((result, graph))
        }
        .await;

        match outcome {
            Ok((result, graph)) => {
                if !self
                    .selection
                    .bind_entities(process_id, result.entities.iter().map(|e| e.id))
                {
                    tracing::debug!("Dropping result for superseded process {}", process_id);
                    return;
                }
                let graph = Arc::new(graph);
                let published = self.result_tx.send_if_modified(|state| {
                    if !matches!(state, ResultState::Loading(pid) if *pid == process_id) {
                        return false;
                    }
                    self.graph_tx.send_replace(Some(Arc::clone(&graph)));
                    *state = ResultState::Ready(Arc::clone(&result));
                    true
                });
                if published {
                    tracing::info!(
                        "Process {} ready ({} nodes, {} edges)",
                        process_id,
                        graph.nodes.len(),
                        graph.edges.len()
                    );
                } else {
                    tracing::debug!("Dropping result for superseded process {}", process_id);
                }
            }
            Err(e) => {
                let message = e.to_string();
                let published = self.result_tx.send_if_modified(|state| {
                    if !matches!(state, ResultState::Loading(pid) if *pid == process_id) {
                        return false;
                    }
                    *state = ResultState::Failed {
                        process_id,
                        message: message.clone(),
                    };
                    true
                });
                if published {
                    tracing::warn!("Loading process {} failed: {}", process_id, message);
                }
            }
        }
    }

    /// 焦点变化：用缓存的元组以新焦点集合重新构图
    async fn rebuild_for_focus(&self, focus: Option<EntityId>) {
        let process_id = match &*self.result_tx.borrow() {
            ResultState::Ready(result) => result.process_id,
            _ => return,
        };
        let focus_ids: BTreeSet<EntityId> = focus.into_iter().collect();
        match self
            .composer
            .graph(process_id, RelationshipScope::All, &focus_ids)
            .await
        {
            Ok(graph) => {
                let graph = Arc::new(graph);
                self.result_tx.send_if_modified(|state| {
                    if matches!(state, ResultState::Ready(r) if r.process_id == process_id) {
                        self.graph_tx.send_replace(Some(Arc::clone(&graph)));
                    }
                    false
                });
            }
            Err(e) => tracing::warn!("Rebuilding graph for focus {:?} failed: {}", focus, e),
        }
    }

    fn current_process(&self) -> Option<ProcessId> {
        self.result_tx.borrow().process_id()
    }
}

pub struct Dashboard {
    view: Arc<ViewContext>,
    orchestrator: JobOrchestrator,
    backend: Arc<dyn AllocationBackend>,
    default_option: AllocationOption,
    cancel: CancellationToken,
}

impl Dashboard {
    /// 挂载视图树：创建各组件并启动监听任务（需在 tokio 运行时内调用）
    pub fn mount(
        settings: &Settings,
        backend: Arc<dyn AllocationBackend>,
        source: Arc<dyn GraphDataSource>,
    ) -> Self {
        let orchestrator =
            JobOrchestrator::new(Arc::clone(&backend), settings.jobs.poll_interval());
        let selection = Arc::new(SelectionCoordinator::new());
        let composer = ResultComposer::new(
            source,
            RelationshipGraphBuilder::new(settings.graph.style()),
        );
        let (result_tx, _) = watch::channel(ResultState::Empty);
        let (graph_tx, _) = watch::channel(None);
        let view = Arc::new(ViewContext {
            selection,
            composer,
            result_tx,
            graph_tx,
        });

        let cancel = CancellationToken::new();
        tokio::spawn(watch_view(
            Arc::clone(&view),
            orchestrator.subscribe_process(),
            view.selection.subscribe_focus(),
            cancel.clone(),
        ));
        tracing::info!("Dashboard mounted");

        Self {
            view,
            orchestrator,
            backend,
            default_option: settings.jobs.default_option,
            cancel,
        }
    }

    /// 卸载：停止轮询与监听，在途响应全部丢弃
    pub fn unmount(&self) {
        self.orchestrator.shutdown();
        self.cancel.cancel();
        tracing::info!("Dashboard unmounted");
    }

    pub fn default_option(&self) -> AllocationOption {
        self.default_option
    }

    pub fn subscribe_graph(&self) -> watch::Receiver<Option<Arc<Graph>>> {
        self.view.graph_tx.subscribe()
    }

    pub fn subscribe_result(&self) -> watch::Receiver<ResultState> {
        self.view.result_tx.subscribe()
    }

    pub fn subscribe_focus(&self) -> watch::Receiver<Option<EntityId>> {
        self.view.selection.subscribe_focus()
    }

    pub fn subscribe_hover(&self) -> watch::Receiver<Option<EntityId>> {
        self.view.selection.subscribe_hover()
    }

    pub fn subscribe_job(&self) -> watch::Receiver<Job> {
        self.orchestrator.subscribe_job()
    }

    pub fn result(&self) -> ResultState {
        self.view.result_tx.borrow().clone()
    }

    pub fn graph(&self) -> Option<Arc<Graph>> {
        self.view.graph_tx.borrow().clone()
    }

    pub fn focus(&self) -> Option<EntityId> {
        self.view.selection.current()
    }

    pub fn job(&self) -> Job {
        self.orchestrator.job()
    }

    pub fn active_process(&self) -> Option<ProcessId> {
        self.orchestrator.active_process()
    }

    /// 交给渲染层的事件回调
    pub fn event_sink(&self) -> Arc<dyn GraphEventSink> {
        self.view.selection.clone()
    }

    pub async fn submit(&self, option: AllocationOption) -> Result<JobTicket, JobError> {
        self.orchestrator.submit(option).await
    }

    pub async fn reallocate(&self, target: EntityId, class: ClassId) -> Result<JobTicket, JobError> {
        self.orchestrator.reallocate(target, class).await
    }

    pub async fn apply_changes(&self) -> Result<ApplyStatus, JobError> {
        self.orchestrator.apply_changes().await
    }

    pub async fn wait_for_job(&self, generation: u64) -> Option<Job> {
        self.orchestrator.wait_for_terminal(generation).await
    }

    pub fn select(&self, id: Option<EntityId>) -> Result<(), SelectionError> {
        self.view.selection.select(id)
    }

    /// 把后端最近一次的 ProcessId 设为初始活动结果
    pub async fn bootstrap(&self) -> Result<Option<ProcessId>, BackendError> {
        let latest = self.backend.latest_process_id().await?;
        match latest {
            Some(pid) => {
                tracing::info!("Bootstrapping with latest process {}", pid);
                self.orchestrator.activate(pid);
            }
            None => tracing::info!("Backend has no previous process"),
        }
        Ok(latest)
    }

    /// 丢弃当前 ProcessId 的缓存并重新加载
    pub async fn refresh(&self) -> ResultState {
        let Some(pid) = self.active_process() else {
            return ResultState::Empty;
        };
        self.view.composer.invalidate(pid);
        self.view.begin_load(pid);
        self.view.finish_load(pid).await;
        self.result()
    }

    /// 等待某个 ProcessId 加载结束（Ready 或 Failed）；视图已切到别的 ProcessId 时立即返回当前状态
    pub async fn wait_for_result(&self, process_id: ProcessId) -> ResultState {
        let mut rx = self.view.result_tx.subscribe();
        let settled = rx
            .wait_for(|state| match state {
                ResultState::Ready(r) => r.process_id == process_id,
                ResultState::Failed { process_id: pid, .. } => *pid == process_id,
                _ => false,
            })
            .await
            .map(|state| (*state).clone());
        settled.unwrap_or_else(|_| self.result())
    }

    /// 详情面板：当前焦点参与者的关系网
    pub async fn focus_network(&self) -> Result<Option<Graph>, GraphViewError> {
        let (Some(focus), Some(pid)) = (self.focus(), self.view.current_process()) else {
            return Ok(None);
        };
        let graph = self
            .view
            .composer
            .graph(pid, RelationshipScope::Participant(focus), &BTreeSet::new())
            .await?;
        Ok(Some(graph))
    }

    /// 任意作用域的子图（班级内部、某种关系类型）
    pub async fn scoped_graph(&self, scope: RelationshipScope) -> Result<Option<Graph>, GraphViewError> {
        let Some(pid) = self.view.current_process() else {
            return Ok(None);
        };
        let focus: BTreeSet<EntityId> = self.focus().into_iter().collect();
        Ok(Some(self.view.composer.graph(pid, scope, &focus).await?))
    }

    pub async fn compare(&self, a: ProcessId, b: ProcessId) -> Comparison {
        compare::compare(&self.view.composer, a, b).await
    }

    /// 与上一个 ProcessId 对比
    pub async fn compare_with_previous(&self) -> Option<Comparison> {
        let (a, b) = compare::default_pair(self.active_process()?)?;
        Some(self.compare(a, b).await)
    }

    pub async fn compose(
        &self,
        process_id: ProcessId,
    ) -> Result<Arc<AllocationResult>, CompositionError> {
        self.view.composer.compose(process_id).await
    }

    /// 通用聊天回复（不涉及重分配时）
    pub async fn chat_reply(&self, message: &str) -> Result<String, BackendError> {
        self.backend.chat(message).await
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn watch_view(
    view: Arc<ViewContext>,
    mut process_rx: watch::Receiver<Option<ProcessId>>,
    mut focus_rx: watch::Receiver<Option<EntityId>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = process_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let pid = *process_rx.borrow_and_update();
                if let Some(pid) = pid {
                    view.begin_load(pid);
                    let view = Arc::clone(&view);
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = view.finish_load(pid) => {}
                        }
                    });
                }
            }
            changed = focus_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let focus = *focus_rx.borrow_and_update();
                view.rebuild_for_focus(focus).await;
            }
        }
    }
    tracing::debug!("Dashboard watcher stopped");
}
