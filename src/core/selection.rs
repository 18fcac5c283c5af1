//! 选中态协调器：图、表格、详情面板共享同一个焦点 id
//!
//! 焦点（focus）持久，悬停（hover）是独立的瞬时信号。作用域绑定到某个 ProcessId：
//! 活动 ProcessId 变化时先 `reset_scope`（清空焦点与悬停），结果组合完成后再 `bind_entities`。

use std::collections::HashSet;
use std::sync::RwLock;

use tokio::sync::watch;

use crate::core::error::SelectionError;
use crate::model::{EntityId, ProcessId};

/// 渲染层回调的窄接口，核心不依赖任何渲染库的事件类型
pub trait GraphEventSink: Send + Sync {
    fn on_node_click(&self, id: EntityId);
    fn on_node_hover(&self, id: Option<EntityId>);
    fn on_background_click(&self);
}

#[derive(Debug, Default)]
enum Scope {
    #[default]
    Unbound,
    Loading(ProcessId),
    Bound {
        process_id: ProcessId,
        ids: HashSet<EntityId>,
    },
}

pub struct SelectionCoordinator {
    focus_tx: watch::Sender<Option<EntityId>>,
    hover_tx: watch::Sender<Option<EntityId>>,
    scope: RwLock<Scope>,
}

impl Default for SelectionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionCoordinator {
    pub fn new() -> Self {
        let (focus_tx, _) = watch::channel(None);
        let (hover_tx, _) = watch::channel(None);
        Self {
            focus_tx,
            hover_tx,
            scope: RwLock::new(Scope::Unbound),
        }
    }

    pub fn current(&self) -> Option<EntityId> {
        *self.focus_tx.borrow()
    }

    pub fn hovered(&self) -> Option<EntityId> {
        *self.hover_tx.borrow()
    }

    pub fn subscribe_focus(&self) -> watch::Receiver<Option<EntityId>> {
        self.focus_tx.subscribe()
    }

    pub fn subscribe_hover(&self) -> watch::Receiver<Option<EntityId>> {
        self.hover_tx.subscribe()
    }

    /// 当前作用域的 ProcessId（加载中或已绑定）
    pub fn scope_process(&self) -> Option<ProcessId> {
        match &*self.read_scope() {
            Scope::Unbound => None,
            Scope::Loading(pid) => Some(*pid),
            Scope::Bound { process_id, .. } => Some(*process_id),
        }
    }

    /// 选中实体；None 总是成功（清空焦点）
    pub fn select(&self, id: Option<EntityId>) -> Result<(), SelectionError> {
        // 读锁持有到写入焦点之后，reset_scope 无法插在检查与写入之间
        let scope = self.read_scope();
        if let Some(id) = id {
            match &*scope {
                Scope::Bound { process_id, ids } if !ids.contains(&id) => {
                    return Err(SelectionError::UnknownEntity {
                        id,
                        process_id: *process_id,
                    });
                }
                Scope::Bound { .. } => {}
                _ => return Err(SelectionError::NoActiveResult),
            }
        }
        self.focus_tx.send_if_modified(|focus| {
            if *focus == id {
                return false;
            }
            *focus = id;
            true
        });
        drop(scope);
        Ok(())
    }

    pub fn hover(&self, id: Option<EntityId>) {
        self.hover_tx.send_if_modified(|hover| {
            if *hover == id {
                return false;
            }
            *hover = id;
            true
        });
    }

    /// 活动 ProcessId 变化：先清空焦点与悬停，再进入加载态
    pub fn reset_scope(&self, process_id: ProcessId) {
        let mut scope = self.write_scope();
        self.focus_tx.send_if_modified(|focus| focus.take().is_some());
        self.hover_tx.send_if_modified(|hover| hover.take().is_some());
        *scope = Scope::Loading(process_id);
        tracing::debug!("Selection scope reset for process {}", process_id);
    }

    /// 结果组合完成后激活作用域；process_id 已不是当前作用域时忽略
    pub fn bind_entities(
        &self,
        process_id: ProcessId,
        ids: impl IntoIterator<Item = EntityId>,
    ) -> bool {
        let mut scope = self.write_scope();
        let current = match &*scope {
            Scope::Loading(pid) => *pid,
            Scope::Bound { process_id, .. } => *process_id,
            Scope::Unbound => return false,
        };
        if current != process_id {
            tracing::debug!(
                "Ignoring entity binding for stale process {} (scope is {})",
                process_id,
                current
            );
            return false;
        }
        *scope = Scope::Bound {
            process_id,
            ids: ids.into_iter().collect(),
        };
        true
    }

    fn read_scope(&self) -> std::sync::RwLockReadGuard<'_, Scope> {
        self.scope.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_scope(&self) -> std::sync::RwLockWriteGuard<'_, Scope> {
        self.scope.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl GraphEventSink for SelectionCoordinator {
    fn on_node_click(&self, id: EntityId) {
        if let Err(e) = self.select(Some(id)) {
            tracing::warn!("Ignoring node click: {}", e);
        }
    }

    fn on_node_hover(&self, id: Option<EntityId>) {
        self.hover(id);
    }

    fn on_background_click(&self) {
        let _ = self.select(None);
    }
}
