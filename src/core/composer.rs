//! 结果组合器：ProcessId -> AllocationResult（指标 + 参与者），按 ProcessId 缓存
//!
//! - 两个拉取并发进行，都成功才产出结果；任一失败则整体失败且不缓存
//! - 同一 ProcessId 的并发 `compose` 挂接到同一个在途 future，不重复拉取
//! - 切换 ProcessId 不淘汰旧缓存（对比视图、快速切回）
//! - 关系元组同样按 ProcessId 缓存；子图在缓存上过滤后重新构图，不重新拉取

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::backend::GraphDataSource;
use crate::core::error::{CompositionError, GraphViewError};
use crate::graph::{Graph, RelationshipGraphBuilder, RelationshipScope};
use crate::model::{AllocationResult, EntityId, ProcessId, RelationshipTuple};

type SharedFetch<T> = Shared<BoxFuture<'static, Result<Arc<T>, CompositionError>>>;

enum Entry<T> {
    InFlight { token: u64, fetch: SharedFetch<T> },
    Ready(Arc<T>),
}

type Cache<T> = Mutex<HashMap<ProcessId, Entry<T>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct ResultComposer {
    source: Arc<dyn GraphDataSource>,
    builder: RelationshipGraphBuilder,
    results: Cache<AllocationResult>,
    relationships: Cache<Vec<RelationshipTuple>>,
    next_token: AtomicU64,
}

impl ResultComposer {
    pub fn new(source: Arc<dyn GraphDataSource>, builder: RelationshipGraphBuilder) -> Self {
        Self {
            source,
            builder,
            results: Mutex::new(HashMap::new()),
            relationships: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn builder(&self) -> &RelationshipGraphBuilder {
        &self.builder
    }

    /// 组合某个 ProcessId 的结果
    pub async fn compose(&self, process_id: ProcessId) -> Result<Arc<AllocationResult>, CompositionError> {
        let source = Arc::clone(&self.source);
        self.dedup(&self.results, process_id, "result", move || {
            async move {
                let (metrics, entities) = tokio::try_join!(
                    async {
                        source.fetch_metrics(process_id).await.map_err(|source| {
                            CompositionError::Metrics { process_id, source }
                        })
                    },
                    async {
                        source.fetch_entities(process_id, None).await.map_err(|source| {
                            CompositionError::Entities { process_id, source }
                        })
                    },
                )?;
                tracing::info!(
                    "Composed process {} ({} metrics, {} entities)",
                    process_id,
                    metrics.0.len(),
                    entities.len()
                );
                Ok(Arc::new(AllocationResult {
                    process_id,
                    aggregate_metrics: metrics,
                    entities: Arc::new(entities),
                }))
            }
            .boxed()
        })
        .await
    }

    /// 某个 ProcessId 的全量关系元组
    pub async fn relationships(
        &self,
        process_id: ProcessId,
    ) -> Result<Arc<Vec<RelationshipTuple>>, CompositionError> {
        let source = Arc::clone(&self.source);
        self.dedup(&self.relationships, process_id, "relationships", move || {
            async move {
                source
                    .fetch_relationships(process_id, &RelationshipScope::All)
                    .await
                    .map(Arc::new)
                    .map_err(|source| CompositionError::Relationships { process_id, source })
            }
            .boxed()
        })
        .await
    }

    /// 构建某个作用域的图
    ///
    /// 全量元组已缓存时在缓存上过滤；否则全量作用域走缓存拉取，子作用域直接远程拉取该子集。
    /// 焦点集合 = 传入的 focus ∪ 作用域自身的焦点。
    pub async fn graph(
        &self,
        process_id: ProcessId,
        scope: RelationshipScope,
        focus: &BTreeSet<EntityId>,
    ) -> Result<Graph, GraphViewError> {
        let result = self.compose(process_id).await?;

        let cached = match lock(&self.relationships).get(&process_id) {
            Some(Entry::Ready(tuples)) => Some(Arc::clone(tuples)),
            _ => None,
        };
        let tuples: Vec<RelationshipTuple> = match (cached, scope) {
            (Some(all), scope) => {
                tracing::debug!("Building {:?} graph for process {} from cache", scope, process_id);
                scope.filter(&all, &result.entities)
            }
            (None, RelationshipScope::All) => self.relationships(process_id).await?.to_vec(),
            (None, scope) => self
                .source
                .fetch_relationships(process_id, &scope)
                .await
                .map_err(|source| CompositionError::Relationships { process_id, source })?,
        };

        let mut focus_ids = scope.focus_ids(&result.entities);
        focus_ids.extend(focus.iter().copied());
        Ok(self.builder.build(&tuples, &result.entities, &focus_ids)?)
    }

    /// 丢弃某个 ProcessId 的全部缓存（包括在途请求，其结果不会再写回）
    pub fn invalidate(&self, process_id: ProcessId) {
        lock(&self.results).remove(&process_id);
        lock(&self.relationships).remove(&process_id);
        tracing::debug!("Invalidated cache for process {}", process_id);
    }

    pub fn is_cached(&self, process_id: ProcessId) -> bool {
        matches!(lock(&self.results).get(&process_id), Some(Entry::Ready(_)))
    }

    async fn dedup<T, F>(
        &self,
        cache: &Cache<T>,
        process_id: ProcessId,
        what: &str,
        start: F,
    ) -> Result<Arc<T>, CompositionError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<Arc<T>, CompositionError>>,
    {
        let (token, fetch) = {
            let mut entries = lock(cache);
            match entries.get(&process_id) {
                Some(Entry::Ready(value)) => {
                    tracing::debug!("Cache hit for {} of process {}", what, process_id);
                    return Ok(Arc::clone(value));
                }
                Some(Entry::InFlight { token, fetch }) => {
                    tracing::debug!("Joining in-flight {} fetch for process {}", what, process_id);
                    (*token, fetch.clone())
                }
                None => {
                    let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                    let fetch = start().shared();
                    entries.insert(
                        process_id,
                        Entry::InFlight {
                            token,
                            fetch: fetch.clone(),
                        },
                    );
                    (token, fetch)
                }
            }
        };

        let outcome = fetch.await;

        let mut entries = lock(cache);
        let settles = matches!(
            entries.get(&process_id),
            Some(Entry::InFlight { token: t, .. }) if *t == token
        );
        if settles {
            match &outcome {
                Ok(value) => {
                    entries.insert(process_id, Entry::Ready(Arc::clone(value)));
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    entries.remove(&process_id);
                }
            }
        }
        outcome
    }
}
