//! 两次分配结果对比：并发组合，两侧失败互不影响

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::core::composer::ResultComposer;
use crate::core::error::CompositionError;
use crate::model::{AggregateMetrics, AllocationResult, ProcessId};

/// 每个指标 b − a；只在一侧出现的指标按 0 计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricsDelta(pub BTreeMap<String, f64>);

impl MetricsDelta {
    pub fn between(a: &AggregateMetrics, b: &AggregateMetrics) -> Self {
        let mut delta = BTreeMap::new();
        for name in a.0.keys().chain(b.0.keys()) {
            let before = a.get(name).unwrap_or(0.0);
            let after = b.get(name).unwrap_or(0.0);
            delta.insert(name.clone(), after - before);
        }
        Self(delta)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub left_id: ProcessId,
    pub right_id: ProcessId,
    pub left: Result<Arc<AllocationResult>, CompositionError>,
    pub right: Result<Arc<AllocationResult>, CompositionError>,
    /// 两侧都成功时才有
    pub delta: Option<MetricsDelta>,
}

/// 默认对比对：(当前, 当前 − 1)
pub fn default_pair(active: ProcessId) -> Option<(ProcessId, ProcessId)> {
    (active.0 > 1).then(|| (active, ProcessId(active.0 - 1)))
}

pub async fn compare(composer: &ResultComposer, a: ProcessId, b: ProcessId) -> Comparison {
    let (left, right) = tokio::join!(composer.compose(a), composer.compose(b));
    let delta = match (&left, &right) {
        (Ok(l), Ok(r)) => Some(MetricsDelta::between(&l.aggregate_metrics, &r.aggregate_metrics)),
        _ => None,
    };
    if let Err(e) = &right {
        tracing::warn!("Comparison side {} unavailable: {}", b, e);
    }
    Comparison {
        left_id: a,
        right_id: b,
        left,
        right,
        delta,
    }
}
