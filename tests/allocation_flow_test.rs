//! 分配流程集成测试：提交 -> 轮询 -> 完成 -> 组合 -> 构图 -> 选中

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use classforge::backend::{Dataset, InMemoryDataSource, PollStatus, PollStep, ScriptedBackend};
    use classforge::chat::{ChatAssistant, RuleBasedParser};
    use classforge::core::{JobStatus, ResultState};
    use classforge::graph::CurveType;
    use classforge::model::{
        AllocationOption, ClassId, Entity, EntityId, ProcessId, RelationKind, RelationshipTuple,
    };
    use classforge::{Dashboard, Settings};

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.jobs.poll_interval_ms = 5;
        settings
    }

    fn process_seven() -> Dataset {
        Dataset {
            metrics: [("academic", 0.8), ("social", 0.6)].into_iter().collect(),
            entities: vec![
                Entity::from_names(1, "Alice", "Nguyen").with_class(ClassId(1)),
                Entity::from_names(2, "Bob", "Smith").with_class(ClassId(1)),
                Entity::from_names(3, "Chloe", "Tran").with_class(ClassId(2)),
            ],
            relationships: vec![
                RelationshipTuple::new(1, 2, RelationKind::HasFriend),
                RelationshipTuple::new(2, 1, RelationKind::GetAdvice),
                RelationshipTuple::new(1, 2, RelationKind::HasFriend),
                RelationshipTuple::new(2, 3, RelationKind::HasInfluence),
                RelationshipTuple::new(3, 2, RelationKind::Disrespect),
            ],
        }
    }

    fn setup() -> (Arc<ScriptedBackend>, Arc<InMemoryDataSource>, Dashboard) {
        let backend = Arc::new(ScriptedBackend::new());
        backend.script_next_job(vec![
            PollStep::ready(PollStatus::Processing),
            PollStep::ready(PollStatus::Processing),
            PollStep::ready(PollStatus::Completed(ProcessId(7))),
        ]);
        let source = Arc::new(InMemoryDataSource::new());
        source.insert(ProcessId(7), process_seven());
        let dashboard = Dashboard::mount(&settings(), backend.clone(), source.clone());
        (backend, source, dashboard)
    }

    #[tokio::test]
    async fn test_end_to_end_allocation() {
        let (backend, source, dashboard) = setup();

        let ticket = dashboard.submit(AllocationOption::Academic).await.unwrap();
        let job = dashboard.wait_for_job(ticket.generation).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.poll_count, 3);
        assert_eq!(job.result_process_id, Some(ProcessId(7)));
        assert_eq!(backend.poll_count(ticket.job_id.as_ref().unwrap()), 3);

        let state = dashboard.wait_for_result(ProcessId(7)).await;
        let result = state.result().unwrap();
        assert_eq!(result.aggregate_metrics.get("academic"), Some(0.8));
        assert_eq!(result.aggregate_metrics.get("social"), Some(0.6));
        assert_eq!(result.entities.len(), 3);

        let graph = dashboard.graph().unwrap();
        assert_eq!(graph.edges.len(), 5);
        assert_eq!(graph.nodes.len(), 3);

        // {1,2} 三条平行边：-c, 0, +c
        let pair: Vec<_> = graph.edges[..3].iter().collect();
        assert_eq!(pair[0].curve_type, CurveType::Curved);
        assert_eq!(pair[1].curve_type, CurveType::Straight);
        assert_eq!(pair[1].curvature, 0.0);
        assert!(pair[0].curvature < 0.0);
        assert!((pair[0].curvature + pair[2].curvature).abs() < 1e-12);

        // {2,3} 两条平行边：等大反号
        let (a, b) = (&graph.edges[3], &graph.edges[4]);
        assert_eq!(a.curve_type, CurveType::Curved);
        assert!((a.curvature + b.curvature).abs() < 1e-12);
        assert!(a.curvature != 0.0);

        assert_eq!(source.metrics_calls(), 1);
        assert_eq!(source.entities_calls(), 1);
        assert_eq!(source.relationships_calls(), 1);
        dashboard.unmount();
    }

    #[tokio::test]
    async fn test_focus_resets_before_loading() {
        let (_backend, source, dashboard) = setup();
        dashboard.submit(AllocationOption::Balanced).await.unwrap();
        dashboard.wait_for_result(ProcessId(7)).await;
        dashboard.select(Some(EntityId(2))).unwrap();

        let mut reallocated = process_seven();
        reallocated.relationships.truncate(1);
        source.insert(ProcessId(100), reallocated);

        // 每次看到 Loading 时焦点必须已经清空
        let mut result_rx = dashboard.subscribe_result();
        let focus_rx = dashboard.subscribe_focus();
        let observer = tokio::spawn(async move {
            loop {
                if result_rx.changed().await.is_err() {
                    return false;
                }
                let state = result_rx.borrow_and_update().clone();
                match state {
                    ResultState::Loading(_) => {
                        if focus_rx.borrow().is_some() {
                            return false;
                        }
                    }
                    ResultState::Ready(r) if r.process_id == ProcessId(100) => return true,
                    _ => {}
                }
            }
        });

        dashboard.reallocate(EntityId(3), ClassId(1)).await.unwrap();
        let ok = tokio::time::timeout(Duration::from_secs(2), observer)
            .await
            .unwrap()
            .unwrap();
        assert!(ok);
        assert_eq!(dashboard.focus(), None);
        assert_eq!(dashboard.graph().unwrap().edges.len(), 1);
    }

    #[tokio::test]
    async fn test_chat_reallocation_then_apply() {
        let (backend, source, dashboard) = setup();
        dashboard.submit(AllocationOption::Balanced).await.unwrap();
        dashboard.wait_for_result(ProcessId(7)).await;
        source.insert(ProcessId(100), process_seven());

        let mut assistant = ChatAssistant::new(Arc::new(RuleBasedParser::new().unwrap()));
        let reply = assistant
            .send(&dashboard, "reallocate student 3 to class 1")
            .await
            .unwrap();
        assert!(reply.reallocation.is_some());
        dashboard.wait_for_result(ProcessId(100)).await;

        dashboard.apply_changes().await.unwrap();
        assert_eq!(backend.applied(), vec![ProcessId(100)]);
        assert_eq!(dashboard.active_process(), Some(ProcessId(100)));

        let comparison = dashboard.compare_with_previous().await.unwrap();
        assert_eq!(comparison.left_id, ProcessId(100));
        assert_eq!(comparison.right_id, ProcessId(99));
        assert!(comparison.left.is_ok());
        assert!(comparison.right.is_err());
        // 对比面板的失败不影响主面板
        assert!(dashboard.result().result().is_some());
    }
}
