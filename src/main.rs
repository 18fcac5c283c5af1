//! ClassForge 命令行入口
//!
//! 初始化日志与配置，挂载 Dashboard，提交一次默认分配任务，等待结果后打印指标与关系图概况。
//!
//! 用法：`classforge [config.toml] [chat message]`，给出第二个参数时把它交给对话助手。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use classforge::backend::{demo_collaborators, AllocationBackend, GraphDataSource, HttpBackend};
use classforge::chat::{ChatAssistant, HybridParser};
use classforge::core::{JobStatus, ResultState};
use classforge::model::ProcessId;
use classforge::{load_config, observability, Dashboard};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let chat_message = args.next();
    let settings = load_config(config_path).context("Failed to load configuration")?;

    let (backend, source): (Arc<dyn AllocationBackend>, Arc<dyn GraphDataSource>) =
        match &settings.backend.base_url {
            Some(url) => {
                tracing::info!("Using allocation backend at {}", url);
                let http = Arc::new(HttpBackend::new(
                    url,
                    settings.backend.request_timeout_secs,
                    settings.jobs.save_data,
                ));
                (http.clone() as Arc<dyn AllocationBackend>, http as Arc<dyn GraphDataSource>)
            }
            None => {
                tracing::warn!("backend.base_url not set, falling back to built-in demo data");
                let (backend, source) = demo_collaborators(ProcessId(7));
                (
                    Arc::new(backend) as Arc<dyn AllocationBackend>,
                    Arc::new(source) as Arc<dyn GraphDataSource>,
                )
            }
        };

    let dashboard = Dashboard::mount(&settings, backend, source);
    match dashboard.bootstrap().await {
        Ok(Some(pid)) => tracing::info!("Previous process: {}", pid),
        Ok(None) => {}
        Err(e) => tracing::warn!("Could not load latest process: {}", e),
    }

    let option = dashboard.default_option();
    let ticket = dashboard
        .submit(option)
        .await
        .context("Failed to submit allocation job")?;
    let job = dashboard
        .wait_for_job(ticket.generation)
        .await
        .context("Allocation job was superseded")?;
    if job.status != JobStatus::Completed {
        anyhow::bail!(
            "Allocation job failed: {}",
            job.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    let pid = job
        .result_process_id
        .context("Completed job carries no process id")?;

    match dashboard.wait_for_result(pid).await {
        ResultState::Ready(result) => {
            println!("Process {} ({:?}, {} polls)", pid, option, job.poll_count);
            for (name, score) in &result.aggregate_metrics.0 {
                println!("  {:<12} {:.2}", name, score);
            }
            println!("  participants {}", result.entities.len());
        }
        ResultState::Failed { message, .. } => {
            anyhow::bail!("Loading process {} failed: {}", pid, message)
        }
        other => tracing::warn!("Unexpected result state: {:?}", other),
    }

    if let Some(graph) = dashboard.graph() {
        println!(
            "Graph: {} nodes, {} edges ({} curved)",
            graph.nodes.len(),
            graph.edges.len(),
            graph.curved_edge_count()
        );
    }

    if let Some(text) = chat_message {
        let parser = HybridParser::from_settings(&settings.llm)
            .context("Failed to build reallocation parser")?;
        let mut assistant = ChatAssistant::new(Arc::new(parser));
        let reply = assistant
            .send(&dashboard, &text)
            .await
            .context("Chat request failed")?;
        println!("Bot: {}", reply.message.content);
        if let Some(ticket) = reply.reallocation {
            if let Some(pid) = ticket.process_id {
                println!("Reallocated into process {}", pid);
            }
        }
    }

    dashboard.unmount();
    Ok(())
}
