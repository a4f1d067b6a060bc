use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::modules::jobs::model::JobStatus;
use crate::modules::jobs::registry::JobRegistry;
use crate::modules::transform::events::DispatchTask;

/// The collaborator that actually derives products. Returns a reference to the result.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, task: &DispatchTask) -> anyhow::Result<String>;
}

/// Development stand-in: reports the input reference itself as the result.
pub struct PassthroughTransformer;

#[async_trait]
impl Transformer for PassthroughTransformer {
    async fn transform(&self, task: &DispatchTask) -> anyhow::Result<String> {
        Ok(task.input.clone())
    }
}

/// Fixed set of tokio tasks draining the local dispatch queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        workers: usize,
        rx: async_channel::Receiver<DispatchTask>,
        registry: Arc<dyn JobRegistry>,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        let workers = workers.max(1);
        let handles = (0..workers)
            .map(|n| {
                let rx = rx.clone();
                let registry = registry.clone();
                let transformer = transformer.clone();
                tokio::spawn(async move {
                    worker_loop(n, rx, registry, transformer).await;
                })
            })
            .collect();

        info!("🛠️ Started {} local transformation workers", workers);
        Self { handles }
    }

    /// Waits for the workers to finish once their queue has been closed. Workers still
    /// busy after `drain` are aborted. Returns how many workers ended by panicking.
    pub async fn shutdown(self, drain: Duration) -> usize {
        let mut handles = self.handles;
        let mut crashed = 0;
        let joined = tokio::time::timeout(drain, async {
            for (n, handle) in handles.iter_mut().enumerate() {
                if let Err(e) = handle.await {
                    error!("Worker {} ended abnormally: {}", n, e);
                    crashed += 1;
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!("Workers did not drain within {:?}, aborting", drain);
            for handle in &handles {
                handle.abort();
            }
        } else {
            info!("Local workers drained");
        }
        crashed
    }
}

async fn worker_loop(
    n: usize,
    rx: async_channel::Receiver<DispatchTask>,
    registry: Arc<dyn JobRegistry>,
    transformer: Arc<dyn Transformer>,
) {
    while let Ok(task) = rx.recv().await {
        info!("📦 Worker {} picked up job {}", n, task.job_id);
        run_task(&task, registry.as_ref(), transformer.as_ref()).await;
    }
}

async fn run_task(task: &DispatchTask, registry: &dyn JobRegistry, transformer: &dyn Transformer) {
    if let Err(e) = registry.update(task.job_id, JobStatus::Running, None).await {
        // Usually the job was failed by shutdown before a worker reached it.
        warn!("Skipping job {}: {}", task.job_id, e);
        return;
    }

    let (status, detail) = match transformer.transform(task).await {
        Ok(result) => {
            info!("✅ Job {} completed", task.job_id);
            (JobStatus::Completed, result)
        }
        Err(e) => {
            error!("❌ Job {} failed: {:#}", task.job_id, e);
            (JobStatus::Failed, format!("{:#}", e))
        }
    };

    if let Err(e) = registry.update(task.job_id, status, Some(detail)).await {
        error!("Failed to record {} for job {}: {}", status, task.job_id, e);
    }
}
