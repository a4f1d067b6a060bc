#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use url::Url;
use uuid::Uuid;

use transform_intake::error::{IntakeError, Result};
use transform_intake::modules::jobs::model::{Job, JobStatus};
use transform_intake::modules::jobs::registry::{InMemoryJobRegistry, JobRegistry};
use transform_intake::modules::transform::dto::TransformRequest;
use transform_intake::modules::transform::events::DispatchTask;
use transform_intake::modules::transform::service::IntakeService;
use transform_intake::workers::dispatch::Dispatcher;
use transform_intake::workers::pool::Transformer;

/// Records every dispatched task; can be switched to fail.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub tasks: Mutex<Vec<DispatchTask>>,
    pub fail: AtomicBool,
}

impl RecordingDispatcher {
    pub fn dispatched(&self) -> Vec<DispatchTask> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, task: DispatchTask) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IntakeError::DispatchUnavailable("broker down".to_string()));
        }
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

/// Blocks every transformation until released.
#[derive(Default)]
pub struct GatedTransformer {
    pub gate: Notify,
}

#[async_trait]
impl Transformer for GatedTransformer {
    async fn transform(&self, task: &DispatchTask) -> anyhow::Result<String> {
        self.gate.notified().await;
        Ok(format!("{}#metadata", task.input))
    }
}

pub struct FailingTransformer;

#[async_trait]
impl Transformer for FailingTransformer {
    async fn transform(&self, _task: &DispatchTask) -> anyhow::Result<String> {
        anyhow::bail!("unreadable product")
    }
}

pub struct PanickingTransformer;

#[async_trait]
impl Transformer for PanickingTransformer {
    async fn transform(&self, task: &DispatchTask) -> anyhow::Result<String> {
        panic!("decoder crashed on {}", task.input)
    }
}

pub struct Harness {
    pub registry: Arc<InMemoryJobRegistry>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub intake: Arc<IntakeService>,
}

pub fn harness() -> Harness {
    let registry = Arc::new(InMemoryJobRegistry::new());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let intake = Arc::new(IntakeService::new(
        registry.clone(),
        dispatcher.clone(),
        Url::parse("http://intake.test/").unwrap(),
    ));
    Harness {
        registry,
        dispatcher,
        intake,
    }
}

pub fn request(input: &str, key: Option<&str>) -> TransformRequest {
    TransformRequest {
        input: input.to_string(),
        outputs: None,
        idempotency_key: key.map(str::to_string),
    }
}

/// Polls until the job reaches `status` or the timeout elapses.
pub async fn wait_for_status(
    registry: &dyn JobRegistry,
    id: Uuid,
    status: JobStatus,
    timeout: Duration,
) -> Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = registry.get(id).await.unwrap();
        if job.status == status {
            return job;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job {} stuck in {} (wanted {})", id, job.status, status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
