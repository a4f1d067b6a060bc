use async_trait::async_trait;
use tracing::debug;

use crate::error::{IntakeError, Result};
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::modules::transform::events::DispatchTask;

/// Hands a job to whatever executes transformations. Called at most once per job.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, task: DispatchTask) -> Result<()>;
}

/// Publishes tasks to a durable RabbitMQ queue consumed by external workers, which
/// report back through the job status callback.
pub struct RabbitMqDispatcher {
    rabbit: RabbitMqService,
    queue: String,
}

impl RabbitMqDispatcher {
    pub async fn new(rabbit: RabbitMqService, queue: &str) -> anyhow::Result<Self> {
        rabbit.declare_queue(queue).await?;
        Ok(Self {
            rabbit,
            queue: queue.to_string(),
        })
    }
}

#[async_trait]
impl Dispatcher for RabbitMqDispatcher {
    async fn dispatch(&self, task: DispatchTask) -> Result<()> {
        let payload = serde_json::to_vec(&task)
            .map_err(|e| IntakeError::DispatchUnavailable(format!("encode task: {}", e)))?;

        self.rabbit
            .publish(&self.queue, &payload)
            .await
            .map_err(|e| IntakeError::DispatchUnavailable(e.to_string()))?;

        debug!("Published job {} to '{}'", task.job_id, self.queue);
        Ok(())
    }
}

/// In-process queue drained by [`crate::workers::pool::WorkerPool`].
///
/// The queue is bounded and `dispatch` never waits for room: a full queue is reported
/// to the caller instead of stalling the intake request.
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: async_channel::Sender<DispatchTask>,
}

impl ChannelDispatcher {
    pub fn bounded(capacity: usize) -> (Self, async_channel::Receiver<DispatchTask>) {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Stops accepting tasks. Already queued tasks stay receivable.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn queued(&self) -> usize {
        self.tx.len()
    }
}

#[async_trait]
impl Dispatcher for ChannelDispatcher {
    async fn dispatch(&self, task: DispatchTask) -> Result<()> {
        let job_id = task.job_id;
        self.tx.try_send(task).map_err(|e| match e {
            async_channel::TrySendError::Full(_) => {
                IntakeError::DispatchUnavailable("local worker queue is full".to_string())
            }
            async_channel::TrySendError::Closed(_) => {
                IntakeError::DispatchUnavailable("local worker queue is closed".to_string())
            }
        })?;
        debug!("Queued job {} locally ({} waiting)", job_id, self.tx.len());
        Ok(())
    }
}
