//! Process-wide service wiring with an explicit start and stop.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::settings::{AppConfig, DispatchMode, RegistryBackend};
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::redis::client::RedisService;
use crate::modules::jobs::registry::{InMemoryJobRegistry, JobRegistry, RedisJobRegistry};
use crate::modules::transform::service::IntakeService;
use crate::state::AppState;
use crate::workers::dispatch::{ChannelDispatcher, Dispatcher, RabbitMqDispatcher};
use crate::workers::pool::{PassthroughTransformer, Transformer, WorkerPool};

struct LocalWorkers {
    dispatcher: ChannelDispatcher,
    pool: WorkerPool,
}

pub struct Runtime {
    pub state: AppState,
    local: Option<LocalWorkers>,
}

impl Runtime {
    pub async fn start(config: AppConfig) -> Result<Self> {
        Self::start_with(config, Arc::new(PassthroughTransformer)).await
    }

    /// Like [`Runtime::start`], with the transformer used by local workers.
    pub async fn start_with(config: AppConfig, transformer: Arc<dyn Transformer>) -> Result<Self> {
        config.check()?;

        let registry: Arc<dyn JobRegistry> = match config.registry_backend {
            RegistryBackend::Memory => {
                info!("Using in-memory job registry");
                Arc::new(InMemoryJobRegistry::new())
            }
            RegistryBackend::Redis => {
                let url = config
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("REDIS_URL is not set"))?;
                let redis = RedisService::new(url).await?;
                info!("Using Redis job registry (prefix '{}')", config.redis_key_prefix);
                Arc::new(RedisJobRegistry::new(redis, &config.redis_key_prefix))
            }
        };

        let (dispatcher, local): (Arc<dyn Dispatcher>, Option<LocalWorkers>) =
            match config.dispatch_mode {
                DispatchMode::Local => {
                    let (dispatcher, rx) = ChannelDispatcher::bounded(config.local_queue_capacity);
                    let pool = WorkerPool::start(
                        config.local_workers,
                        rx,
                        registry.clone(),
                        transformer,
                    );
                    (
                        Arc::new(dispatcher.clone()) as Arc<dyn Dispatcher>,
                        Some(LocalWorkers { dispatcher, pool }),
                    )
                }
                DispatchMode::RabbitMq => {
                    let url = config
                        .amqp_url
                        .as_deref()
                        .ok_or_else(|| anyhow!("AMQP_URL is not set"))?;
                    let rabbit = RabbitMqService::new(url).await?;
                    let dispatcher = RabbitMqDispatcher::new(rabbit, &config.dispatch_queue).await?;
                    info!("Dispatching jobs to RabbitMQ queue '{}'", config.dispatch_queue);
                    (Arc::new(dispatcher) as Arc<dyn Dispatcher>, None)
                }
            };

        let intake = Arc::new(IntakeService::new(
            registry,
            dispatcher,
            config.public_base_url.clone(),
        ));

        Ok(Self {
            state: AppState::new(config, intake),
            local,
        })
    }

    /// Stops local workers (draining their queue for the configured period) and then
    /// fails whatever is still in flight, if configured to.
    pub async fn shutdown(self) -> Result<()> {
        let Runtime { state, local } = self;

        if let Some(LocalWorkers { dispatcher, pool }) = local {
            dispatcher.close();
            info!("Draining {} queued local jobs", dispatcher.queued());
            pool.shutdown(state.config.shutdown_drain).await;
        }

        let failed = state
            .intake
            .shutdown(state.config.fail_in_flight_on_shutdown)
            .await?;
        info!("Intake stopped ({} in-flight jobs failed)", failed);
        Ok(())
    }
}
