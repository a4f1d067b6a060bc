use anyhow::{anyhow, bail, Result};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::config::env::{self, EnvKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryBackend {
    Memory,
    Redis,
}

impl FromStr for RegistryBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(RegistryBackend::Memory),
            "redis" => Ok(RegistryBackend::Redis),
            other => Err(anyhow!("unknown registry backend '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    Local,
    RabbitMq,
}

impl FromStr for DispatchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(DispatchMode::Local),
            "rabbitmq" | "amqp" => Ok(DispatchMode::RabbitMq),
            other => Err(anyhow!("unknown dispatch mode '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub public_base_url: Url,
    pub registry_backend: RegistryBackend,
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub dispatch_mode: DispatchMode,
    pub amqp_url: Option<String>,
    pub dispatch_queue: String,
    pub local_workers: usize,
    pub local_queue_capacity: usize,
    pub shutdown_drain: Duration,
    pub fail_in_flight_on_shutdown: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            public_base_url: Url::parse("http://localhost:3000/").expect("static url"),
            registry_backend: RegistryBackend::Memory,
            redis_url: None,
            redis_key_prefix: "transform".to_string(),
            dispatch_mode: DispatchMode::Local,
            amqp_url: None,
            dispatch_queue: "transformation_tasks".to_string(),
            local_workers: 4,
            local_queue_capacity: 1024,
            shutdown_drain: Duration::from_secs(10),
            fail_in_flight_on_shutdown: fail_in_flight_default(
                RegistryBackend::Memory,
                DispatchMode::Local,
            ),
        }
    }
}

impl AppConfig {
    pub fn new() -> Result<Self> {
        let defaults = Self::default();
        let server_port = env::get_parsed(EnvKey::ServerPort, defaults.server_port);

        let base = env::get_or(
            EnvKey::PublicBaseUrl,
            &format!("http://localhost:{}", server_port),
        );

        let registry_backend: RegistryBackend =
            env::get_or(EnvKey::RegistryBackend, "memory").parse()?;
        let dispatch_mode: DispatchMode = env::get_or(EnvKey::DispatchMode, "local").parse()?;

        let config = Self {
            server_port,
            public_base_url: normalize_base_url(&base)?,
            registry_backend,
            redis_url: env::get_opt(EnvKey::RedisUrl),
            redis_key_prefix: env::get_or(EnvKey::RedisKeyPrefix, &defaults.redis_key_prefix),
            dispatch_mode,
            amqp_url: env::get_opt(EnvKey::AmqpUrl),
            dispatch_queue: env::get_or(EnvKey::DispatchQueue, &defaults.dispatch_queue),
            local_workers: env::get_parsed(EnvKey::LocalWorkers, defaults.local_workers),
            local_queue_capacity: env::get_parsed(
                EnvKey::LocalQueueCapacity,
                defaults.local_queue_capacity,
            ),
            shutdown_drain: Duration::from_secs(env::get_parsed(
                EnvKey::ShutdownDrainSecs,
                defaults.shutdown_drain.as_secs(),
            )),
            fail_in_flight_on_shutdown: env::get_parsed(
                EnvKey::FailInFlightOnShutdown,
                fail_in_flight_default(registry_backend, dispatch_mode),
            ),
        };

        config.check()?;
        Ok(config)
    }

    /// Rejects combinations that would only fail later, at the first request or at shutdown.
    pub fn check(&self) -> Result<()> {
        if self.registry_backend == RegistryBackend::Redis && self.redis_url.is_none() {
            bail!(
                "{} is required when {}=redis",
                EnvKey::RedisUrl.as_str(),
                EnvKey::RegistryBackend.as_str()
            );
        }
        if self.dispatch_mode == DispatchMode::RabbitMq && self.amqp_url.is_none() {
            bail!(
                "{} is required when {}=rabbitmq",
                EnvKey::AmqpUrl.as_str(),
                EnvKey::DispatchMode.as_str()
            );
        }
        // Broker-dispatched jobs belong to external workers that outlive this process.
        if self.dispatch_mode == DispatchMode::RabbitMq && self.fail_in_flight_on_shutdown {
            bail!(
                "{}=true cannot be combined with {}=rabbitmq",
                EnvKey::FailInFlightOnShutdown.as_str(),
                EnvKey::DispatchMode.as_str()
            );
        }
        Ok(())
    }
}

/// Failing non-terminal jobs at shutdown is only safe when this process owns every one of
/// them: the workers are in-process and the registry is not shared with other replicas.
pub fn fail_in_flight_default(backend: RegistryBackend, mode: DispatchMode) -> bool {
    backend == RegistryBackend::Memory && mode == DispatchMode::Local
}

/// Parses the externally visible base URL and guarantees a trailing slash, so relative
/// joins append to its path instead of replacing the last segment.
pub fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| anyhow!("invalid PUBLIC_BASE_URL '{}': {}", raw, e))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
