use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    PublicBaseUrl,
    RegistryBackend,
    RedisUrl,
    RedisKeyPrefix,
    DispatchMode,
    AmqpUrl,
    DispatchQueue,
    LocalWorkers,
    LocalQueueCapacity,
    ShutdownDrainSecs,
    FailInFlightOnShutdown,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::PublicBaseUrl => "PUBLIC_BASE_URL",
            EnvKey::RegistryBackend => "REGISTRY_BACKEND",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::RedisKeyPrefix => "REDIS_KEY_PREFIX",
            EnvKey::DispatchMode => "DISPATCH_MODE",
            EnvKey::AmqpUrl => "AMQP_URL",
            EnvKey::DispatchQueue => "DISPATCH_QUEUE",
            EnvKey::LocalWorkers => "LOCAL_WORKERS",
            EnvKey::LocalQueueCapacity => "LOCAL_QUEUE_CAPACITY",
            EnvKey::ShutdownDrainSecs => "SHUTDOWN_DRAIN_SECS",
            EnvKey::FailInFlightOnShutdown => "FAIL_IN_FLIGHT_ON_SHUTDOWN",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
