use redis::{Client, aio::MultiplexedConnection};
use tracing::info;

/// Shared Redis handle. One multiplexed connection is opened at startup; callers get
/// clones of it, which pipeline over the same socket and are safe to use concurrently.
#[derive(Clone)]
pub struct RedisService {
    conn: MultiplexedConnection,
}

impl RedisService {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(connection_string)?;

        // Fail at startup rather than on the first submission
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;

        info!("✅ Connected to Redis job registry");
        Ok(Self { conn })
    }

    pub fn get_conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}
