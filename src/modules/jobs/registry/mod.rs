//! Job registry: the single owner of job state.
//!
//! Implementations must create at most one live job per idempotency key even when
//! submitters race, and must treat repeated status reports as no-ops.

use async_trait::async_trait;
use uuid::Uuid;

use super::model::{Job, JobStatus, TransformSpec};
use crate::error::Result;

pub mod memory;
pub mod redis;

pub use memory::InMemoryJobRegistry;
pub use self::redis::RedisJobRegistry;

/// Result of `submit`: the job the caller should track, and whether it was created by
/// this call (`false` means an active job already owned the idempotency key).
#[derive(Debug, Clone)]
pub struct Submission {
    pub job: Job,
    pub created: bool,
}

#[async_trait]
pub trait JobRegistry: Send + Sync {
    async fn submit(&self, request: TransformSpec) -> Result<Submission>;

    async fn get(&self, id: Uuid) -> Result<Job>;

    async fn update(&self, id: Uuid, status: JobStatus, detail: Option<String>) -> Result<Job>;

    /// Marks every non-terminal job as failed. Returns the number of jobs changed.
    async fn fail_in_flight(&self, reason: &str) -> Result<usize>;
}
