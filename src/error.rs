use thiserror::Error;
use uuid::Uuid;

use crate::modules::jobs::model::JobStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntakeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Dispatch unavailable: {0}")]
    DispatchUnavailable(String),

    #[error("Registry error: {0}")]
    Registry(String),
}

pub type Result<T> = std::result::Result<T, IntakeError>;

impl From<redis::RedisError> for IntakeError {
    fn from(e: redis::RedisError) -> Self {
        IntakeError::Registry(e.to_string())
    }
}

impl From<serde_json::Error> for IntakeError {
    fn from(e: serde_json::Error) -> Self {
        IntakeError::Registry(format!("corrupt job record: {}", e))
    }
}
