use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use super::model::{Job, JobStatus, OutputKind};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobResponse {
    pub id: Uuid,
    pub input: String,
    pub outputs: BTreeSet<OutputKind>,
    pub idempotency_key: Option<String>,
    pub status: JobStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            input: job.request.input,
            outputs: job.request.outputs,
            idempotency_key: job.request.idempotency_key,
            status: job.status,
            result: job.result,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Worker callback body. `result` is kept for `COMPLETED`, `error` for `FAILED`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: JobStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl UpdateStatusRequest {
    pub fn detail(self) -> Option<String> {
        match self.status {
            JobStatus::Completed => self.result,
            JobStatus::Failed => self.error,
            JobStatus::Pending | JobStatus::Running => None,
        }
    }
}
