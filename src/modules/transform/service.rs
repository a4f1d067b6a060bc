use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;
use validator::Validate;

use super::dto::{TransformRequest, TransformResponse};
use super::events::DispatchTask;
use crate::error::{IntakeError, Result};
use crate::modules::jobs::model::{Job, JobStatus, OutputKind, TransformSpec};
use crate::modules::jobs::registry::{JobRegistry, Submission};
use crate::workers::dispatch::Dispatcher;

pub const JOBS_PATH: &str = "/api/v1/jobs";

/// Accepts a product for asynchronous transformation and acknowledges it immediately.
#[async_trait]
pub trait TransformationService: Send + Sync {
    async fn transform(&self, request: TransformRequest) -> Result<TransformResponse>;
}

pub struct IntakeService {
    registry: Arc<dyn JobRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    public_base_url: Url,
}

impl IntakeService {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
        public_base_url: Url,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            public_base_url,
        }
    }

    pub fn registry(&self) -> Arc<dyn JobRegistry> {
        self.registry.clone()
    }

    pub async fn job(&self, id: Uuid) -> Result<Job> {
        self.registry.get(id).await
    }

    /// Status report from the worker collaborator.
    pub async fn report(&self, id: Uuid, status: JobStatus, detail: Option<String>) -> Result<Job> {
        match self.registry.update(id, status, detail).await {
            Ok(job) => {
                info!("Job {} is now {}", id, job.status);
                Ok(job)
            }
            Err(e) => {
                warn!("Rejected {} report for job {}: {}", status, id, e);
                Err(e)
            }
        }
    }

    /// Final teardown once no more work can arrive. Returns the number of jobs failed.
    pub async fn shutdown(&self, fail_in_flight: bool) -> Result<usize> {
        if !fail_in_flight {
            return Ok(0);
        }
        let failed = self
            .registry
            .fail_in_flight("intake service shut down before the job finished")
            .await?;
        if failed > 0 {
            warn!("Marked {} in-flight jobs as FAILED during shutdown", failed);
        }
        Ok(failed)
    }

    fn location(id: Uuid) -> String {
        format!("{}/{}", JOBS_PATH, id)
    }

    fn callback_url(&self, id: Uuid) -> Option<String> {
        let path = format!("{}/{}/status", JOBS_PATH.trim_start_matches('/'), id);
        self.public_base_url.join(&path).ok().map(String::from)
    }

    fn response(job: &Job, duplicate: bool) -> TransformResponse {
        TransformResponse {
            job_id: job.id,
            status: job.status,
            duplicate,
            location: Self::location(job.id),
        }
    }
}

#[async_trait]
impl TransformationService for IntakeService {
    async fn transform(&self, request: TransformRequest) -> Result<TransformResponse> {
        let spec = validate_request(request)?;
        let Submission { job, created } = self.registry.submit(spec).await?;

        if !created {
            info!("Duplicate submission suppressed, returning job {} ({})", job.id, job.status);
            return Ok(Self::response(&job, true));
        }

        let task = DispatchTask::for_job(&job, self.callback_url(job.id));
        if let Err(e) = self.dispatcher.dispatch(task).await {
            error!("Dispatch of job {} failed: {}", job.id, e);
            let detail = format!("dispatch failed: {}", e);
            if let Err(mark) = self.registry.update(job.id, JobStatus::Failed, Some(detail)).await {
                error!("Could not mark job {} as failed: {}", job.id, mark);
            }
            return Err(e);
        }

        info!("Accepted job {} for {}", job.id, job.request.input);
        Ok(Self::response(&job, false))
    }
}

/// Checks the request shape and resolves output kinds. Nothing is registered when this fails.
pub fn validate_request(request: TransformRequest) -> Result<TransformSpec> {
    request
        .validate()
        .map_err(|e| IntakeError::InvalidRequest(e.to_string()))?;

    let input = request.input.trim().to_string();
    if input.is_empty() {
        return Err(IntakeError::InvalidRequest("input must not be empty".to_string()));
    }

    let idempotency_key = match request.idempotency_key {
        Some(key) if key.trim().is_empty() => {
            return Err(IntakeError::InvalidRequest(
                "idempotency key must not be blank".to_string(),
            ));
        }
        other => other,
    };

    let mut outputs = BTreeSet::new();
    for raw in request.outputs.unwrap_or_default() {
        let kind = raw.parse::<OutputKind>().map_err(IntakeError::InvalidRequest)?;
        outputs.insert(kind);
    }
    if outputs.is_empty() {
        outputs.insert(OutputKind::DiscoveryMetadata);
    }

    Ok(TransformSpec {
        input,
        outputs,
        idempotency_key,
    })
}
