use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{JobRegistry, Submission};
use crate::error::{IntakeError, Result};
use crate::modules::jobs::model::{Job, JobStatus, TransformSpec, Transition};

/// Process-local registry.
///
/// Jobs and the idempotency index live in separate sharded maps. `submit` holds the
/// key's index entry for the whole compare-and-create, so racing submitters of one key
/// serialize while other keys proceed. Lock order is always index entry, then job entry;
/// `update` never touches the index.
#[derive(Default)]
pub struct InMemoryJobRegistry {
    jobs: DashMap<Uuid, Job>,
    keys: DashMap<String, Uuid>,
}

impl InMemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn insert_new(&self, request: TransformSpec) -> Job {
        let job = Job::new(request);
        self.jobs.insert(job.id, job.clone());
        job
    }
}

#[async_trait]
impl JobRegistry for InMemoryJobRegistry {
    async fn submit(&self, request: TransformSpec) -> Result<Submission> {
        let Some(key) = request.idempotency_key.clone() else {
            let job = self.insert_new(request);
            debug!("Registered job {} (no idempotency key)", job.id);
            return Ok(Submission { job, created: true });
        };

        match self.keys.entry(key) {
            Entry::Occupied(mut bound) => {
                let existing = self
                    .jobs
                    .get(bound.get())
                    .map(|job| job.value().clone())
                    .filter(|job| !job.status.is_terminal());

                if let Some(job) = existing {
                    debug!("Key '{}' already bound to active job {}", bound.key(), job.id);
                    return Ok(Submission { job, created: false });
                }

                let job = self.insert_new(request);
                debug!("Rebinding key '{}' to new job {}", bound.key(), job.id);
                bound.insert(job.id);
                Ok(Submission { job, created: true })
            }
            Entry::Vacant(slot) => {
                // Job must be visible before the key points at it.
                let job = self.insert_new(request);
                debug!("Binding key '{}' to new job {}", slot.key(), job.id);
                slot.insert(job.id);
                Ok(Submission { job, created: true })
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Job> {
        self.jobs
            .get(&id)
            .map(|job| job.value().clone())
            .ok_or(IntakeError::NotFound(id))
    }

    async fn update(&self, id: Uuid, status: JobStatus, detail: Option<String>) -> Result<Job> {
        let mut job = self.jobs.get_mut(&id).ok_or(IntakeError::NotFound(id))?;

        match job.apply(status, detail) {
            Ok(Transition::Applied) => Ok(job.value().clone()),
            Ok(Transition::Duplicate) => {
                warn!("Ignoring duplicate {} report for job {}", status, id);
                Ok(job.value().clone())
            }
            Err((from, to)) => Err(IntakeError::InvalidTransition { job_id: id, from, to }),
        }
    }

    async fn fail_in_flight(&self, reason: &str) -> Result<usize> {
        let mut failed = 0;
        for mut entry in self.jobs.iter_mut() {
            if entry.status.is_terminal() {
                continue;
            }
            if entry.apply(JobStatus::Failed, Some(reason.to_string())).is_ok() {
                failed += 1;
            }
        }
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::jobs::model::OutputKind;
    use std::collections::{BTreeSet, HashSet};
    use std::sync::Arc;

    fn request(key: Option<&str>) -> TransformSpec {
        TransformSpec {
            input: "obj://A".to_string(),
            outputs: BTreeSet::from([OutputKind::DiscoveryMetadata]),
            idempotency_key: key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_submit_without_key_always_creates() {
        let registry = InMemoryJobRegistry::new();
        let a = registry.submit(request(None)).await.unwrap();
        let b = registry.submit(request(None)).await.unwrap();

        assert!(a.created && b.created);
        assert_ne!(a.job.id, b.job.id);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_key_returns_active_job() {
        let registry = InMemoryJobRegistry::new();
        let first = registry.submit(request(Some("K1"))).await.unwrap();
        let second = registry.submit(request(Some("K1"))).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.job.id, second.job.id);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_key_rebinds_after_terminal_job() {
        let registry = InMemoryJobRegistry::new();
        let first = registry.submit(request(Some("K1"))).await.unwrap();
        registry
            .update(first.job.id, JobStatus::Failed, Some("boom".into()))
            .await
            .unwrap();

        let second = registry.submit(request(Some("K1"))).await.unwrap();
        assert!(second.created);
        assert_ne!(first.job.id, second.job.id);

        let third = registry.submit(request(Some("K1"))).await.unwrap();
        assert_eq!(third.job.id, second.job.id);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let registry = InMemoryJobRegistry::new();
        let id = Uuid::new_v4();
        assert_eq!(registry.get(id).await, Err(IntakeError::NotFound(id)));
        assert_eq!(
            registry.update(id, JobStatus::Running, None).await,
            Err(IntakeError::NotFound(id))
        );
    }

    #[tokio::test]
    async fn test_lifecycle_and_terminal_sink() {
        let registry = InMemoryJobRegistry::new();
        let id = registry.submit(request(Some("K1"))).await.unwrap().job.id;

        registry.update(id, JobStatus::Running, None).await.unwrap();
        assert_eq!(registry.get(id).await.unwrap().status, JobStatus::Running);

        let done = registry
            .update(id, JobStatus::Completed, Some("R".into()))
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result.as_deref(), Some("R"));

        // duplicate terminal report is a no-op
        let again = registry
            .update(id, JobStatus::Completed, Some("R2".into()))
            .await
            .unwrap();
        assert_eq!(again.result.as_deref(), Some("R"));

        let err = registry.update(id, JobStatus::Running, None).await.unwrap_err();
        assert_eq!(
            err,
            IntakeError::InvalidTransition {
                job_id: id,
                from: JobStatus::Completed,
                to: JobStatus::Running,
            }
        );
        assert_eq!(registry.get(id).await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_submit_same_key_creates_one_job() {
        let registry = Arc::new(InMemoryJobRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..64 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.submit(request(Some("shared"))).await.unwrap()
            }));
        }

        let mut ids = HashSet::new();
        let mut created = 0;
        for handle in handles {
            let submission = handle.await.unwrap();
            ids.insert(submission.job.id);
            if submission.created {
                created += 1;
            }
        }

        assert_eq!(ids.len(), 1);
        assert_eq!(created, 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_in_flight_skips_terminal_jobs() {
        let registry = InMemoryJobRegistry::new();
        let pending = registry.submit(request(None)).await.unwrap().job.id;
        let running = registry.submit(request(None)).await.unwrap().job.id;
        let done = registry.submit(request(None)).await.unwrap().job.id;

        registry.update(running, JobStatus::Running, None).await.unwrap();
        registry.update(done, JobStatus::Running, None).await.unwrap();
        registry
            .update(done, JobStatus::Completed, Some("R".into()))
            .await
            .unwrap();

        let failed = registry.fail_in_flight("shutting down").await.unwrap();
        assert_eq!(failed, 2);

        for id in [pending, running] {
            let job = registry.get(id).await.unwrap();
            assert_eq!(job.status, JobStatus::Failed);
            assert_eq!(job.error.as_deref(), Some("shutting down"));
        }
        assert_eq!(registry.get(done).await.unwrap().status, JobStatus::Completed);
    }
}
