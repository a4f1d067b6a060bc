use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::modules::jobs::model::{Job, OutputKind};

/// Message handed to the worker collaborator, once per newly created job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTask {
    pub job_id: Uuid,
    pub input: String,
    pub outputs: BTreeSet<OutputKind>,
    /// Absolute URL the worker reports status changes to.
    pub callback: Option<String>,
}

impl DispatchTask {
    pub fn for_job(job: &Job, callback: Option<String>) -> Self {
        Self {
            job_id: job.id,
            input: job.request.input.clone(),
            outputs: job.request.outputs.clone(),
            callback,
        }
    }
}
