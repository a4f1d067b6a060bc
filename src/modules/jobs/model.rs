use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    /// Staying in the same state is handled separately as a duplicate report.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Derived products and metadata kinds a transformation can produce.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    DiscoveryMetadata,
    Thumbnail,
    Overview,
    Original,
}

impl OutputKind {
    pub const ALL: [OutputKind; 4] = [
        OutputKind::DiscoveryMetadata,
        OutputKind::Thumbnail,
        OutputKind::Overview,
        OutputKind::Original,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputKind::DiscoveryMetadata => "discovery_metadata",
            OutputKind::Thumbnail => "thumbnail",
            OutputKind::Overview => "overview",
            OutputKind::Original => "original",
        }
    }
}

impl FromStr for OutputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| format!("unsupported output kind '{}'", s))
    }
}

/// A request after validation. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransformSpec {
    pub input: String,
    pub outputs: BTreeSet<OutputKind>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Job {
    pub id: Uuid,
    pub request: TransformSpec,
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

/// Outcome of applying a status report to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The job already has the reported status; nothing changed.
    Duplicate,
}

impl Job {
    pub fn new(request: TransformSpec) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            request,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a worker report in place. Terminal detail is written once and never
    /// overwritten, because a terminal job only ever accepts duplicate reports.
    pub fn apply(
        &mut self,
        next: JobStatus,
        detail: Option<String>,
    ) -> Result<Transition, (JobStatus, JobStatus)> {
        if self.status == next {
            return Ok(Transition::Duplicate);
        }
        if !self.status.can_transition_to(next) {
            return Err((self.status, next));
        }

        self.status = next;
        self.updated_at = OffsetDateTime::now_utc();
        match next {
            JobStatus::Completed => self.result = detail,
            JobStatus::Failed => self.error = detail,
            _ => {}
        }
        Ok(Transition::Applied)
    }
}
