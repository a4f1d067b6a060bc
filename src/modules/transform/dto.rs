use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::modules::jobs::model::JobStatus;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct TransformRequest {
    /// Location of the input product, e.g. `obj://bucket/product.ntf`.
    #[validate(url(message = "input must be an absolute URI"))]
    pub input: String,
    /// Requested derived products. Defaults to `["discovery_metadata"]`.
    #[serde(default)]
    pub outputs: Option<Vec<String>>,
    #[validate(length(min = 1, max = 255, message = "idempotency key must be 1-255 characters"))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransformResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// True when an active job already owned the idempotency key and was returned instead.
    pub duplicate: bool,
    /// Where to poll the job.
    pub location: String,
}
