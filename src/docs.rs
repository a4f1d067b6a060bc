use utoipa::OpenApi;
use crate::modules::jobs::dto::{JobResponse, UpdateStatusRequest};
use crate::modules::jobs::model::{JobStatus, OutputKind};
use crate::modules::transform::dto::{TransformRequest, TransformResponse};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::transform::handler::transform,
        crate::modules::jobs::handler::get_job,
        crate::modules::jobs::handler::update_status,
    ),
    components(
        schemas(
            TransformRequest, TransformResponse,
            JobResponse, UpdateStatusRequest, JobStatus, OutputKind,
        )
    ),
    tags(
        (name = "Transform", description = "Accept products for asynchronous transformation"),
        (name = "Jobs", description = "Job polling and worker status callbacks")
    )
)]
pub struct ApiDoc;
