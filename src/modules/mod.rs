pub mod jobs;
pub mod transform;
