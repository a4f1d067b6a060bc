pub mod queue;
pub mod redis;
