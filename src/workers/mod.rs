pub mod dispatch;
pub mod pool;
