use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::modules::transform::service::IntakeService;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub intake: Arc<IntakeService>,
}

impl AppState {
    pub fn new(config: AppConfig, intake: Arc<IntakeService>) -> Self {
        Self { config, intake }
    }
}
