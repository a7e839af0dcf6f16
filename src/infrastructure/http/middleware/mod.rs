pub mod error;

pub use error::{ApiError, ApiResult};

use std::sync::Arc;

use crate::application::services::{JobQueryService, ReminderTestService, TriggerDetector};

/// Shared state handed to every HTTP handler
#[derive(Clone)]
pub struct AppState {
    pub detector: TriggerDetector,
    pub job_query_service: JobQueryService,
    pub reminder_test_service: ReminderTestService,
    pub agent_repo: Arc<dyn crate::domain::ports::agent_repository::AgentRepository>,
}
