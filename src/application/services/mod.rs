pub mod dispatcher;
pub mod job_query_service;
pub mod job_state_machine;
pub mod reminder_test_service;
pub mod retry_manager;
pub mod trigger_detector;

pub use dispatcher::{DispatchOutcome, DispatchPorts, DispatchSettings, Dispatcher};
pub use job_query_service::{JobFilter, JobPage, JobQueryService};
pub use job_state_machine::JobStateMachine;
pub use reminder_test_service::{ReminderTestService, TestSendResult};
pub use retry_manager::{AttemptOutcome, RetryManager};
pub use trigger_detector::TriggerDetector;
