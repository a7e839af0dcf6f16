pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use config::Config;
pub use infrastructure::http::middleware::error::{ApiError, ApiResult};
pub use shared::events::{EventBus, LocalEventBus, SystemEvent};
