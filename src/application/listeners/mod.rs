pub mod triggers;

pub use triggers::{handle_event, run_trigger_listener};
