pub mod agents;
pub mod events;
pub mod jobs;
pub mod test_trigger;
