pub mod agent;
pub mod appointment;
pub mod conversation;
pub mod followup;
pub mod job;
pub mod reminder;
pub mod summary;
pub mod template;

pub use agent::*;
pub use appointment::*;
pub use conversation::*;
pub use followup::*;
pub use job::*;
pub use reminder::*;
pub use summary::*;
pub use template::*;
