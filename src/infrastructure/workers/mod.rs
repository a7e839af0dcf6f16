pub mod scheduler_worker;

pub use scheduler_worker::*;
