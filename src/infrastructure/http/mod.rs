pub mod controllers;
pub mod middleware;
pub mod router;

pub use controllers::*;
