#![allow(dead_code, unused_imports)]
pub mod fakes;
pub mod seed;
pub mod test_db;

pub use fakes::*;
pub use seed::*;
pub use test_db::*;
