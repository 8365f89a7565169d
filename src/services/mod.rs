//! Bot services
//!
//! The subscription engine and the daily scheduler that drives it.

pub mod scheduler;
pub mod subscription;
