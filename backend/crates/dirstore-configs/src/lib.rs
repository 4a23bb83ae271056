//! dirstore-configs
//!
//! Backend configuration types and loader for dirstore.

pub mod config;
pub mod file_helpers;

pub use config::defaults;
pub use config::*;
