//! CLI command implementations.

pub mod chains;
pub mod config;
pub mod verify;
