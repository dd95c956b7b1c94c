//! # TaskPing Core
//! Shared configuration and error types used across the workspace.

pub mod config;
pub mod error;

pub use config::TaskPingConfig;
pub use error::{Result, TaskPingError};
