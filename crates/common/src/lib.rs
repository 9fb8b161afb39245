//! Shared utilities, configuration, and error handling for Tubeflow
//!
//! This crate provides common functionality used across the Tubeflow workspace:
//! - Configuration management following 12-factor principles
//! - Error types and handling
//! - Shared repository and state machine error types

pub mod config;
pub mod db;
pub mod error;
pub mod state;

pub use config::Config;
pub use db::RepositoryError;
pub use error::{Error, Result};
pub use state::StateError;
