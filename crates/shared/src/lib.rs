//! Shared library for the anime parsers workspace.
//!
//! This crate provides common functionality used across the other crates:
//! - Configuration management
//! - Logging infrastructure

pub mod config;
pub mod logging;

// Re-export commonly used types
pub use config::{Config, FetchSection, FetchSettings, LoggingConfig, SitesConfig};
pub use logging::LogConfig;

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
