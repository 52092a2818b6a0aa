//! Common Infrastructure Module
//!
//! Shared utilities and configuration for the SCITT log engine.
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - The root error type

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{ConfigError, LogFormat, ServiceConfig};
pub use error::{Result, ScittError};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_checkpoint_event,
    log_proof_event, log_receipt_event, log_registration_event, ErrorDetails, EventCategory,
    LogEvent, LogLevel, LoggingError,
};
