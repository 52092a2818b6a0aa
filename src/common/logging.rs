//! Structured Logging for the SCITT Log Engine
//!
//! Provides production-ready structured logging with:
//! - JSON output for log aggregation services (ELK, Datadog, etc.)
//! - Correlation IDs for request tracing
//! - Domain event helpers for registration, checkpoint and receipt flows
//!
//! # Usage
//!
//! ```rust
//! use scitt_log::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, true).unwrap(); // JSON mode for production
//! ```

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Statement registration events
    Registration,
    /// Checkpoint/STH issuance events
    Checkpoint,
    /// Receipt construction events
    Receipt,
    /// Inclusion/consistency proof events
    Proof,
    /// System events (startup, shutdown, migrations)
    System,
    /// Error events
    Error,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    /// Log level
    pub level: String,
    /// Event category
    pub category: EventCategory,
    /// Human-readable message
    pub message: String,
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Duration in milliseconds (for performance events)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for error events
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl LogEvent {
    /// Create a new log event
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: format!("{:?}", level).to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Add correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add structured data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add duration
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Add error details
    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
            stack: None,
        });
        self
    }

    /// Log this event to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!("{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}", self.message))
    }
}

// ============================================================================
// Domain Event Logging
// ============================================================================

/// Log a statement registration event
pub fn log_registration_event(
    entry_id: u64,
    statement_hash: &str,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Registration, "register")
        .with_correlation_id(statement_hash)
        .with_data(serde_json::json!({
            "entry_id": entry_id,
            "statement_hash": statement_hash,
            "success": success
        }));

    if let Some(err) = error {
        event = event.with_error("REGISTRATION_ERROR", err);
    }

    if success {
        tracing::info!(target: "scitt::registration", "{}", event.to_json());
    } else {
        tracing::error!(target: "scitt::registration", "{}", event.to_json());
    }
}

/// Log a checkpoint issuance event
pub fn log_checkpoint_event(tree_size: u64, root_hash_hex: &str) {
    let event = LogEvent::new(LogLevel::Info, EventCategory::Checkpoint, "checkpoint issued")
        .with_data(serde_json::json!({
            "tree_size": tree_size,
            "root_hash": root_hash_hex
        }));

    tracing::info!(target: "scitt::checkpoint", "{}", event.to_json());
}

/// Log a receipt construction event
pub fn log_receipt_event(entry_id: u64, tree_size: u64, success: bool, error: Option<&str>) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Receipt, "receipt")
        .with_data(serde_json::json!({
            "entry_id": entry_id,
            "tree_size": tree_size,
            "success": success
        }));

    if let Some(err) = error {
        event = event.with_error("RECEIPT_ERROR", err);
    }

    if success {
        tracing::info!(target: "scitt::receipt", "{}", event.to_json());
    } else {
        tracing::error!(target: "scitt::receipt", "{}", event.to_json());
    }
}

/// Log a proof verification event
pub fn log_proof_event(kind: &str, verified: bool) {
    let level = if verified { LogLevel::Info } else { LogLevel::Warn };
    let event = LogEvent::new(level, EventCategory::Proof, format!("{kind} verification"))
        .with_data(serde_json::json!({ "kind": kind, "verified": verified }));

    if verified {
        tracing::info!(target: "scitt::proof", "{}", event.to_json());
    } else {
        tracing::warn!(target: "scitt::proof", "{}", event.to_json());
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Minimum log level to output
/// * `json_format` - Use JSON format (recommended for production)
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "scitt={0},tower_http={0}",
            format!("{:?}", level).to_lowercase()
        ))
    });

    if json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );

        subscriber
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );

        subscriber
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from `ServiceConfig`
pub fn init_from_config(config: &crate::common::config::ServiceConfig) -> Result<(), LoggingError> {
    use crate::common::config::LogFormat;

    let level = LogLevel::from(config.log_level.as_str());
    let json_format = matches!(config.log_format, LogFormat::Json);

    init_logging(level, json_format)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

// ============================================================================
// Request ID Generation
// ============================================================================

/// Generate a unique correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    use rand::RngCore;
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();

    let suffix = rand::thread_rng().next_u32() & 0xFFFF;

    format!("{:x}-{:04x}", timestamp & 0xFFFFFFFF, suffix)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Registration, "Test event")
            .with_correlation_id("test-123")
            .with_data(serde_json::json!({"key": "value"}))
            .with_duration(42);

        let json = event.to_json();
        assert!(json.contains("Test event"));
        assert!(json.contains("test-123"));
        assert!(json.contains("42"));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_correlation_id_generation() {
        let id1 = generate_correlation_id();
        let id2 = generate_correlation_id();

        assert!(!id1.is_empty());
        assert!(!id2.is_empty());
    }
}
