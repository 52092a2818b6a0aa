//! Environment-based Configuration for the SCITT Log Engine
//!
//! Provides configuration loading from environment variables. The
//! service's own signing key material is generated or loaded via the
//! same mechanism; nothing sensitive is hardcoded.
//!
//! # Environment Variables
//!
//! - `SCITT_ORIGIN` - the log's self-declared checkpoint origin URL
//! - `SCITT_DB_PATH` - path to the SQLite metadata database (":memory:" allowed)
//! - `SCITT_SERVICE_KEY` - hex-encoded P-256 private scalar (ES256 service key)
//! - `SCITT_CHECKPOINT_KEY` - hex-encoded Ed25519 seed for checkpoint signing
//! - `SCITT_CHECKPOINT_KEY_NAME` - key name used in signed-note key hints
//! - `SCITT_LOG_LEVEL` - logging level (trace, debug, info, warn, error)

use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Log output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => Err(ConfigError::InvalidValue(
                "SCITT_LOG_FORMAT".to_string(),
                format!("unknown format: {s}"),
            )),
        }
    }
}

/// Main service configuration struct
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Checkpoint/STH origin URL, e.g. "https://transparency.example/log"
    pub origin: String,

    /// Path to the SQLite metadata database; ":memory:" for an ephemeral store
    pub db_path: String,

    /// Hex-encoded P-256 private scalar for the ES256 service signer, if
    /// supplied; otherwise a fresh key is generated at startup.
    pub service_key_hex: Option<String>,

    /// Hex-encoded Ed25519 seed for checkpoint signing, if supplied;
    /// otherwise a fresh key is generated at startup.
    pub checkpoint_key_hex: Option<String>,

    /// Key name embedded in the signed-note key hint.
    pub checkpoint_key_name: String,

    /// Logging level.
    pub log_level: String,

    /// Logging output format.
    pub log_format: LogFormat,
}

impl ServiceConfig {
    /// Load configuration from environment variables, filling in
    /// development-friendly defaults where the source code makes policy
    /// decisions (freshly generated keys, in-memory database).
    pub fn from_env() -> Result<Self, ConfigError> {
        let origin = env::var("SCITT_ORIGIN")
            .unwrap_or_else(|_| "https://transparency.example/log".to_string());

        let db_path = env::var("SCITT_DB_PATH").unwrap_or_else(|_| ":memory:".to_string());

        let service_key_hex = env::var("SCITT_SERVICE_KEY").ok();
        let checkpoint_key_hex = env::var("SCITT_CHECKPOINT_KEY").ok();

        let checkpoint_key_name =
            env::var("SCITT_CHECKPOINT_KEY_NAME").unwrap_or_else(|_| "scitt-log".to_string());

        let log_level = env::var("SCITT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format: LogFormat = env::var("SCITT_LOG_FORMAT")
            .unwrap_or_else(|_| "pretty".to_string())
            .parse()?;

        Ok(Self {
            origin,
            db_path,
            service_key_hex,
            checkpoint_key_hex,
            checkpoint_key_name,
            log_level,
            log_format,
        })
    }

    /// Print a configuration summary (no key material).
    pub fn print_summary(&self) {
        println!("=== SCITT Log Configuration ===");
        println!("Origin: {}", self.origin);
        println!("DB Path: {}", self.db_path);
        println!(
            "Service Key: {}",
            if self.service_key_hex.is_some() {
                "from env"
            } else {
                "generated"
            }
        );
        println!(
            "Checkpoint Key: {}",
            if self.checkpoint_key_hex.is_some() {
                "from env"
            } else {
                "generated"
            }
        );
        println!("Checkpoint Key Name: {}", self.checkpoint_key_name);
        println!("Log Level: {}", self.log_level);
        println!("================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert!(matches!("json".parse::<LogFormat>(), Ok(LogFormat::Json)));
        assert!(matches!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty)));
        assert!("invalid".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_defaults_present() {
        // from_env never requires a variable to be set; defaults must
        // always produce a usable configuration.
        let cfg = ServiceConfig::from_env().unwrap();
        assert!(!cfg.origin.is_empty());
        assert!(!cfg.db_path.is_empty());
    }
}
