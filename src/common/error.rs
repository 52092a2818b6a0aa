//! Common Error Types for the SCITT Log Engine
//!
//! Provides unified error handling across all modules.

use thiserror::Error;

use crate::blob::BlobError;
use crate::cose::CodecError;
use crate::metadata::MetadataError;
use crate::proof::ProofError;

/// Root error type for the transparency service
#[derive(Debug, Error)]
pub enum ScittError {
    /// Signed statement failed to decode, missing required header, or
    /// otherwise malformed input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Same statement hash already admitted; carries the prior entry_id.
    #[error("duplicate statement: already registered as entry {entry_id}")]
    DuplicateStatement { entry_id: u64 },

    /// Entry, receipt or tile queried beyond the current tree state.
    #[error("not found: {0}")]
    NotFound(String),

    /// Inclusion/consistency proof failed to verify, or tree_size bounds
    /// are inconsistent.
    #[error("proof failure: {0}")]
    ProofFailure(String),

    /// Blob store or metadata store transient failure.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Service signer could not produce a signature.
    #[error("signer failure: {0}")]
    SignerFailure(String),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Logging errors.
    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),
}

impl From<BlobError> for ScittError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::NotFound(k) => ScittError::NotFound(format!("blob key {k}")),
            other => ScittError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<MetadataError> for ScittError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::Duplicate { entry_id, .. } => {
                ScittError::DuplicateStatement { entry_id }
            }
            MetadataError::NotFound(msg) => ScittError::NotFound(msg),
            other => ScittError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<CodecError> for ScittError {
    fn from(e: CodecError) -> Self {
        ScittError::InvalidInput(e.to_string())
    }
}

impl From<ProofError> for ScittError {
    fn from(e: ProofError) -> Self {
        ScittError::ProofFailure(e.to_string())
    }
}

impl ScittError {
    /// Create an invalid-input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a storage-unavailable error.
    pub fn storage_unavailable(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    /// Create a signer-failure error.
    pub fn signer_failure(msg: impl Into<String>) -> Self {
        Self::SignerFailure(msg.into())
    }

    /// Whether the caller may retry the operation as-is.
    ///
    /// `DuplicateStatement` is terminal per the registrar's propagation
    /// policy; it is never retryable even though storage errors are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScittError::StorageUnavailable(_))
    }

    /// Stable error code for external (JSON) error responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            ScittError::InvalidInput(_) => "INVALID_INPUT",
            ScittError::DuplicateStatement { .. } => "DUPLICATE_STATEMENT",
            ScittError::NotFound(_) => "NOT_FOUND",
            ScittError::ProofFailure(_) => "PROOF_FAILURE",
            ScittError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            ScittError::SignerFailure(_) => "SIGNER_FAILURE",
            ScittError::Config(_) => "CONFIG_ERROR",
            ScittError::Logging(_) => "LOGGING_ERROR",
        }
    }
}

/// Result type alias using `ScittError`.
pub type Result<T> = std::result::Result<T, ScittError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ScittError::invalid_input("missing payload_hash_alg");
        assert!(err.to_string().contains("payload_hash_alg"));
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_duplicate_not_retryable() {
        let err = ScittError::DuplicateStatement { entry_id: 2 };
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), "DUPLICATE_STATEMENT");
    }

    #[test]
    fn test_storage_is_retryable() {
        let err = ScittError::storage_unavailable("timeout");
        assert!(err.is_retryable());
    }
}
