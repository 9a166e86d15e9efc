//! Error types for notesync wire data.

use thiserror::Error;

/// Errors produced while validating or encoding wire data.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// `version` is not a known scheme
    #[error("unsupported envelope version: {0}")]
    UnknownVersion(u8),

    /// `signatureVersion` disagrees with `version`
    #[error("signature version {signature_version} does not match envelope version {version}")]
    VersionMismatch {
        /// Declared envelope version.
        version: u8,
        /// Declared signature version.
        signature_version: u8,
    },

    /// Note id is not 16 lowercase hex digits
    #[error("invalid note id: {0:?}")]
    InvalidId(String),

    /// A byte field is not valid base64
    #[error("invalid base64 in {field}")]
    InvalidEncoding {
        /// Name of the offending field.
        field: &'static str,
    },

    /// JSON encoding failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
