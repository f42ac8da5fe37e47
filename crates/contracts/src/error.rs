//! Layered error definitions
//!
//! Categorized by source: config / frame layout / sdk

use thiserror::Error;

/// Unified contract error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Frame Layout Errors =====
    /// Mapped region does not follow the frame layout
    #[error("malformed frame: {message}")]
    MalformedFrame { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create malformed frame error
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }
}

/// Failure reported by the acquisition SDK
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    /// A call returned a non-ok status
    #[error("sdk call '{call}' failed with status {status}")]
    Status { call: &'static str, status: i32 },

    /// The SDK could not be reached or was shut down
    #[error("sdk unavailable: {message}")]
    Unavailable { message: String },
}

impl SdkError {
    /// Create status error
    pub fn status(call: &'static str, status: i32) -> Self {
        Self::Status { call, status }
    }
}
