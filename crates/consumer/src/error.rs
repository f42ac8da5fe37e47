//! Consumer error types

use thiserror::Error;

/// Consumer construction errors
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Backlog capacity must hold at least one image
    #[error("invalid capacity for consumer '{name}': {capacity}")]
    InvalidCapacity { name: String, capacity: usize },
}

impl ConsumerError {
    /// Create an invalid capacity error
    pub fn invalid_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self::InvalidCapacity {
            name: name.into(),
            capacity,
        }
    }
}
