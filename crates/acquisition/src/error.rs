//! Acquisition error types

use contracts::{Channel, ContractError, SampleType, SdkError};
use thiserror::Error;

/// Errors raised by the acquisition engine and the device adapter
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// A stream produced no frame within the retry budget
    #[error("no frame on {channel} after {retries} retries")]
    Timeout { channel: Channel, retries: u32 },

    /// The SDK rejected a configuration
    #[error("sdk rejected configuration: {source}")]
    ConfigureFailed {
        #[source]
        source: SdkError,
    },

    /// A copy did not fit the channel's image buffer
    #[error("{len} bytes do not fit {channel} image buffer of {capacity} bytes")]
    SizeMismatch {
        channel: Channel,
        len: usize,
        capacity: usize,
    },

    #[error("invalid image geometry {width}x{height} at {bytes_per_pixel} bytes per pixel")]
    InvalidGeometry {
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
    },

    #[error("acquisition already running")]
    AlreadyRunning,

    #[error("acquisition not running")]
    NotRunning,

    /// The consumer overflowed and the session was asked to stop on overflow
    #[error("consumer buffer overflow on {channel} at frame {frame_id}")]
    BufferOverflow { channel: Channel, frame_id: u64 },

    /// A mapped region does not follow the frame layout
    #[error("malformed frame on {channel}: {message}")]
    MalformedFrame { channel: Channel, message: String },

    #[error("channel {index} out of range ({count} channels)")]
    InvalidChannel { index: usize, count: usize },

    #[error("invalid camera selection: {message}")]
    InvalidCameraSelection { message: String },

    #[error("pixel type {0} not supported by the camera")]
    UnsupportedPixelType(SampleType),

    #[error("binning {0} not supported (expected 1, 2 or 4)")]
    InvalidBinning(u8),

    #[error("invalid exposure {0} ms")]
    InvalidExposure(f64),

    #[error("device not initialized")]
    NotInitialized,

    #[error("live acquisition worker panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AcquisitionError {
    /// Create timeout error
    pub fn timeout(channel: Channel, retries: u32) -> Self {
        Self::Timeout { channel, retries }
    }

    /// Create configure failure
    pub fn configure_failed(source: SdkError) -> Self {
        Self::ConfigureFailed { source }
    }

    /// Create camera selection error
    pub fn invalid_selection(message: impl Into<String>) -> Self {
        Self::InvalidCameraSelection {
            message: message.into(),
        }
    }

    /// Attach a channel to a frame layout error
    pub fn frame_layout(channel: Channel, err: ContractError) -> Self {
        let message = match err {
            ContractError::MalformedFrame { message } => message,
            other => other.to_string(),
        };
        Self::MalformedFrame { channel, message }
    }

    /// Whether the drain loop may continue after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, AcquisitionError>;
