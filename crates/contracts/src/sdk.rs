//! AcquisitionSdk trait - camera SDK abstraction
//!
//! The SDK owns the physical streams and their frame rings. The engine only
//! sees mapped regions and hands consumed bytes back through `unmap_read`.

use crate::{AcquisitionSettings, CapabilityMetadata, Channel, SdkError};

/// Camera acquisition SDK.
///
/// All calls take `&self`; implementations synchronize internally so that the
/// background drain loop and the caller's context can share one handle.
///
/// # Mapped regions
///
/// `map_read` returns a zero-copy view over the frames currently available on
/// a stream. An empty region means no frame is ready yet. The region must be
/// dropped before `unmap_read` is called for the same channel.
pub trait AcquisitionSdk: Send + Sync {
    /// Zero-copy view over a stream's available frames
    type Region<'a>: AsRef<[u8]>
    where
        Self: 'a;

    /// Submit a complete configuration
    fn configure(&self, settings: &AcquisitionSettings) -> Result<(), SdkError>;

    /// Read back the active configuration
    fn get_configuration(&self) -> Result<AcquisitionSettings, SdkError>;

    /// Query capability metadata (sensor shape, pixel types)
    fn get_configuration_metadata(&self) -> Result<CapabilityMetadata, SdkError>;

    /// Start the acquisition engine
    fn start(&self) -> Result<(), SdkError>;

    /// Stop the acquisition engine after in-flight frames
    fn stop(&self) -> Result<(), SdkError>;

    /// Stop the acquisition engine immediately
    fn abort(&self) -> Result<(), SdkError>;

    /// Map the currently available frames of one stream
    fn map_read(&self, channel: Channel) -> Result<Self::Region<'_>, SdkError>;

    /// Return `consumed_bytes` from the front of the stream's ring
    fn unmap_read(&self, channel: Channel, consumed_bytes: usize) -> Result<(), SdkError>;
}
