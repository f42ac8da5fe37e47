//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Memory model
//! - The acquisition SDK owns the frame ring; it is exposed as a mapped region
//!   that stays valid until the matching `unmap_read`
//! - `FrameView` borrows that region and never owns pixel memory
//! - `frame_id` is monotonically increasing per stream and drives alignment

mod channel;
mod consumer;
mod device_config;
mod diagnostics;
mod error;
mod frame;
mod sdk;
mod settings;

pub use channel::Channel;
pub use consumer::{DeliveredImage, DeliveryError, FrameConsumer};
pub use device_config::{
    ALLOWED_BINNING, CameraConfig, DeliveryMode, DeviceConfig, RetryConfig, CAMERA_NONE,
    SIMULATED_PREFIX,
};
pub use diagnostics::{DiagnosticEvent, DiagnosticSink, NullDiagnostics, SdkLogRecord};
pub use error::{ContractError, SdkError};
pub use frame::{FrameHeader, FrameMetadata, FrameRange, FrameView, FRAME_HEADER_BYTES};
pub use sdk::AcquisitionSdk;
pub use settings::{
    AcquisitionSettings, CapabilityMetadata, ChannelCapabilities, ChannelSettings, Offset,
    SampleType, Shape, UNBOUNDED_FRAME_COUNT,
};
