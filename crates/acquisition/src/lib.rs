//! # Acquisition
//!
//! 双通道帧采集与同步引擎。
//!
//! 负责：
//! - 有界重试的流轮询 (`StreamReader`)
//! - 按帧 ID 对齐两路帧 (`FrameSynchronizer`)
//! - 单帧抓拍 (`SingleShot`) 与后台实时采集 (`LiveSequencer`)
//! - 面向宿主的设备适配器 (`DualCamera`)
//!
//! ## 使用示例
//!
//! ```ignore
//! use acquisition::{DualCamera, TracingDiagnostics};
//!
//! let mut camera = DualCamera::new(config, sdk, consumer, Arc::new(TracingDiagnostics));
//! camera.initialize()?;
//!
//! // 抓拍一帧
//! camera.snap_image()?;
//!
//! // 实时采集 100 帧
//! camera.start_sequence(100, Duration::from_millis(20), false)?;
//! let report = camera.stop_sequence()?;
//! ```

mod buffer;
mod device;
mod diagnostics;
mod error;
pub mod mock;
mod reader;
mod sequencer;
mod snapshot;
mod sync;

pub use buffer::{FramePool, ImageBuffer};
pub use device::DualCamera;
pub use diagnostics::{RecordingDiagnostics, TracingDiagnostics};
pub use error::{AcquisitionError, Result};
pub use reader::{Pause, Polled, StreamReader, ThreadPause};
pub use sequencer::{
    Delivery, DrainPlan, LiveSequencer, SequenceRequest, SequencerState, SessionReport,
};
pub use snapshot::SingleShot;
pub use sync::{FrameSynchronizer, MissedFrame, SyncBatch, SyncedFrameSet};

// Re-export contracts types
pub use contracts::{
    AcquisitionSdk, Channel, DeviceConfig, DiagnosticEvent, DiagnosticSink, FrameConsumer,
    FrameMetadata, ALLOWED_BINNING,
};
