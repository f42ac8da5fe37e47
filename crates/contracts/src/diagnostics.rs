//! Diagnostic events and the sink they are reported to
//!
//! Components that talk to the SDK receive a sink explicitly; there is no
//! process-wide "current device" to log through.

use std::fmt;

use crate::Channel;

/// Message emitted by the SDK's own logger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkLogRecord {
    pub is_error: bool,
    pub file: String,
    pub line: u32,
    pub function: String,
    pub message: String,
}

impl fmt::Display for SdkLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_error {
            f.write_str("ERROR ")?;
        }
        write!(
            f,
            "{}({}) - {}: {}",
            self.file, self.line, self.function, self.message
        )
    }
}

/// Observable, non-fatal event raised during acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// A stream's frame identifier broke continuity within a batch
    MissedFrame {
        channel: Channel,
        /// Position within the synchronized batch
        index: usize,
        expected: u64,
        actual: u64,
    },

    /// The consumer reported a full backlog
    BufferOverflow { channel: Channel, frame_id: u64 },

    /// A poll exhausted its retry budget
    PollTimeout { channel: Channel, retries: u32 },

    /// The consumer refused an image for a reason other than overflow
    DeliveryRejected {
        channel: Channel,
        frame_id: u64,
        message: String,
    },

    /// Forwarded SDK log message
    Sdk(SdkLogRecord),
}

/// Receiver of diagnostic events
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: DiagnosticEvent);
}

/// Sink that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDiagnostics;

impl DiagnosticSink for NullDiagnostics {
    fn record(&self, _event: DiagnosticEvent) {}
}
