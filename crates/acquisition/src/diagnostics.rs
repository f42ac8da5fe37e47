//! Diagnostic sinks

use std::sync::{Mutex, PoisonError};

use contracts::{DiagnosticEvent, DiagnosticSink};

/// Forwards every event to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::MissedFrame {
                channel,
                index,
                expected,
                actual,
            } => tracing::warn!(
                target: "dualcam::diagnostics",
                channel = %channel,
                index,
                expected,
                actual,
                "missed frame"
            ),
            DiagnosticEvent::BufferOverflow { channel, frame_id } => tracing::warn!(
                target: "dualcam::diagnostics",
                channel = %channel,
                frame_id,
                "consumer buffer overflow"
            ),
            DiagnosticEvent::PollTimeout { channel, retries } => tracing::warn!(
                target: "dualcam::diagnostics",
                channel = %channel,
                retries,
                "poll timed out"
            ),
            DiagnosticEvent::DeliveryRejected {
                channel,
                frame_id,
                message,
            } => tracing::warn!(
                target: "dualcam::diagnostics",
                channel = %channel,
                frame_id,
                %message,
                "delivery rejected"
            ),
            DiagnosticEvent::Sdk(record) if record.is_error => {
                tracing::error!(target: "dualcam::sdk", "{record}")
            }
            DiagnosticEvent::Sdk(record) => tracing::info!(target: "dualcam::sdk", "{record}"),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event recorded so far
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&DiagnosticEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| predicate(e))
            .count()
    }
}

impl DiagnosticSink for RecordingDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
