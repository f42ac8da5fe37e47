//! Frame synchronizer: lockstep alignment of mapped channel ranges.

use contracts::{Channel, DiagnosticEvent, DiagnosticSink, FrameRange, FrameView};

use crate::error::{AcquisitionError, Result};

/// Frames of all active channels for one acquisition instant
#[derive(Debug, Clone)]
pub struct SyncedFrameSet<'a> {
    /// Identifier of channel 0's frame
    pub frame_id: u64,
    /// Channel 0 first
    pub frames: Vec<(Channel, FrameView<'a>)>,
}

impl<'a> SyncedFrameSet<'a> {
    pub fn frame(&self, channel: Channel) -> Option<&FrameView<'a>> {
        self.frames
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, view)| view)
    }
}

/// Identifier discontinuity found while aligning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissedFrame {
    pub channel: Channel,
    /// Position within the batch
    pub index: usize,
    pub expected: u64,
    pub actual: u64,
}

/// Result of aligning one set of mapped ranges
#[derive(Debug, Default)]
pub struct SyncBatch<'a> {
    /// Sets in increasing position order
    pub sets: Vec<SyncedFrameSet<'a>>,
    pub missed: Vec<MissedFrame>,
    strides: Vec<(Channel, usize)>,
}

impl<'a> SyncBatch<'a> {
    /// Frames available in lockstep across all channels
    pub fn batch_size(&self) -> usize {
        self.sets.len()
    }

    /// Bytes to release on every channel after consuming `frames` sets
    pub fn consumed_bytes(&self, frames: usize) -> Vec<(Channel, usize)> {
        self.strides
            .iter()
            .map(|&(channel, stride)| (channel, frames * stride))
            .collect()
    }
}

/// Aligns per-channel frame ranges by frame identifier
pub struct FrameSynchronizer<'d> {
    diagnostics: &'d dyn DiagnosticSink,
}

impl<'d> FrameSynchronizer<'d> {
    pub fn new(diagnostics: &'d dyn DiagnosticSink) -> Self {
        Self { diagnostics }
    }

    /// Split `ranges` (channel 0 first) into synchronized frame sets.
    ///
    /// The batch holds as many sets as the shortest range has frames. Every
    /// channel's i-th frame is expected to carry channel 0's first identifier
    /// plus i; a mismatch is reported as a `MissedFrame` diagnostic and the set
    /// is still produced.
    pub fn align<'a>(&self, ranges: &[(Channel, FrameRange<'a>)]) -> Result<SyncBatch<'a>> {
        let batch_size = ranges
            .iter()
            .map(|(_, range)| range.frame_count())
            .min()
            .unwrap_or(0);

        let mut batch = SyncBatch {
            sets: Vec::with_capacity(batch_size),
            missed: Vec::new(),
            strides: ranges
                .iter()
                .map(|(channel, range)| (*channel, range.stride()))
                .collect(),
        };
        if batch_size == 0 {
            return Ok(batch);
        }

        let (first_channel, first_range) = &ranges[0];
        let start_frame_id = frame_at(*first_channel, first_range, 0)?.frame_id;

        for index in 0..batch_size {
            let expected = start_frame_id.wrapping_add(index as u64);
            let mut frames = Vec::with_capacity(ranges.len());

            for (channel, range) in ranges {
                let view = frame_at(*channel, range, index)?;
                if view.frame_id != expected {
                    let missed = MissedFrame {
                        channel: *channel,
                        index,
                        expected,
                        actual: view.frame_id,
                    };
                    self.report_missed(missed);
                    batch.missed.push(missed);
                }
                frames.push((*channel, view));
            }

            batch.sets.push(SyncedFrameSet {
                frame_id: frames[0].1.frame_id,
                frames,
            });
        }

        Ok(batch)
    }

    fn report_missed(&self, missed: MissedFrame) {
        tracing::warn!(
            channel = %missed.channel,
            index = missed.index,
            expected = missed.expected,
            actual = missed.actual,
            "frame identifier discontinuity"
        );
        observability::record_missed_frame(missed.channel.name());
        self.diagnostics.record(DiagnosticEvent::MissedFrame {
            channel: missed.channel,
            index: missed.index,
            expected: missed.expected,
            actual: missed.actual,
        });
    }
}

fn frame_at<'a>(channel: Channel, range: &FrameRange<'a>, index: usize) -> Result<FrameView<'a>> {
    range
        .frame(index)
        .map_err(|e| AcquisitionError::frame_layout(channel, e))
}
