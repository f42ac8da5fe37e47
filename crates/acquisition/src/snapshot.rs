//! Single-shot acquisition: one frame per channel on demand.

use contracts::{
    AcquisitionSdk, AcquisitionSettings, Channel, DiagnosticEvent, DiagnosticSink, FrameMetadata,
    FrameRange,
};
use tracing::instrument;

use crate::buffer::FramePool;
use crate::error::{AcquisitionError, Result};
use crate::reader::{Pause, StreamReader};

/// Captures the next frame of each channel into a `FramePool`
pub struct SingleShot<'a, S, P> {
    sdk: &'a S,
    reader: &'a StreamReader<P>,
    diagnostics: &'a dyn DiagnosticSink,
}

impl<'a, S: AcquisitionSdk, P: Pause> SingleShot<'a, S, P> {
    pub fn new(sdk: &'a S, reader: &'a StreamReader<P>, diagnostics: &'a dyn DiagnosticSink) -> Self {
        Self {
            sdk,
            reader,
            diagnostics,
        }
    }

    /// Configure a one-frame limit, start, copy one frame per channel, stop.
    ///
    /// The engine stop is issued whenever the start succeeded, including when
    /// a poll or copy fails; the capture error wins over a stop error.
    #[instrument(name = "single_shot_capture", skip_all, fields(channels = channels.len()))]
    pub fn capture(&self, pool: &mut FramePool, channels: &[Channel]) -> Result<Vec<FrameMetadata>> {
        let settings = self.sdk.get_configuration()?.with_max_frame_count(1);
        self.sdk
            .configure(&settings)
            .map_err(AcquisitionError::configure_failed)?;
        self.sdk.start()?;

        let captured = channels
            .iter()
            .map(|&channel| self.capture_channel(pool, channel, &settings))
            .collect::<Result<Vec<_>>>();

        let stopped = self.sdk.stop();
        let captured = captured?;
        stopped?;

        tracing::debug!(channels = captured.len(), "snapshot captured");
        Ok(captured)
    }

    fn capture_channel(
        &self,
        pool: &mut FramePool,
        channel: Channel,
        settings: &AcquisitionSettings,
    ) -> Result<FrameMetadata> {
        let polled = match self.reader.poll(self.sdk, channel) {
            Ok(polled) => polled,
            Err(AcquisitionError::Timeout { channel, retries }) => {
                observability::record_poll_timeout(channel.name());
                self.diagnostics
                    .record(DiagnosticEvent::PollTimeout { channel, retries });
                return Err(AcquisitionError::timeout(channel, retries));
            }
            Err(e) => return Err(e),
        };

        let mapped = polled.region.as_ref().len();
        let copied = copy_first_frame(polled.region.as_ref(), pool, channel, settings);
        drop(polled);

        // one-frame limit: the whole mapped range goes back
        let released = self.sdk.unmap_read(channel, mapped);
        let metadata = copied?;
        released?;
        Ok(metadata)
    }
}

fn copy_first_frame(
    region: &[u8],
    pool: &mut FramePool,
    channel: Channel,
    settings: &AcquisitionSettings,
) -> Result<FrameMetadata> {
    let frame = FrameRange::parse(region)
        .and_then(|range| range.frame(0))
        .map_err(|e| AcquisitionError::frame_layout(channel, e))?;

    pool.write(channel, frame.payload)?;

    Ok(FrameMetadata {
        channel,
        camera: settings.channel(channel).camera.clone(),
        frame_id: frame.frame_id,
        timestamp_hardware: frame.timestamp_hardware,
    })
}
