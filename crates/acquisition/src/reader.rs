//! Stream reader: bounded-retry polling of one SDK stream.

use std::time::Duration;

use contracts::{AcquisitionSdk, Channel, RetryConfig};
use tracing::instrument;

use crate::error::{AcquisitionError, Result};

/// Blocking pause between two polls
pub trait Pause: Send + Sync {
    fn pause(&self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Non-empty region returned by a poll
pub struct Polled<R> {
    pub region: R,
    /// `map_read` calls it took, the successful one included
    pub attempts: u32,
}

/// Polls a stream until frames are available or the retry budget runs out
#[derive(Debug, Clone)]
pub struct StreamReader<P = ThreadPause> {
    retry: RetryConfig,
    pause: P,
}

impl StreamReader<ThreadPause> {
    pub fn new(retry: RetryConfig) -> Self {
        Self::with_pause(retry, ThreadPause)
    }
}

impl<P: Pause> StreamReader<P> {
    pub fn with_pause(retry: RetryConfig, pause: P) -> Self {
        Self { retry, pause }
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Map `channel` until it holds at least one byte.
    ///
    /// One initial request plus up to `max_retries` retries, pausing before
    /// each retry. The caller releases what it consumes with `unmap_read`.
    ///
    /// # Errors
    /// - `Timeout` once every retry came back empty
    /// - `Sdk` when `map_read` itself fails
    #[instrument(
        level = "trace",
        name = "stream_reader_poll",
        skip_all,
        fields(channel = %channel)
    )]
    pub fn poll<'s, S: AcquisitionSdk>(
        &self,
        sdk: &'s S,
        channel: Channel,
    ) -> Result<Polled<S::Region<'s>>> {
        let mut retries = 0u32;
        loop {
            let region = sdk.map_read(channel)?;
            if !region.as_ref().is_empty() {
                let attempts = retries + 1;
                observability::record_poll_attempts(channel.name(), attempts);
                return Ok(Polled { region, attempts });
            }
            drop(region);

            if retries >= self.retry.max_retries {
                tracing::debug!(
                    channel = %channel,
                    retries,
                    waited_ms = self.retry.budget().as_millis() as u64,
                    "stream stayed empty"
                );
                return Err(AcquisitionError::timeout(channel, retries));
            }
            retries += 1;
            self.pause.pause(self.retry.interval());
        }
    }
}
