//! LogConsumer - logs image summary via tracing

use contracts::{DeliveredImage, DeliveryError, FrameConsumer};
use tracing::{info, instrument};

use crate::metrics::ConsumerMetrics;

/// Consumer that logs image summaries and keeps nothing
pub struct LogConsumer {
    name: String,
    metrics: ConsumerMetrics,
}

impl LogConsumer {
    /// Create a new LogConsumer with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: ConsumerMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &ConsumerMetrics {
        &self.metrics
    }
}

impl FrameConsumer for LogConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_consumer_insert",
        skip(self, image),
        fields(consumer = %self.name, frame_id = image.metadata.frame_id)
    )]
    fn insert_image(&self, image: DeliveredImage<'_>) -> Result<(), DeliveryError> {
        info!(
            consumer = %self.name,
            channel = image.metadata.channel.name(),
            camera = %image.metadata.camera,
            frame_id = image.metadata.frame_id,
            timestamp = image.metadata.timestamp_hardware,
            width = image.width,
            height = image.height,
            bytes = image.pixels.len(),
            "image received"
        );
        self.metrics.inc_inserted_count();
        Ok(())
    }

    fn clear_backlog(&self) {
        // nothing buffered
    }
}
