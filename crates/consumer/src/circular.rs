//! Bounded circular backlog of delivered images.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use contracts::{DeliveredImage, DeliveryError, FrameConsumer, FrameMetadata};
use ringbuf::{traits::*, HeapRb};
use tokio::sync::Notify;
use tracing::instrument;

use crate::error::ConsumerError;
use crate::metrics::ConsumerMetrics;

/// Owned copy of a delivered image
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub pixels: Bytes,
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    pub components: u32,
    pub metadata: FrameMetadata,
    pub received_at: DateTime<Utc>,
}

impl StoredImage {
    fn copy_from(image: &DeliveredImage<'_>) -> Self {
        Self {
            pixels: Bytes::copy_from_slice(image.pixels),
            width: image.width,
            height: image.height,
            bytes_per_pixel: image.bytes_per_pixel,
            components: image.components,
            metadata: image.metadata.clone(),
            received_at: Utc::now(),
        }
    }
}

/// Fixed-capacity image backlog.
///
/// Never overwrites: a full backlog refuses the insert with
/// `DeliveryError::BufferOverflow` and leaves the recovery policy to the caller.
pub struct CircularBuffer {
    name: String,
    ring: Mutex<HeapRb<StoredImage>>,
    capacity: usize,
    notify: Notify,
    metrics: ConsumerMetrics,
}

impl CircularBuffer {
    pub fn with_capacity(capacity: usize) -> Result<Self, ConsumerError> {
        Self::named("circular", capacity)
    }

    pub fn named(name: impl Into<String>, capacity: usize) -> Result<Self, ConsumerError> {
        let name = name.into();
        if capacity == 0 {
            return Err(ConsumerError::invalid_capacity(name, capacity));
        }
        Ok(Self {
            name,
            ring: Mutex::new(HeapRb::new(capacity)),
            capacity,
            notify: Notify::new(),
            metrics: ConsumerMetrics::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.ring().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring().is_empty()
    }

    pub fn metrics(&self) -> &ConsumerMetrics {
        &self.metrics
    }

    /// Take the oldest image, if any
    pub fn pop(&self) -> Option<StoredImage> {
        let mut ring = self.ring();
        let image = ring.try_pop();
        self.metrics.set_backlog_len(ring.occupied_len());
        image
    }

    /// Wait for the next image
    pub async fn next(&self) -> StoredImage {
        loop {
            let notified = self.notify.notified();
            if let Some(image) = self.pop() {
                return image;
            }
            notified.await;
        }
    }

    fn ring(&self) -> MutexGuard<'_, HeapRb<StoredImage>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameConsumer for CircularBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "circular_insert",
        skip_all,
        fields(consumer = %self.name, frame_id = image.metadata.frame_id)
    )]
    fn insert_image(&self, image: DeliveredImage<'_>) -> Result<(), DeliveryError> {
        let expected = image.width as usize * image.height as usize * image.bytes_per_pixel as usize;
        if image.pixels.len() != expected {
            self.metrics.inc_rejected_count();
            return Err(DeliveryError::Rejected {
                message: format!(
                    "pixel length {} does not match {}x{}x{}",
                    image.pixels.len(),
                    image.width,
                    image.height,
                    image.bytes_per_pixel
                ),
            });
        }

        let mut ring = self.ring();
        if ring.is_full() {
            self.metrics.inc_overflow_count();
            tracing::debug!(capacity = self.capacity, "backlog full");
            return Err(DeliveryError::BufferOverflow);
        }
        if ring.try_push(StoredImage::copy_from(&image)).is_err() {
            self.metrics.inc_overflow_count();
            return Err(DeliveryError::BufferOverflow);
        }
        self.metrics.set_backlog_len(ring.occupied_len());
        drop(ring);

        self.metrics.inc_inserted_count();
        self.notify.notify_one();
        Ok(())
    }

    fn clear_backlog(&self) {
        let mut ring = self.ring();
        let dropped = ring.pop_iter().count();
        self.metrics.set_backlog_len(0);
        self.metrics.add_cleared_count(dropped as u64);
        tracing::debug!(consumer = %self.name, dropped, "backlog cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Channel;
    use std::sync::Arc;
    use std::time::Duration;

    fn metadata(frame_id: u64) -> FrameMetadata {
        FrameMetadata {
            channel: Channel::Primary,
            camera: "cam-a".to_string(),
            frame_id,
            timestamp_hardware: frame_id * 1000,
        }
    }

    fn insert(buffer: &CircularBuffer, frame_id: u64) -> Result<(), DeliveryError> {
        let meta = metadata(frame_id);
        let pixels = [frame_id as u8; 4];
        buffer.insert_image(DeliveredImage {
            pixels: &pixels,
            width: 2,
            height: 2,
            bytes_per_pixel: 1,
            components: 1,
            metadata: &meta,
        })
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            CircularBuffer::with_capacity(0),
            Err(ConsumerError::InvalidCapacity { capacity: 0, .. })
        ));
    }

    #[test]
    fn test_full_backlog_reports_overflow() {
        let buffer = CircularBuffer::with_capacity(2).unwrap();
        insert(&buffer, 1).unwrap();
        insert(&buffer, 2).unwrap();

        assert_eq!(insert(&buffer, 3), Err(DeliveryError::BufferOverflow));
        assert_eq!(buffer.len(), 2);
        // oldest image kept, nothing overwritten
        assert_eq!(buffer.pop().unwrap().metadata.frame_id, 1);

        let snapshot = buffer.metrics().snapshot();
        assert_eq!(snapshot.inserted_count, 2);
        assert_eq!(snapshot.overflow_count, 1);
        assert_eq!(snapshot.backlog_len, 1);
    }

    #[test]
    fn test_clear_backlog_makes_room() {
        let buffer = CircularBuffer::with_capacity(1).unwrap();
        insert(&buffer, 1).unwrap();
        assert!(insert(&buffer, 2).is_err());

        buffer.clear_backlog();
        assert!(buffer.is_empty());
        insert(&buffer, 2).unwrap();

        assert_eq!(buffer.metrics().cleared_count(), 1);
        assert_eq!(buffer.pop().unwrap().pixels.as_ref(), &[2, 2, 2, 2]);
    }

    #[test]
    fn test_geometry_mismatch_rejected() {
        let buffer = CircularBuffer::with_capacity(4).unwrap();
        let meta = metadata(7);
        let err = buffer
            .insert_image(DeliveredImage {
                pixels: &[0u8; 3],
                width: 2,
                height: 2,
                bytes_per_pixel: 1,
                components: 1,
                metadata: &meta,
            })
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Rejected { .. }));
        assert!(buffer.is_empty());
        assert_eq!(buffer.metrics().rejected_count(), 1);
    }

    #[tokio::test]
    async fn test_next_waits_for_insert() {
        let buffer = Arc::new(CircularBuffer::with_capacity(4).unwrap());

        let producer = Arc::clone(&buffer);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            insert(&producer, 42).unwrap();
        });

        let image = tokio::time::timeout(Duration::from_secs(1), buffer.next())
            .await
            .unwrap();
        assert_eq!(image.metadata.frame_id, 42);
        assert_eq!(image.width, 2);
        handle.await.unwrap();
    }
}
