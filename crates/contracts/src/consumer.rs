//! FrameConsumer trait - host-side delivery interface
//!
//! Defines how finished frames leave the engine.

use thiserror::Error;

use crate::FrameMetadata;

/// One image handed to the consumer.
///
/// Borrows the frame buffer pool; the consumer copies what it keeps.
#[derive(Debug, Clone, Copy)]
pub struct DeliveredImage<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    /// Components per pixel (1 for monochrome)
    pub components: u32,
    pub metadata: &'a FrameMetadata,
}

/// Delivery failure reported by a consumer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The consumer's backlog is full
    #[error("consumer buffer overflow")]
    BufferOverflow,

    /// The consumer refused the image for another reason
    #[error("consumer rejected image: {message}")]
    Rejected { message: String },
}

/// Downstream consumer of finished frames.
///
/// Called from the live acquisition thread as well as the caller's context,
/// so implementations synchronize internally.
pub trait FrameConsumer: Send + Sync {
    /// Consumer name (used for logging)
    fn name(&self) -> &str;

    /// Insert one image
    ///
    /// # Errors
    /// `DeliveryError::BufferOverflow` when the backlog is full
    fn insert_image(&self, image: DeliveredImage<'_>) -> Result<(), DeliveryError>;

    /// Drop every image still waiting in the backlog
    fn clear_backlog(&self);
}
