//! Per-channel image buffers.
//!
//! The pool owns one pixel buffer per active channel. Frames are copied out of
//! the SDK's mapped region into these buffers before delivery, so nothing
//! downstream ever holds a borrow of SDK memory.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::Channel;

use crate::error::{AcquisitionError, Result};

/// Owned pixel storage of one channel
pub struct ImageBuffer {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
}

impl ImageBuffer {
    fn new(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        let capacity = width as usize * height as usize * bytes_per_pixel as usize;
        Self {
            pixels: vec![0; capacity],
            width,
            height,
            bytes_per_pixel,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.bytes_per_pixel
    }

    /// Buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.pixels.len()
    }
}

impl fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes_per_pixel", &self.bytes_per_pixel)
            .finish()
    }
}

/// Frame buffer pool, one `ImageBuffer` per channel
#[derive(Debug, Default)]
pub struct FramePool {
    buffers: Vec<ImageBuffer>,
}

impl FramePool {
    /// Empty pool; call `resize` before use
    pub fn new() -> Self {
        Self::default()
    }

    /// Reallocate every channel buffer.
    ///
    /// Must not be called while a capture or drain cycle owns the pool.
    pub fn resize(
        &mut self,
        channel_count: usize,
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
    ) -> Result<()> {
        if !(1..=Channel::ALL.len()).contains(&channel_count) {
            return Err(AcquisitionError::InvalidChannel {
                index: channel_count,
                count: Channel::ALL.len(),
            });
        }
        if width == 0 || height == 0 || bytes_per_pixel == 0 {
            return Err(AcquisitionError::InvalidGeometry {
                width,
                height,
                bytes_per_pixel,
            });
        }

        self.buffers = (0..channel_count)
            .map(|_| ImageBuffer::new(width, height, bytes_per_pixel))
            .collect();

        tracing::debug!(
            channels = channel_count,
            width,
            height,
            bytes_per_pixel,
            "frame pool resized"
        );
        Ok(())
    }

    /// Number of channel buffers
    pub fn channel_count(&self) -> usize {
        self.buffers.len()
    }

    /// Copy `data` into the front of a channel's buffer.
    ///
    /// # Errors
    /// `SizeMismatch` when `data` is longer than the buffer.
    pub fn write(&mut self, channel: Channel, data: &[u8]) -> Result<()> {
        let count = self.buffers.len();
        let buffer = self
            .buffers
            .get_mut(channel.index())
            .ok_or(AcquisitionError::InvalidChannel {
                index: channel.index(),
                count,
            })?;

        if data.len() > buffer.capacity() {
            return Err(AcquisitionError::SizeMismatch {
                channel,
                len: data.len(),
                capacity: buffer.capacity(),
            });
        }

        buffer.pixels[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read-only view of a channel's buffer
    pub fn read(&self, channel: Channel) -> Result<&ImageBuffer> {
        self.buffers
            .get(channel.index())
            .ok_or(AcquisitionError::InvalidChannel {
                index: channel.index(),
                count: self.buffers.len(),
            })
    }
}

/// Lock a shared pool, recovering the guard if a holder panicked.
///
/// A panic mid-copy leaves stale pixels at worst; the buffers stay well formed.
pub(crate) fn lock_pool(pool: &Mutex<FramePool>) -> MutexGuard<'_, FramePool> {
    pool.lock().unwrap_or_else(PoisonError::into_inner)
}
