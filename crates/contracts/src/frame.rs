//! Frame layout inside an SDK mapped region
//!
//! A mapped region is a packed run of frames. Every frame starts with a
//! `FrameHeader`; the payload follows the header and the frame is padded up to
//! `bytes_of_frame`.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::{Channel, ContractError};

/// Size of the packed frame header in bytes
pub const FRAME_HEADER_BYTES: usize = std::mem::size_of::<FrameHeader>();

/// Frame alignment used by writers when padding strides
const FRAME_ALIGN: usize = 8;

/// Packed little-endian frame header written by the SDK
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameHeader {
    /// Stride of this frame, header included
    pub bytes_of_frame: u64,
    /// Monotonically increasing identifier within one stream
    pub frame_id: u64,
    /// Hardware timestamp
    pub timestamp_hardware: u64,
    /// Timestamp taken by the SDK acquisition thread
    pub timestamp_acq_thread: u64,
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    pub reserved: u32,
}

impl FrameHeader {
    /// Build a header for a payload of `width * height * bytes_per_pixel` bytes.
    ///
    /// The stride is padded to 8-byte alignment.
    pub fn new(
        frame_id: u64,
        timestamp_hardware: u64,
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
    ) -> Self {
        let payload = width as usize * height as usize * bytes_per_pixel as usize;
        Self {
            bytes_of_frame: Self::padded_stride(payload) as u64,
            frame_id,
            timestamp_hardware,
            timestamp_acq_thread: timestamp_hardware,
            width,
            height,
            bytes_per_pixel,
            reserved: 0,
        }
    }

    /// Stride needed for a payload of `payload_len` bytes
    pub fn padded_stride(payload_len: usize) -> usize {
        (FRAME_HEADER_BYTES + payload_len).div_ceil(FRAME_ALIGN) * FRAME_ALIGN
    }

    /// Payload length described by the header
    pub fn payload_len(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel as usize
    }

    /// Raw header bytes
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    fn read(bytes: &[u8]) -> Result<Self, ContractError> {
        let raw = bytes.get(..FRAME_HEADER_BYTES).ok_or_else(|| {
            ContractError::malformed_frame(format!(
                "{} bytes left, header needs {FRAME_HEADER_BYTES}",
                bytes.len()
            ))
        })?;
        bytemuck::try_pod_read_unaligned(raw)
            .map_err(|e| ContractError::malformed_frame(format!("header decode: {e}")))
    }
}

/// Borrowed, zero-copy view of one frame in a mapped region.
///
/// Valid only until the region it was parsed from is released.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub frame_id: u64,
    pub timestamp_hardware: u64,
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    /// Pixel payload, padding excluded
    pub payload: &'a [u8],
    /// Distance to the next frame in the region
    pub stride: usize,
}

/// A mapped region split into frames of a fixed stride.
///
/// The stride is taken from the first frame header.
#[derive(Debug, Clone, Copy)]
pub struct FrameRange<'a> {
    bytes: &'a [u8],
    stride: usize,
}

impl<'a> FrameRange<'a> {
    /// Parse a non-empty mapped region
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ContractError> {
        let first = FrameHeader::read(bytes)?;
        let stride = usize::try_from(first.bytes_of_frame)
            .map_err(|_| ContractError::malformed_frame("stride does not fit in memory"))?;

        if stride < FRAME_HEADER_BYTES + first.payload_len() {
            return Err(ContractError::malformed_frame(format!(
                "stride {stride} smaller than header plus payload {}",
                FRAME_HEADER_BYTES + first.payload_len()
            )));
        }
        if stride > bytes.len() {
            return Err(ContractError::malformed_frame(format!(
                "stride {stride} exceeds mapped length {}",
                bytes.len()
            )));
        }

        Ok(Self { bytes, stride })
    }

    /// Stride of every frame in this range
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Total mapped length in bytes
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of complete frames in the range
    pub fn frame_count(&self) -> usize {
        self.bytes.len() / self.stride
    }

    /// View of the `index`-th frame
    pub fn frame(&self, index: usize) -> Result<FrameView<'a>, ContractError> {
        if index >= self.frame_count() {
            return Err(ContractError::malformed_frame(format!(
                "frame index {index} out of range ({} frames)",
                self.frame_count()
            )));
        }

        let start = index * self.stride;
        let frame = &self.bytes[start..start + self.stride];
        let header = FrameHeader::read(frame)?;
        let payload_end = FRAME_HEADER_BYTES + header.payload_len();
        if payload_end > self.stride {
            return Err(ContractError::malformed_frame(format!(
                "frame {} payload of {} bytes overruns stride {}",
                header.frame_id,
                header.payload_len(),
                self.stride
            )));
        }

        Ok(FrameView {
            frame_id: header.frame_id,
            timestamp_hardware: header.timestamp_hardware,
            width: header.width,
            height: header.height,
            bytes_per_pixel: header.bytes_per_pixel,
            payload: &frame[FRAME_HEADER_BYTES..payload_end],
            stride: self.stride,
        })
    }
}

/// Per-frame metadata handed to the consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub channel: Channel,
    /// Camera device name the frame came from
    pub camera: String,
    pub frame_id: u64,
    pub timestamp_hardware: u64,
}

impl FrameMetadata {
    /// Serialized form passed along with every delivered image
    pub fn to_json(&self) -> String {
        // strings and integers only
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frames: &[(u64, &[u8])], width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        for (id, payload) in frames {
            let header = FrameHeader::new(*id, id * 100, width, height, 1);
            let start = out.len();
            out.extend_from_slice(header.as_bytes());
            out.extend_from_slice(payload);
            out.resize(start + header.bytes_of_frame as usize, 0);
        }
        out
    }

    #[test]
    fn test_header_size_and_padding() {
        assert_eq!(FRAME_HEADER_BYTES, 48);
        assert_eq!(FrameHeader::padded_stride(4), 56);
        assert_eq!(FrameHeader::padded_stride(8), 56);
        assert_eq!(FrameHeader::padded_stride(9), 64);
    }

    #[test]
    fn test_parse_frames() {
        let bytes = encode(&[(7, &[1, 2, 3, 4]), (8, &[5, 6, 7, 8])], 2, 2);
        let range = FrameRange::parse(&bytes).unwrap();

        assert_eq!(range.stride(), 56);
        assert_eq!(range.frame_count(), 2);

        let second = range.frame(1).unwrap();
        assert_eq!(second.frame_id, 8);
        assert_eq!(second.timestamp_hardware, 800);
        assert_eq!(second.payload, &[5, 6, 7, 8]);
        assert!(range.frame(2).is_err());
    }

    #[test]
    fn test_partial_trailing_frame_is_not_counted() {
        let mut bytes = encode(&[(1, &[0; 4])], 2, 2);
        bytes.extend_from_slice(&[0u8; 20]);
        let range = FrameRange::parse(&bytes).unwrap();
        assert_eq!(range.frame_count(), 1);
    }

    #[test]
    fn test_truncated_region_is_malformed() {
        let bytes = encode(&[(1, &[0; 4])], 2, 2);
        let err = FrameRange::parse(&bytes[..30]).unwrap_err();
        assert!(matches!(err, ContractError::MalformedFrame { .. }));

        let err = FrameRange::parse(&bytes[..50]).unwrap_err();
        assert!(err.to_string().contains("exceeds mapped length"), "got: {err}");
    }

    #[test]
    fn test_metadata_json() {
        let meta = FrameMetadata {
            channel: Channel::Secondary,
            camera: "simulated: empty".into(),
            frame_id: 42,
            timestamp_hardware: 9000,
        };
        let json = meta.to_json();
        assert!(json.contains("\"frame_id\":42"), "got: {json}");
        assert!(json.contains("\"channel\":\"secondary\""), "got: {json}");
    }
}
