//! Acquisition settings submitted to the SDK
//!
//! Settings are rebuilt as a whole and submitted in one `configure` call;
//! nothing mutates a shared settings value in place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Channel;

/// Frame-count limit meaning "acquire until stopped"
pub const UNBOUNDED_FRAME_COUNT: u64 = u64::MAX;

/// Pixel sample type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    #[default]
    U8,
    U16,
}

impl SampleType {
    /// Capability mask bit for this sample type
    const fn mask_bit(self) -> u32 {
        match self {
            SampleType::U8 => 0x01,
            SampleType::U16 => 0x02,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 => 2,
        }
    }

    pub fn bit_depth(self) -> u32 {
        self.bytes_per_pixel() * 8
    }

    /// Host-facing property value
    pub fn label(self) -> &'static str {
        match self {
            SampleType::U8 => "8bit",
            SampleType::U16 => "16bit",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SampleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "8bit" => Ok(SampleType::U8),
            "16bit" => Ok(SampleType::U16),
            other => Err(format!("unknown pixel type '{other}'")),
        }
    }
}

/// Image extent in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub width: u32,
    pub height: u32,
}

/// Sensor offset of the region of interest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    pub x: u32,
    pub y: u32,
}

/// Settings of one camera stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Camera device name, empty when the stream is unused
    pub camera: String,
    pub binning: u8,
    pub shape: Shape,
    pub offset: Offset,
    pub exposure_time_us: f32,
    pub pixel_type: SampleType,
    /// Frames to acquire before the stream stops on its own
    pub max_frame_count: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            camera: String::new(),
            binning: 1,
            shape: Shape::default(),
            offset: Offset::default(),
            exposure_time_us: 0.0,
            pixel_type: SampleType::U8,
            max_frame_count: 1,
        }
    }
}

/// Complete SDK configuration for both streams
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    pub channels: [ChannelSettings; 2],
}

impl AcquisitionSettings {
    /// Settings of one channel
    pub fn channel(&self, channel: Channel) -> &ChannelSettings {
        &self.channels[channel.index()]
    }

    /// Frame-count limit on every stream (0 means unbounded)
    pub fn with_max_frame_count(mut self, count: u64) -> Self {
        let limit = if count == 0 {
            UNBOUNDED_FRAME_COUNT
        } else {
            count
        };
        for settings in &mut self.channels {
            settings.max_frame_count = limit;
        }
        self
    }

    /// Pixel type on every stream
    pub fn with_pixel_type(mut self, pixel_type: SampleType) -> Self {
        for settings in &mut self.channels {
            settings.pixel_type = pixel_type;
        }
        self
    }

    /// Binning on every stream
    pub fn with_binning(mut self, binning: u8) -> Self {
        for settings in &mut self.channels {
            settings.binning = binning;
        }
        self
    }

    /// Exposure on every stream
    pub fn with_exposure_us(mut self, exposure_time_us: f32) -> Self {
        for settings in &mut self.channels {
            settings.exposure_time_us = exposure_time_us;
        }
        self
    }

    /// Region of interest on every stream
    pub fn with_roi(mut self, offset: Offset, shape: Shape) -> Self {
        for settings in &mut self.channels {
            settings.offset = offset;
            settings.shape = shape;
        }
        self
    }

    /// Camera device bound to one stream
    pub fn with_camera(mut self, channel: Channel, camera: impl Into<String>) -> Self {
        self.channels[channel.index()].camera = camera.into();
        self
    }
}

/// Capabilities of one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCapabilities {
    /// Full sensor extent
    pub max_shape: Shape,
    /// Bit mask of supported sample types (bit 0: u8, bit 1: u16)
    pub supported_pixel_types: u32,
}

impl ChannelCapabilities {
    /// Whether the stream accepts a sample type.
    ///
    /// An empty mask means the SDK did not report types; 8-bit is assumed.
    pub fn supports(&self, pixel_type: SampleType) -> bool {
        match pixel_type {
            SampleType::U8 => {
                self.supported_pixel_types == 0
                    || self.supported_pixel_types & SampleType::U8.mask_bit() != 0
            }
            SampleType::U16 => self.supported_pixel_types & SampleType::U16.mask_bit() != 0,
        }
    }

    /// Supported sample types in ascending depth
    pub fn pixel_types(&self) -> Vec<SampleType> {
        [SampleType::U8, SampleType::U16]
            .into_iter()
            .filter(|t| self.supports(*t))
            .collect()
    }
}

/// Capability metadata reported by the SDK
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMetadata {
    pub channels: [ChannelCapabilities; 2],
}

impl CapabilityMetadata {
    pub fn channel(&self, channel: Channel) -> &ChannelCapabilities {
        &self.channels[channel.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_frame_count_is_unbounded() {
        let settings = AcquisitionSettings::default().with_max_frame_count(0);
        assert!(settings
            .channels
            .iter()
            .all(|c| c.max_frame_count == UNBOUNDED_FRAME_COUNT));

        let settings = settings.with_max_frame_count(3);
        assert_eq!(settings.channel(Channel::Secondary).max_frame_count, 3);
    }

    #[test]
    fn test_rebuild_leaves_original_untouched() {
        let original = AcquisitionSettings::default();
        let rebuilt = original.clone().with_pixel_type(SampleType::U16).with_binning(2);

        assert_eq!(original.channel(Channel::Primary).pixel_type, SampleType::U8);
        assert_eq!(rebuilt.channel(Channel::Primary).pixel_type, SampleType::U16);
        assert_eq!(rebuilt.channel(Channel::Secondary).binning, 2);
    }

    #[test]
    fn test_pixel_type_labels() {
        assert_eq!("16bit".parse::<SampleType>(), Ok(SampleType::U16));
        assert_eq!(SampleType::U8.to_string(), "8bit");
        assert!("32bit".parse::<SampleType>().is_err());
        assert_eq!(SampleType::U16.bit_depth(), 16);
    }

    #[test]
    fn test_supported_pixel_types() {
        let unreported = ChannelCapabilities::default();
        assert_eq!(unreported.pixel_types(), vec![SampleType::U8]);

        let both = ChannelCapabilities {
            supported_pixel_types: 0x03,
            ..Default::default()
        };
        assert_eq!(both.pixel_types(), vec![SampleType::U8, SampleType::U16]);

        let wide_only = ChannelCapabilities {
            supported_pixel_types: 0x02,
            ..Default::default()
        };
        assert_eq!(wide_only.pixel_types(), vec![SampleType::U16]);
    }
}
