//! DeviceConfig - device adapter configuration
//!
//! Loaded by `config_loader` from TOML/JSON and handed to the device adapter.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::SampleType;

/// Camera selection meaning "no camera on this stream"
pub const CAMERA_NONE: &str = "None";

/// Name prefix the SDK uses for its simulated cameras
pub const SIMULATED_PREFIX: &str = "simulated";

/// Binning factors the device accepts
pub const ALLOWED_BINNING: [u8; 3] = [1, 2, 4];

/// Device adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DeviceConfig {
    /// Camera selection per stream
    #[validate(nested)]
    pub cameras: CameraConfig,

    /// Which channels are delivered to the consumer
    #[serde(default)]
    pub delivery: DeliveryMode,

    /// Stream polling retry budget
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,

    /// Initial exposure in milliseconds
    #[serde(default = "default_exposure_ms")]
    #[validate(range(min = 0.001, max = 3600000.0))]
    pub exposure_ms: f64,

    /// Initial pixel type
    #[serde(default)]
    pub pixel_type: SampleType,

    /// Initial binning (1, 2 or 4)
    #[serde(default = "default_binning")]
    pub binning: u8,

    /// Capacity of the reference circular buffer consumer
    #[serde(default = "default_consumer_capacity")]
    #[validate(range(min = 1))]
    pub consumer_capacity: usize,
}

/// Camera device names for the two streams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CameraConfig {
    /// Camera on stream 0
    #[validate(length(min = 1))]
    pub primary: String,

    /// Camera on stream 1 (`None` for single-camera mode)
    #[serde(default = "default_camera_none")]
    pub secondary: String,
}

impl CameraConfig {
    /// Single-camera selection
    pub fn single(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: CAMERA_NONE.to_string(),
        }
    }

    /// Dual-camera selection
    pub fn dual(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// Whether both streams are in use
    pub fn is_dual(&self) -> bool {
        self.secondary != CAMERA_NONE
    }

    /// Number of active streams
    pub fn channel_count(&self) -> usize {
        if self.is_dual() {
            2
        } else {
            1
        }
    }

    /// Why this selection cannot be opened, if it cannot
    pub fn selection_error(&self) -> Option<String> {
        if self.primary == CAMERA_NONE {
            return Some("camera 1 must be selected".to_string());
        }
        if self.primary == self.secondary {
            return Some(format!(
                "camera 1 and camera 2 must differ (both '{}')",
                self.primary
            ));
        }
        if self.is_dual() && is_simulated(&self.primary) != is_simulated(&self.secondary) {
            return Some("simulated and physical cameras cannot be mixed".to_string());
        }
        None
    }
}

fn is_simulated(camera: &str) -> bool {
    camera.starts_with(SIMULATED_PREFIX)
}

/// Which channels reach the consumer during live acquisition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Every active channel, channel 0 first
    #[default]
    MultiChannel,
    /// Only the currently selected camera
    SingleChannel,
}

/// Retry budget for polling a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    /// Pause between two polls in milliseconds
    #[validate(range(min = 1, max = 1000))]
    pub interval_ms: u64,

    /// Retries after the first empty poll
    #[validate(range(min = 1))]
    pub max_retries: u32,
}

impl RetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Worst-case time a poll may block
    pub fn budget(&self) -> Duration {
        self.interval() * self.max_retries
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5,
            max_retries: 1000,
        }
    }
}

impl DeviceConfig {
    /// Configuration with defaults for everything but the cameras
    pub fn new(cameras: CameraConfig) -> Self {
        Self {
            cameras,
            delivery: DeliveryMode::default(),
            retry: RetryConfig::default(),
            exposure_ms: default_exposure_ms(),
            pixel_type: SampleType::default(),
            binning: default_binning(),
            consumer_capacity: default_consumer_capacity(),
        }
    }
}

fn default_camera_none() -> String {
    CAMERA_NONE.to_string()
}

fn default_exposure_ms() -> f64 {
    20.0
}

fn default_binning() -> u8 {
    1
}

fn default_consumer_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_budget() {
        let retry = RetryConfig::default();
        assert_eq!(retry.interval(), Duration::from_millis(5));
        assert_eq!(retry.budget(), Duration::from_secs(5));
    }

    #[test]
    fn test_camera_modes() {
        assert!(!CameraConfig::single("cam-a").is_dual());
        assert_eq!(CameraConfig::dual("cam-a", "cam-b").channel_count(), 2);
    }

    #[test]
    fn test_camera_selection_rules() {
        assert!(CameraConfig::single("cam-a").selection_error().is_none());
        assert!(CameraConfig::single(CAMERA_NONE).selection_error().is_some());
        assert!(CameraConfig::dual("cam-a", "cam-a").selection_error().is_some());
        assert!(CameraConfig::dual("simulated: radial sin", "cam-b")
            .selection_error()
            .is_some());
        assert!(CameraConfig::dual("simulated: radial sin", "simulated: empty")
            .selection_error()
            .is_none());
    }

    #[test]
    fn test_range_validation() {
        let mut config = DeviceConfig::new(CameraConfig::single("cam-a"));
        assert!(config.validate().is_ok());

        config.retry.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_from_json() {
        let config: DeviceConfig =
            serde_json::from_str(r#"{ "cameras": { "primary": "cam-a" } }"#).unwrap();
        assert_eq!(config.cameras.secondary, CAMERA_NONE);
        assert_eq!(config.retry.max_retries, 1000);
        assert_eq!(config.binning, 1);
        assert_eq!(config.delivery, DeliveryMode::MultiChannel);
    }
}
