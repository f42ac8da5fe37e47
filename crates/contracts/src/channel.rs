//! Channel - identifies one physical camera stream

use serde::{Deserialize, Serialize};
use std::fmt;

/// One physical camera stream.
///
/// Dual mode uses both channels, single mode uses `Primary` only.
/// The ordinal doubles as the SDK stream index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Stream 0 (`Camera-1`)
    Primary,
    /// Stream 1 (`Camera-2`)
    Secondary,
}

impl Channel {
    /// Both channels in delivery order
    pub const ALL: [Channel; 2] = [Channel::Primary, Channel::Secondary];

    /// Stream ordinal (0 or 1)
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Channel::Primary => 0,
            Channel::Secondary => 1,
        }
    }

    /// Channel for a stream ordinal
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Channel::Primary),
            1 => Some(Channel::Secondary),
            _ => None,
        }
    }

    /// Active channels for a channel count (1 or 2)
    pub fn active(count: usize) -> &'static [Channel] {
        &Self::ALL[..count.min(Self::ALL.len())]
    }

    /// Host-facing channel name
    pub fn name(self) -> &'static str {
        match self {
            Channel::Primary => "Camera-1",
            Channel::Secondary => "Camera-2",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
