//! Core data types passed between the camera, the motors and the server.

use serde::Serialize;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Largest PWM duty accepted by the wheel motors, in either direction
pub const MAX_DUTY: i32 = 4095;

/// One encoded image (JPEG) as produced by the camera
///
/// Cloning is cheap: all clones share the same immutable bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Arc<[u8]>);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({} bytes)", self.0.len())
    }
}

/// Which listener a client connected through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Command,
    Video,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Command => f.write_str("command"),
            ChannelKind::Video => f.write_str("video"),
        }
    }
}

/// Signed duty for each of the four wheels
///
/// Order: left upper, left lower, right upper, right lower.
/// Positive values drive forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WheelSpeeds {
    pub left_upper: i32,
    pub left_lower: i32,
    pub right_upper: i32,
    pub right_lower: i32,
}

impl WheelSpeeds {
    pub const STOP: Self = Self::uniform(0);

    pub const fn new(left_upper: i32, left_lower: i32, right_upper: i32, right_lower: i32) -> Self {
        Self {
            left_upper,
            left_lower,
            right_upper,
            right_lower,
        }
    }

    pub const fn uniform(duty: i32) -> Self {
        Self::new(duty, duty, duty, duty)
    }

    /// Clamp every wheel to [-MAX_DUTY, MAX_DUTY]
    pub fn clamped(self) -> Self {
        let c = |d: i32| d.clamp(-MAX_DUTY, MAX_DUTY);
        Self::new(
            c(self.left_upper),
            c(self.left_lower),
            c(self.right_upper),
            c(self.right_lower),
        )
    }

    /// Wheels in motor-index order (0..4)
    pub fn as_array(&self) -> [i32; 4] {
        [
            self.left_upper,
            self.left_lower,
            self.right_upper,
            self.right_lower,
        ]
    }
}

impl From<[i32; 4]> for WheelSpeeds {
    fn from(s: [i32; 4]) -> Self {
        Self::new(s[0], s[1], s[2], s[3])
    }
}
