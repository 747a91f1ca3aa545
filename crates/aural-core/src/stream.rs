//! Minimal stream model shared by routing, detection, and accounting.

use crate::types::{ClientType, Direction, StreamType};
use serde::{Deserialize, Serialize};

/// Server-assigned stream identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u32);

/// The attributes of an attached stream the control plane cares about.
///
/// The audio-thread half of a stream (shm, DSP pipeline) lives elsewhere;
/// this carries only what routing, RTC detection, and stream accounting read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub id: StreamId,
    pub direction: Direction,
    pub stream_type: StreamType,
    pub client_type: ClientType,
    /// Frames between audio callbacks.
    pub cb_threshold: u32,
    /// Index of the device the stream is attached to.
    pub dev_index: u32,
    /// Whether an audio-processing-module instance is attached.
    pub has_apm: bool,
    /// Whether the client holds the capture permission (input only).
    pub has_permission: bool,
}

impl Stream {
    /// Whether the stream's shape could belong to an RTC session.
    ///
    /// True means "possibly RTC"; the detector applies the device-range check
    /// on top of this.
    pub fn rtc_eligible_config(&self) -> bool {
        self.cb_threshold == 480
            && matches!(
                self.client_type,
                ClientType::Chrome | ClientType::Lacros | ClientType::Test
            )
    }
}
