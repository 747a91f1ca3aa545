//! Audio sample formats and channel layouts.

use serde::{Deserialize, Serialize};

/// Maximum number of channel positions in a layout.
pub const CH_MAX: usize = 11;

/// Channel positions used in layout maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelPosition {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
    FrontCenter,
    LowFrequency,
    SideLeft,
    SideRight,
    RearCenter,
    FrontLeftOfCenter,
    FrontRightOfCenter,
}

/// PCM sample encodings a device can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    U8,
    S16Le,
    S24Le,
    S32Le,
}

impl SampleFormat {
    /// Bytes per sample.
    pub const fn sample_bytes(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le => 2,
            SampleFormat::S24Le | SampleFormat::S32Le => 4,
        }
    }
}

/// The format negotiated for an open device.
///
/// `channel_layout[i]` holds the channel index carrying position `i` of
/// [`ChannelPosition`], or -1 when the position is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub frame_rate: usize,
    pub num_channels: usize,
    pub sample_format: SampleFormat,
    pub channel_layout: [i8; CH_MAX],
}

impl AudioFormat {
    /// Create a format with the default layout for the channel count.
    pub fn new(frame_rate: usize, num_channels: usize, sample_format: SampleFormat) -> Self {
        let mut fmt = AudioFormat {
            frame_rate,
            num_channels,
            sample_format,
            channel_layout: [-1; CH_MAX],
        };
        fmt.set_default_channel_layout();
        fmt
    }

    /// Bytes per frame (all channels of one sample period).
    pub const fn frame_bytes(&self) -> usize {
        self.num_channels * self.sample_format.sample_bytes()
    }

    /// Reset the layout to the default for `num_channels`.
    ///
    /// Stereo maps FL, FR; mono maps front-center; wider layouts fill
    /// positions in enum order.
    pub fn set_default_channel_layout(&mut self) {
        self.channel_layout = [-1; CH_MAX];
        match self.num_channels {
            1 => self.channel_layout[ChannelPosition::FrontCenter as usize] = 0,
            2 => {
                self.channel_layout[ChannelPosition::FrontLeft as usize] = 0;
                self.channel_layout[ChannelPosition::FrontRight as usize] = 1;
            }
            n => {
                for (i, slot) in self.channel_layout.iter_mut().take(n.min(CH_MAX)).enumerate() {
                    *slot = i as i8;
                }
            }
        }
    }

    /// Frames elapsed at this rate over `elapsed` wall-clock time.
    pub fn frames_since(&self, elapsed: std::time::Duration) -> usize {
        (elapsed.as_secs_f64() * self.frame_rate as f64) as usize
    }
}
