//! Exponentially weighted moving average of signal power.

/// Per-device/stream power meter.
///
/// Power is averaged over 10 ms steps so the smoothing is rate independent.
/// Disabled meters ignore updates entirely (BT offload paths have no PCM to
/// meter).
#[derive(Debug, Clone)]
pub struct EwmaPower {
    enabled: bool,
    calculated: bool,
    power: f64,
    step_frames: usize,
}

const SMOOTH_FACTOR: f64 = 0.3;

impl EwmaPower {
    /// Create a meter for a stream at `frame_rate`.
    pub fn new(frame_rate: usize) -> Self {
        EwmaPower {
            enabled: true,
            calculated: false,
            power: 0.0,
            step_frames: frame_rate / 100,
        }
    }

    /// Stop metering; subsequent updates are no-ops.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Whether the meter has produced at least one value.
    pub fn calculated(&self) -> bool {
        self.calculated
    }

    /// The current smoothed power, mean-square of normalized samples.
    pub fn power(&self) -> f64 {
        self.power
    }

    /// Feed interleaved S16 samples of `num_channels`; only channel 0 is
    /// metered.
    pub fn update(&mut self, samples: &[i16], num_channels: usize) {
        if !self.enabled || num_channels == 0 || self.step_frames == 0 {
            return;
        }
        let frames: Vec<f64> = samples
            .iter()
            .step_by(num_channels)
            .map(|&s| f64::from(s) / f64::from(i16::MAX))
            .collect();
        for chunk in frames.chunks(self.step_frames) {
            if chunk.is_empty() {
                continue;
            }
            let mean_sq = chunk.iter().map(|s| s * s).sum::<f64>() / chunk.len() as f64;
            if self.calculated {
                self.power = SMOOTH_FACTOR * mean_sq + (1.0 - SMOOTH_FACTOR) * self.power;
            } else {
                self.power = mean_sq;
                self.calculated = true;
            }
        }
    }
}
