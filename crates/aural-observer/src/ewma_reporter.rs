//! Batched EWMA power reporting for the VAD target stream.
//!
//! The audio thread owns an [`EwmaPowerReporter`] and calls it from the
//! stream processing loop; the control thread steers it through the shared
//! [`EwmaReporterControl`] flags. Reports are batched to the maximum power
//! seen in each 100 ms window.

use aural_core::pump::{MainMessage, MessageSender};
use aural_core::{Stream, StreamId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// Minimum spacing between two reports.
const REPORT_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Flags {
    enabled: AtomicBool,
    target_stream_id: AtomicU32,
}

/// Control-thread handle: gates the reporter and selects its target stream.
#[derive(Debug, Clone, Default)]
pub struct EwmaReporterControl {
    flags: Arc<Flags>,
}

impl EwmaReporterControl {
    /// Create with reporting disabled and no target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate reporting on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.flags.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Point the reporter at a specific stream.
    pub fn set_target(&self, stream_id: StreamId) {
        self.flags
            .target_stream_id
            .store(stream_id.0, Ordering::Relaxed);
    }

    /// Re-pick the target after the stream list changed: input streams win,
    /// RTC-shaped input streams win harder.
    pub fn streams_changed(&self, streams: &[Stream]) {
        let mut best_score = 0;
        for stream in streams {
            let score = target_stream_score(stream);
            if score > best_score {
                best_score = score;
                self.set_target(stream.id);
            }
        }
    }

    /// Build the audio-thread side sharing these flags.
    pub fn reporter(&self, sender: MessageSender) -> EwmaPowerReporter {
        EwmaPowerReporter {
            flags: Arc::clone(&self.flags),
            sender,
            max_power: 0.0,
            next_report: None,
        }
    }
}

fn target_stream_score(stream: &Stream) -> i32 {
    if stream.direction != aural_core::Direction::Input {
        return 0;
    }
    if stream.rtc_eligible_config() {
        return 110;
    }
    100
}

/// Audio-thread side of the reporter.
#[derive(Debug)]
pub struct EwmaPowerReporter {
    flags: Arc<Flags>,
    sender: MessageSender,
    max_power: f64,
    next_report: Option<Instant>,
}

impl EwmaPowerReporter {
    /// Whether the caller should bother computing EWMA power for the stream.
    pub fn should_calculate(&self, stream_id: StreamId) -> bool {
        self.flags.enabled.load(Ordering::Relaxed)
            && self.flags.target_stream_id.load(Ordering::Relaxed) == stream_id.0
    }

    /// Track `power` and post the batched maximum at most every 100 ms.
    pub fn report(&mut self, power: f64, now: Instant) {
        if power > self.max_power {
            self.max_power = power;
        }
        if self.next_report.is_some_and(|next| now < next) {
            return;
        }
        let msg = MainMessage::EwmaPowerReport {
            power: self.max_power,
        };
        self.next_report = Some(now + REPORT_INTERVAL);
        self.max_power = 0.0;
        if let Err(err) = self.sender.send(&msg) {
            warn!(%err, "failed to post ewma power report");
        }
    }
}
