//! Speak-on-mute detection.
//!
//! The pure detector keeps a 64-bit shift register of recent voice-activity
//! flags and reports an event when enough of the last `window` samples were
//! positive, rate limited. The monitor wraps it with the control-plane
//! policy: events only fire while system capture mute is engaged, and the
//! VAD target stream follows the stream list.

use crate::ObserverServer;
use aural_core::{Stream, StreamId};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Configuration rejected by the detector.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpeakOnMuteError {
    /// The register holds 63 usable samples; 64 would shift out of range.
    #[error("detection window {0} exceeds 63")]
    WindowTooLarge(u32),
    /// A threshold above the window can never be reached.
    #[error("threshold {threshold} exceeds window {window}")]
    ThresholdTooLarge { threshold: u32, window: u32 },
}

/// Detector parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeakOnMuteConfig {
    /// Samples considered by the popcount, at most 63.
    pub detection_window_size: u32,
    /// Positive samples within the window required for an event.
    pub detection_threshold: u32,
    /// Minimum spacing between two events.
    pub rate_limit_duration: Duration,
}

impl Default for SpeakOnMuteConfig {
    fn default() -> Self {
        SpeakOnMuteConfig {
            detection_window_size: 30,
            detection_threshold: 28,
            rate_limit_duration: Duration::from_secs(1),
        }
    }
}

/// Pure voice-activity accumulator.
///
/// Timestamps are durations on the caller's monotonic clock; only their
/// relative order matters.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakOnMuteDetector {
    cfg: SpeakOnMuteConfig,
    /// Least significant bit is the most recent activity sample.
    voice_activities: u64,
    silence_until: Option<Duration>,
}

impl SpeakOnMuteDetector {
    /// Validate the configuration and build a detector.
    pub fn new(cfg: SpeakOnMuteConfig) -> Result<Self, SpeakOnMuteError> {
        if cfg.detection_window_size > 63 {
            return Err(SpeakOnMuteError::WindowTooLarge(cfg.detection_window_size));
        }
        if cfg.detection_threshold > cfg.detection_window_size {
            return Err(SpeakOnMuteError::ThresholdTooLarge {
                threshold: cfg.detection_threshold,
                window: cfg.detection_window_size,
            });
        }
        Ok(SpeakOnMuteDetector {
            cfg,
            voice_activities: 0,
            silence_until: None,
        })
    }

    /// Drop accumulated state.
    pub fn reset(&mut self) {
        self.voice_activities = 0;
        self.silence_until = None;
    }

    /// Record one activity sample taken at `when`. Returns whether the user
    /// should be notified.
    pub fn add_voice_activity_at(&mut self, detected: bool, when: Duration) -> bool {
        self.voice_activities <<= 1;
        self.voice_activities |= u64::from(detected);

        if !detected {
            return false;
        }

        let mask = (1u64 << self.cfg.detection_window_size) - 1;
        if (self.voice_activities & mask).count_ones() < self.cfg.detection_threshold {
            return false;
        }

        if self.silence_until.is_some_and(|until| when < until) {
            return false;
        }

        self.silence_until = Some(when + self.cfg.rate_limit_duration);
        true
    }
}

/// Control-plane glue around the detector.
///
/// Owns the enabled flag, the VAD target stream, and the mute gate. The
/// audio thread is told about target changes through the callback passed to
/// [`SpeakOnMuteMonitor::maybe_update_vad_target`], exactly once per change.
pub struct SpeakOnMuteMonitor {
    detector: SpeakOnMuteDetector,
    enabled: bool,
    target_stream: Option<StreamId>,
    effective_target: Option<StreamId>,
}

impl SpeakOnMuteMonitor {
    /// Build with the given detector parameters.
    pub fn new(cfg: SpeakOnMuteConfig) -> Result<Self, SpeakOnMuteError> {
        Ok(SpeakOnMuteMonitor {
            detector: SpeakOnMuteDetector::new(cfg)?,
            enabled: false,
            target_stream: None,
            effective_target: None,
        })
    }

    /// Whether detection is enabled from the UI.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable detection.
    pub fn set_enabled(
        &mut self,
        enabled: bool,
        capture_muted: bool,
        notify_target: &mut dyn FnMut(Option<StreamId>),
    ) {
        self.enabled = enabled;
        self.maybe_update_vad_target(capture_muted, notify_target);
    }

    /// Re-derive the VAD target from the current stream list.
    ///
    /// The target is the first RTC-shaped input stream with an attached APM.
    pub fn streams_changed(
        &mut self,
        streams: &[Stream],
        capture_muted: bool,
        notify_target: &mut dyn FnMut(Option<StreamId>),
    ) {
        self.target_stream = streams
            .iter()
            .find(|s| {
                s.direction == aural_core::Direction::Input
                    && s.rtc_eligible_config()
                    && s.has_apm
            })
            .map(|s| s.id);
        self.maybe_update_vad_target(capture_muted, notify_target);
    }

    /// React to a capture-mute flip.
    pub fn capture_mute_changed(
        &mut self,
        capture_muted: bool,
        notify_target: &mut dyn FnMut(Option<StreamId>),
    ) {
        self.maybe_update_vad_target(capture_muted, notify_target);
    }

    /// Handle one voice-activity message from the audio thread.
    ///
    /// Fires the observer alert only while capture mute is engaged.
    pub fn handle_activity(
        &mut self,
        observer: &ObserverServer,
        capture_muted: bool,
        detected: bool,
        when: Duration,
    ) {
        if !capture_muted {
            return;
        }
        if self.detector.add_voice_activity_at(detected, when) {
            observer.notify_speak_on_mute_detected();
        }
    }

    fn maybe_update_vad_target(
        &mut self,
        capture_muted: bool,
        notify_target: &mut dyn FnMut(Option<StreamId>),
    ) {
        let new_target = if self.enabled && capture_muted {
            self.target_stream
        } else {
            None
        };
        if new_target == self.effective_target {
            return;
        }
        debug!(?new_target, "vad target changed");
        self.effective_target = new_target;
        self.detector.reset();
        notify_target(new_target);
    }
}
