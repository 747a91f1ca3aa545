//! Main-thread handling of audio-thread anomaly events.

use crate::ObserverServer;
use aural_core::AudioThreadEvent;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Dedupe window for state snapshots of one event type.
const SNAPSHOT_WAIT: Duration = Duration::from_secs(30);
/// Minimum spacing of `underrun` alerts.
const UNDERRUN_RATE_LIMIT: Duration = Duration::from_secs(10);
/// Minimum spacing of `severe_underrun` alerts.
const SEVERE_UNDERRUN_RATE_LIMIT: Duration = Duration::from_secs(5);
/// Bounded post-mortem history.
const MAX_SNAPSHOTS: usize = 10;

/// A captured audio-thread state snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub event: AudioThreadEvent,
    pub when: Instant,
}

/// Rate-limits snapshots and underrun alerts for audio-thread events.
#[derive(Debug, Default)]
pub struct AudioThreadMonitor {
    last_snapshot: [Option<Instant>; AudioThreadEvent::COUNT],
    last_underrun: Option<Instant>,
    last_severe_underrun: Option<Instant>,
    snapshots: VecDeque<Snapshot>,
}

impl AudioThreadMonitor {
    /// Create a monitor with empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one audio-thread event on the control thread.
    ///
    /// Takes a snapshot at most once per 30 s per event type, and fires the
    /// underrun alerts within their rate limits.
    pub fn handle_event(
        &mut self,
        observer: &ObserverServer,
        event: AudioThreadEvent,
        now: Instant,
    ) {
        let slot = &mut self.last_snapshot[event.index()];
        if slot.is_none_or(|last| now.duration_since(last) >= SNAPSHOT_WAIT) {
            debug!(?event, "audio thread snapshot");
            *slot = Some(now);
            if self.snapshots.len() == MAX_SNAPSHOTS {
                self.snapshots.pop_front();
            }
            self.snapshots.push_back(Snapshot { event, when: now });
        }

        match event {
            AudioThreadEvent::SevereUnderrun => {
                if self
                    .last_severe_underrun
                    .is_none_or(|last| now.duration_since(last) >= SEVERE_UNDERRUN_RATE_LIMIT)
                {
                    observer.notify_severe_underrun();
                    self.last_severe_underrun = Some(now);
                }
            }
            AudioThreadEvent::Underrun => {
                if self
                    .last_underrun
                    .is_none_or(|last| now.duration_since(last) >= UNDERRUN_RATE_LIMIT)
                {
                    observer.notify_underrun();
                    self.last_underrun = Some(now);
                }
            }
            _ => {}
        }
    }

    /// The recorded snapshots, oldest first.
    pub fn snapshots(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }
}
