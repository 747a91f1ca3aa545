//! Observer bus and audio-state detectors.
//!
//! State mutations on the control thread become coalesced, edge-triggered
//! notifications here:
//!
//! - [`ObserverServer`] owns the named alerts and fans pending payloads out
//!   to [`AudioObserver`] clients once per event-loop cycle.
//! - [`AudioThreadMonitor`] turns audio-thread anomaly events into
//!   rate-limited alerts and bounded snapshots.
//! - [`RtcDetector`] recognises paired voice input/output streams and
//!   upgrades them to voice-communication type.
//! - [`SpeakOnMuteDetector`] (pure) and [`SpeakOnMuteMonitor`] (glue) detect
//!   voice activity while capture is muted.
//! - [`EwmaPowerReporter`] batches per-stream power readings toward the
//!   control thread.

mod alert;
mod ewma_reporter;
mod monitor;
mod observer;
mod rtc;
mod speak_on_mute;

pub use alert::{AlertKind, AlertPayload, PrepareAction, StreamBucket};
pub use ewma_reporter::{EwmaPowerReporter, EwmaReporterControl};
pub use monitor::{AudioThreadMonitor, Snapshot};
pub use observer::{AudioObserver, ObserverId, ObserverServer};
pub use rtc::{MAX_SPECIAL_DEVICE_IDX, RtcActiveSink, RtcDetector};
pub use speak_on_mute::{
    SpeakOnMuteConfig, SpeakOnMuteDetector, SpeakOnMuteError, SpeakOnMuteMonitor,
};
