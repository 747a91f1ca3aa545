//! RTC stream-pair detection.
//!
//! A voice call shows up as one input and one output stream with a 480-frame
//! callback period from a Chrome-family client. While both sides exist,
//! every candidate stream is upgraded to voice-communication type so the
//! audio thread schedules them accordingly.

use aural_core::{Direction, Stream, StreamId, StreamType};
use std::time::Instant;
use tracing::warn;

/// Device indices below this are reserved for synthetic devices; streams
/// targeting them never count as RTC candidates.
pub const MAX_SPECIAL_DEVICE_IDX: u32 = 3;

/// Receives the RTC running/stopped edge.
pub trait RtcActiveSink {
    /// Called when `is_running` flips.
    fn rtc_active_changed(&mut self, active: bool);
}

impl<F: FnMut(bool)> RtcActiveSink for F {
    fn rtc_active_changed(&mut self, active: bool) {
        self(active);
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    stream: StreamId,
    dev_index: u32,
    #[allow(dead_code)]
    start: Instant,
}

/// Tracks candidate input/output streams and their pairing state.
#[derive(Debug, Default)]
pub struct RtcDetector {
    input: Vec<Candidate>,
    output: Vec<Candidate>,
}

fn is_candidate(stream: &Stream, dev_index: u32) -> bool {
    stream.rtc_eligible_config() && dev_index >= MAX_SPECIAL_DEVICE_IDX
}

fn upgrade_all(streams: &mut [Stream], list: &[Candidate]) {
    for candidate in list {
        if let Some(stream) = streams.iter_mut().find(|s| s.id == candidate.stream) {
            stream.stream_type = StreamType::VoiceCommunication;
        }
    }
}

impl RtcDetector {
    /// Create an empty detector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a matched input/output pair currently exists.
    pub fn is_running(&self) -> bool {
        !self.input.is_empty() && !self.output.is_empty()
    }

    /// Track a newly attached stream.
    ///
    /// When the addition makes both candidate lists non-empty, the new
    /// stream and every candidate already on the opposite side are upgraded
    /// to voice communication. The sink sees the running edge.
    pub fn add_stream(
        &mut self,
        streams: &mut [Stream],
        stream_id: StreamId,
        dev_index: u32,
        now: Instant,
        sink: &mut dyn RtcActiveSink,
    ) {
        let was_running = self.is_running();
        let Some(pos) = streams.iter().position(|s| s.id == stream_id) else {
            return;
        };
        if !is_candidate(&streams[pos], dev_index) {
            return;
        }

        let candidate = Candidate {
            stream: stream_id,
            dev_index,
            start: now,
        };
        let direction = streams[pos].direction;
        match direction {
            Direction::Input => {
                if !self.output.is_empty() {
                    streams[pos].stream_type = StreamType::VoiceCommunication;
                    if self.input.is_empty() {
                        upgrade_all(streams, &self.output);
                    }
                }
                self.input.push(candidate);
            }
            Direction::Output => {
                if !self.input.is_empty() {
                    streams[pos].stream_type = StreamType::VoiceCommunication;
                    if self.output.is_empty() {
                        upgrade_all(streams, &self.input);
                    }
                }
                self.output.push(candidate);
            }
        }

        if self.is_running() != was_running {
            sink.rtc_active_changed(self.is_running());
        }
    }

    /// Untrack a detached stream. Remaining streams keep their types.
    pub fn remove_stream(
        &mut self,
        streams: &[Stream],
        stream_id: StreamId,
        dev_index: u32,
        sink: &mut dyn RtcActiveSink,
    ) {
        let was_running = self.is_running();
        let Some(stream) = streams.iter().find(|s| s.id == stream_id) else {
            return;
        };
        if !is_candidate(stream, dev_index) {
            return;
        }

        let list = match stream.direction {
            Direction::Input => &mut self.input,
            Direction::Output => &mut self.output,
        };
        match list
            .iter()
            .position(|c| c.stream == stream_id && c.dev_index == dev_index)
        {
            Some(pos) => {
                list.remove(pos);
            }
            None => {
                warn!(stream = stream_id.0, "rtc stream not tracked");
                return;
            }
        }

        if self.is_running() != was_running {
            sink.rtc_active_changed(self.is_running());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aural_core::ClientType;

    fn stream(id: u32, direction: Direction, client_type: ClientType, cb: u32) -> Stream {
        Stream {
            id: StreamId(id),
            direction,
            stream_type: StreamType::Default,
            client_type,
            cb_threshold: cb,
            dev_index: 100,
            has_apm: false,
            has_permission: true,
        }
    }

    struct Edges(Vec<bool>);
    impl RtcActiveSink for Edges {
        fn rtc_active_changed(&mut self, active: bool) {
            self.0.push(active);
        }
    }

    #[test]
    fn lone_input_stream_stays_default() {
        let mut detector = RtcDetector::new();
        let mut streams = vec![stream(1, Direction::Input, ClientType::Chrome, 480)];
        let mut edges = Edges(Vec::new());
        detector.add_stream(&mut streams, StreamId(1), 100, Instant::now(), &mut edges);

        assert_eq!(streams[0].stream_type, StreamType::Default);
        assert!(!detector.is_running());
        assert!(edges.0.is_empty());
    }

    #[test]
    fn pairing_upgrades_both_sides() {
        let mut detector = RtcDetector::new();
        let mut streams = vec![
            stream(1, Direction::Input, ClientType::Chrome, 480),
            stream(2, Direction::Output, ClientType::Chrome, 480),
        ];
        let mut edges = Edges(Vec::new());
        let now = Instant::now();

        detector.add_stream(&mut streams, StreamId(1), 100, now, &mut edges);
        detector.add_stream(&mut streams, StreamId(2), 101, now, &mut edges);

        assert_eq!(streams[0].stream_type, StreamType::VoiceCommunication);
        assert_eq!(streams[1].stream_type, StreamType::VoiceCommunication);
        assert!(detector.is_running());
        assert_eq!(edges.0, vec![true]);
    }

    #[test]
    fn removal_emits_single_stopped_edge() {
        let mut detector = RtcDetector::new();
        let mut streams = vec![
            stream(1, Direction::Input, ClientType::Chrome, 480),
            stream(2, Direction::Output, ClientType::Chrome, 480),
        ];
        let mut edges = Edges(Vec::new());
        let now = Instant::now();
        detector.add_stream(&mut streams, StreamId(1), 100, now, &mut edges);
        detector.add_stream(&mut streams, StreamId(2), 101, now, &mut edges);

        detector.remove_stream(&streams, StreamId(1), 100, &mut edges);
        assert!(!detector.is_running());
        assert_eq!(edges.0, vec![true, false]);
        // The remaining output stream keeps its upgraded type.
        assert_eq!(streams[1].stream_type, StreamType::VoiceCommunication);
    }

    #[test]
    fn wrong_shape_streams_are_ignored() {
        let mut detector = RtcDetector::new();
        let mut streams = vec![
            stream(1, Direction::Input, ClientType::Arc, 480),
            stream(2, Direction::Output, ClientType::Chrome, 512),
        ];
        let mut edges = Edges(Vec::new());
        let now = Instant::now();
        detector.add_stream(&mut streams, StreamId(1), 100, now, &mut edges);
        detector.add_stream(&mut streams, StreamId(2), 101, now, &mut edges);
        assert!(!detector.is_running());
    }

    #[test]
    fn reserved_device_range_is_excluded() {
        let mut detector = RtcDetector::new();
        let mut streams = vec![stream(1, Direction::Input, ClientType::Chrome, 480)];
        let mut edges = Edges(Vec::new());
        detector.add_stream(
            &mut streams,
            StreamId(1),
            MAX_SPECIAL_DEVICE_IDX - 1,
            Instant::now(),
            &mut edges,
        );
        assert!(detector.input.is_empty());
    }

    #[test]
    fn late_candidates_upgrade_on_add() {
        // Two inputs first, then one output: all three end up upgraded.
        let mut detector = RtcDetector::new();
        let mut streams = vec![
            stream(1, Direction::Input, ClientType::Chrome, 480),
            stream(2, Direction::Input, ClientType::Lacros, 480),
            stream(3, Direction::Output, ClientType::Chrome, 480),
        ];
        let mut edges = Edges(Vec::new());
        let now = Instant::now();
        detector.add_stream(&mut streams, StreamId(1), 100, now, &mut edges);
        detector.add_stream(&mut streams, StreamId(2), 100, now, &mut edges);
        detector.add_stream(&mut streams, StreamId(3), 101, now, &mut edges);

        assert!(streams
            .iter()
            .all(|s| s.stream_type == StreamType::VoiceCommunication));
    }
}
