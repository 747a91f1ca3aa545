//! Signal fan-out: alerts translated for the external control surface.

use crate::text::sanitize;
use aural_core::{ClientType, Direction, NodeId, StreamType};
use aural_observer::{AudioObserver, StreamBucket};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;

/// Signals emitted on the control surface, one per alert.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    OutputVolumeChanged(i32),
    OutputMuteChanged { muted: bool, user_muted: bool },
    InputGainChanged(i32),
    InputMuteChanged(bool),
    NodesChanged,
    ActiveOutputNodeChanged(u64),
    ActiveInputNodeChanged(u64),
    OutputNodeVolumeChanged(u64, i32),
    InputNodeGainChanged(u64, i32),
    NodeLeftRightSwappedChanged(u64, bool),
    NumberOfActiveStreamsChanged(i32),
    NumberOfNonChromeOutputStreamsChanged(i32),
    NumberOfInputStreamsWithPermissionChanged(Vec<Value>),
    HotwordTriggered(i64, i64),
    AudioOutputActiveStateChanged(bool),
    SevereUnderrun,
    Underrun,
    SurveyTrigger(Value),
    SpeakOnMuteDetected,
    BtBatteryChanged { address: String, level: u32 },
}

/// Receives translated signals; a bus transport implements this.
pub trait SignalSink {
    /// Emit one signal.
    fn emit(&mut self, signal: Signal);
}

impl SignalSink for Vec<Signal> {
    fn emit(&mut self, signal: Signal) {
        self.push(signal);
    }
}

/// Observer client bridging alerts onto a [`SignalSink`].
///
/// Register it on the observer bus at bringup; every human-readable string
/// crossing here is sanitised first.
pub struct SignalBridge {
    sink: Rc<RefCell<dyn SignalSink>>,
    /// Per-bucket counts; the external signal carries the total.
    stream_counts: [u32; 2],
}

impl SignalBridge {
    /// Bridge onto `sink`.
    pub fn new(sink: Rc<RefCell<dyn SignalSink>>) -> Self {
        SignalBridge {
            sink,
            stream_counts: [0; 2],
        }
    }

    fn emit(&self, signal: Signal) {
        self.sink.borrow_mut().emit(signal);
    }
}

impl AudioObserver for SignalBridge {
    fn output_volume_changed(&mut self, volume: i32) {
        self.emit(Signal::OutputVolumeChanged(volume));
    }

    fn output_mute_changed(&mut self, muted: bool, user_muted: bool) {
        self.emit(Signal::OutputMuteChanged { muted, user_muted });
    }

    fn capture_gain_changed(&mut self, gain: i32) {
        self.emit(Signal::InputGainChanged(gain));
    }

    fn capture_mute_changed(&mut self, muted: bool) {
        self.emit(Signal::InputMuteChanged(muted));
    }

    fn nodes_changed(&mut self) {
        self.emit(Signal::NodesChanged);
    }

    fn active_node_changed(&mut self, direction: Direction, node_id: NodeId) {
        let raw = node_id.raw();
        self.emit(match direction {
            Direction::Output => Signal::ActiveOutputNodeChanged(raw),
            Direction::Input => Signal::ActiveInputNodeChanged(raw),
        });
    }

    fn output_node_volume_changed(&mut self, node_id: NodeId, volume: i32) {
        self.emit(Signal::OutputNodeVolumeChanged(node_id.raw(), volume));
    }

    fn node_left_right_swapped_changed(&mut self, node_id: NodeId, swapped: bool) {
        self.emit(Signal::NodeLeftRightSwappedChanged(node_id.raw(), swapped));
    }

    fn input_node_gain_changed(&mut self, node_id: NodeId, gain: i32) {
        self.emit(Signal::InputNodeGainChanged(node_id.raw(), gain));
    }

    fn hotword_triggered(&mut self, tv_sec: i64, tv_nsec: i64) {
        self.emit(Signal::HotwordTriggered(tv_sec, tv_nsec));
    }

    fn num_active_streams_changed(&mut self, bucket: StreamBucket, count: u32) {
        match bucket {
            StreamBucket::Output => self.stream_counts[0] = count,
            StreamBucket::Input => self.stream_counts[1] = count,
            StreamBucket::PostMixPreDsp => {}
        }
        let total = self.stream_counts.iter().sum::<u32>() as i32;
        self.emit(Signal::NumberOfActiveStreamsChanged(total));
    }

    fn num_non_chrome_output_streams_changed(&mut self, count: u32) {
        self.emit(Signal::NumberOfNonChromeOutputStreamsChanged(count as i32));
    }

    fn non_empty_audio_state_changed(&mut self, non_empty: bool) {
        self.emit(Signal::AudioOutputActiveStateChanged(non_empty));
    }

    fn bt_battery_changed(&mut self, address: &str, level: u32) {
        self.emit(Signal::BtBatteryChanged {
            address: sanitize(address).to_string(),
            level,
        });
    }

    fn num_input_streams_with_permission_changed(&mut self, counts: &[u32; ClientType::COUNT]) {
        let dicts = ClientType::ALL
            .iter()
            .map(|ct| {
                json!({
                    "ClientType": sanitize(ct.as_str()),
                    "NumStreamsWithPermission": counts[ct.index()],
                })
            })
            .collect();
        self.emit(Signal::NumberOfInputStreamsWithPermissionChanged(dicts));
    }

    fn severe_underrun(&mut self) {
        self.emit(Signal::SevereUnderrun);
    }

    fn underrun(&mut self) {
        self.emit(Signal::Underrun);
    }

    fn general_survey(
        &mut self,
        stream_type: StreamType,
        client_type: ClientType,
        node_pair: &str,
    ) {
        self.emit(Signal::SurveyTrigger(json!({
            "StreamType": format!("{stream_type:?}"),
            "ClientType": sanitize(client_type.as_str()),
            "NodeType": sanitize(node_pair),
        })));
    }

    fn speak_on_mute_detected(&mut self) {
        self.emit(Signal::SpeakOnMuteDetected);
    }
}
