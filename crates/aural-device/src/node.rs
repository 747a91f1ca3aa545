//! Plug-level endpoint model.

use aural_core::NodeType;
use std::time::SystemTime;

/// A plug-level audio endpoint belonging to exactly one iodev.
#[derive(Debug, Clone)]
pub struct Node {
    /// Name shown to users ("Headphone", "Speaker", headset display name).
    pub name: String,
    pub node_type: NodeType,
    pub plugged: bool,
    /// Wall-clock plug time, reported in microseconds on the control
    /// surface and used for most-recently-plugged scoring.
    pub plugged_time: Option<SystemTime>,
    /// Output volume, 0..=100.
    pub volume: u32,
    /// Capture gain in 0.01 dBFS (inputs).
    pub capture_gain: i32,
    pub ui_gain_scaler: f32,
    pub left_right_swapped: bool,
    pub display_rotation: u32,
    /// Hash of persistent attributes; keys preference recall across boots.
    pub stable_id: u32,
    /// Hotword models this node advertises (subset of nodes only).
    pub hotword_models: Vec<String>,
    /// Currently configured hotword model, empty when none.
    pub active_hotword_model: String,
    /// Audio effect bits (`aural_core::effects`).
    pub audio_effect: u32,
    /// Volume steps the hardware exposes.
    pub number_of_volume_steps: u32,
}

impl Node {
    /// A node with common defaults: unplugged, full volume, unity gain.
    pub fn new(name: &str, node_type: NodeType, stable_id: u32) -> Self {
        Node {
            name: name.to_string(),
            node_type,
            plugged: false,
            plugged_time: None,
            volume: 100,
            capture_gain: 0,
            ui_gain_scaler: 1.0,
            left_right_swapped: false,
            display_rotation: 0,
            stable_id,
            hotword_models: Vec::new(),
            active_hotword_model: String::new(),
            audio_effect: 0,
            number_of_volume_steps: 25,
        }
    }

    /// Wall-clock plug time in microseconds since the epoch, 0 if never
    /// plugged.
    pub fn plugged_time_us(&self) -> u64 {
        self.plugged_time
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_micros() as u64)
    }
}

/// Mutable node attribute, with its new value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeAttr {
    Plugged(bool),
    Volume(u32),
    CaptureGain(i32),
    SwapLeftRight(bool),
    DisplayRotation(u32),
    UiGainScaler(f32),
}

/// Selection priority of a node type; higher wins.
///
/// External jacks beat onboard transducers, BT wideband beats the
/// narrowband mic shim, and loopback taps never win an automatic selection.
pub fn node_type_priority(node_type: NodeType) -> u32 {
    match node_type {
        NodeType::Headphone | NodeType::Lineout => 9,
        NodeType::Mic => 9,
        NodeType::Hdmi => 8,
        NodeType::Usb => 7,
        NodeType::Bluetooth => 6,
        NodeType::BluetoothNbMic => 5,
        NodeType::InternalSpeaker | NodeType::InternalMic => 4,
        NodeType::Hotword => 2,
        NodeType::Floop
        | NodeType::FloopInternal
        | NodeType::PostMixPreDsp
        | NodeType::PostDsp
        | NodeType::PostDspDelayed => 1,
        NodeType::Unknown => 0,
    }
}
