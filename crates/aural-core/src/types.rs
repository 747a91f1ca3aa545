//! Vocabulary types shared across the server.

use serde::{Deserialize, Serialize};

/// Direction of an audio endpoint or stream, seen from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Playback towards a sink (speaker, headphones, BT sink).
    Output,
    /// Capture from a source (microphone, loopback).
    Input,
}

impl Direction {
    /// Number of directions, for per-direction tables.
    pub const COUNT: usize = 2;

    /// Stable index for per-direction arrays.
    pub const fn index(self) -> usize {
        match self {
            Direction::Output => 0,
            Direction::Input => 1,
        }
    }

    /// Both directions, in index order.
    pub const fn all() -> [Direction; 2] {
        [Direction::Output, Direction::Input]
    }
}

/// Plug-level endpoint type of a node.
///
/// The loopback and BT variants are synthetic; the rest map to jacks and
/// onboard transducers reported by the card layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    InternalSpeaker,
    InternalMic,
    Mic,
    Headphone,
    Hdmi,
    Lineout,
    Usb,
    Hotword,
    Bluetooth,
    /// BT headset microphone limited to narrowband speech.
    BluetoothNbMic,
    PostMixPreDsp,
    PostDsp,
    PostDspDelayed,
    /// Flexible loopback capture side.
    Floop,
    /// Flexible loopback playback side (not user selectable).
    FloopInternal,
    Unknown,
}

impl NodeType {
    /// The canonical name used on the control surface.
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeType::InternalSpeaker => "INTERNAL_SPEAKER",
            NodeType::InternalMic => "INTERNAL_MIC",
            NodeType::Mic => "MIC",
            NodeType::Headphone => "HEADPHONE",
            NodeType::Hdmi => "HDMI",
            NodeType::Lineout => "LINEOUT",
            NodeType::Usb => "USB",
            NodeType::Hotword => "HOTWORD",
            NodeType::Bluetooth => "BLUETOOTH",
            NodeType::BluetoothNbMic => "BLUETOOTH_NB_MIC",
            NodeType::PostMixPreDsp => "POST_MIX_LOOPBACK",
            NodeType::PostDsp => "POST_DSP_LOOPBACK",
            NodeType::PostDspDelayed => "POST_DSP_DELAYED_LOOPBACK",
            NodeType::Floop => "FLEXIBLE_LOOPBACK",
            NodeType::FloopInternal => "FLEXIBLE_LOOPBACK_INTERNAL",
            NodeType::Unknown => "UNKNOWN",
        }
    }
}

/// The category of client that opened a stream.
///
/// Order is stable; the control surface reports per-client-type counters in
/// this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientType {
    Unknown,
    Legacy,
    Test,
    Pcm,
    Chrome,
    Arc,
    Crosvm,
    ServerStream,
    Lacros,
    Plugin,
    Arcvm,
    Borealis,
}

impl ClientType {
    /// All client types in enum order.
    pub const ALL: [ClientType; 12] = [
        ClientType::Unknown,
        ClientType::Legacy,
        ClientType::Test,
        ClientType::Pcm,
        ClientType::Chrome,
        ClientType::Arc,
        ClientType::Crosvm,
        ClientType::ServerStream,
        ClientType::Lacros,
        ClientType::Plugin,
        ClientType::Arcvm,
        ClientType::Borealis,
    ];

    /// Number of client types.
    pub const COUNT: usize = Self::ALL.len();

    /// Bit used in client-type masks (flexible loopback routing).
    pub const fn bit(self) -> u32 {
        1 << self.index()
    }

    /// Stable index of this client type.
    pub const fn index(self) -> usize {
        match self {
            ClientType::Unknown => 0,
            ClientType::Legacy => 1,
            ClientType::Test => 2,
            ClientType::Pcm => 3,
            ClientType::Chrome => 4,
            ClientType::Arc => 5,
            ClientType::Crosvm => 6,
            ClientType::ServerStream => 7,
            ClientType::Lacros => 8,
            ClientType::Plugin => 9,
            ClientType::Arcvm => 10,
            ClientType::Borealis => 11,
        }
    }

    /// The name reported on the control surface.
    pub const fn as_str(self) -> &'static str {
        match self {
            ClientType::Unknown => "CLIENT_TYPE_UNKNOWN",
            ClientType::Legacy => "CLIENT_TYPE_LEGACY",
            ClientType::Test => "CLIENT_TYPE_TEST",
            ClientType::Pcm => "CLIENT_TYPE_PCM",
            ClientType::Chrome => "CLIENT_TYPE_CHROME",
            ClientType::Arc => "CLIENT_TYPE_ARC",
            ClientType::Crosvm => "CLIENT_TYPE_CROSVM",
            ClientType::ServerStream => "CLIENT_TYPE_SERVER_STREAM",
            ClientType::Lacros => "CLIENT_TYPE_LACROS",
            ClientType::Plugin => "CLIENT_TYPE_PLUGIN",
            ClientType::Arcvm => "CLIENT_TYPE_ARCVM",
            ClientType::Borealis => "CLIENT_TYPE_BOREALIS",
        }
    }
}

/// Intent classification of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
    Default,
    Multimedia,
    VoiceCommunication,
    SpeechRecognition,
    ProAudio,
    Accessibility,
}

/// Anomalies classified by the audio callback thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioThreadEvent {
    A2dpOverrun,
    A2dpThrottle,
    Debug,
    Busyloop,
    Underrun,
    SevereUnderrun,
    DropSamples,
    DevOverrun,
}

impl AudioThreadEvent {
    /// Number of event kinds, for per-kind dedupe tables.
    pub const COUNT: usize = 8;

    /// Stable index for per-kind arrays.
    pub const fn index(self) -> usize {
        match self {
            AudioThreadEvent::A2dpOverrun => 0,
            AudioThreadEvent::A2dpThrottle => 1,
            AudioThreadEvent::Debug => 2,
            AudioThreadEvent::Busyloop => 3,
            AudioThreadEvent::Underrun => 4,
            AudioThreadEvent::SevereUnderrun => 5,
            AudioThreadEvent::DropSamples => 6,
            AudioThreadEvent::DevOverrun => 7,
        }
    }
}

/// Packed node identifier: `(device_index << 32) | node_index`.
///
/// This is the identifier exchanged on the control surface; internally it is
/// decoded back into the `(device, node)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Pack a device index and node index into an external id.
    pub const fn new(dev_index: u32, node_index: u32) -> Self {
        NodeId(((dev_index as u64) << 32) | node_index as u64)
    }

    /// The id meaning "no node".
    pub const NONE: NodeId = NodeId(0);

    /// Device index half of the id.
    pub const fn dev_index(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Node index half of the id.
    pub const fn node_index(self) -> u32 {
        self.0 as u32
    }

    /// The raw packed value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Rebuild from a raw packed value.
    pub const fn from_raw(raw: u64) -> Self {
        NodeId(raw)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dev_index(), self.node_index())
    }
}

/// Bluetooth audio profiles the policy engine arbitrates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BtProfile {
    /// High-quality unidirectional streaming audio.
    A2dpSink,
    /// Bidirectional narrow/wideband speech.
    HfpHandsfree,
}

impl BtProfile {
    /// Bit for profile masks.
    pub const fn bit(self) -> u32 {
        match self {
            BtProfile::A2dpSink => 1 << 0,
            BtProfile::HfpHandsfree => 1 << 1,
        }
    }
}

/// Generational handle to a BT device in the policy arena.
///
/// Messages carry these instead of references; a handler revalidates the
/// generation before acting so messages from a removed device drop silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BtDeviceId {
    /// Slot index in the arena.
    pub index: u32,
    /// Generation of the slot when the handle was minted.
    pub generation: u32,
}

/// Why a BT device suspend was scheduled. Logged for post-mortem analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuspendReason {
    A2dpLongTxFailure,
    A2dpTxFatalError,
    ConnWatchTimeout,
    HfpScoSocketError,
    HfpAgStartFailure,
    UnexpectedProfileDrop,
}

impl SuspendReason {
    /// Human-readable form used in the suspend warning log.
    pub const fn describe(self) -> &'static str {
        match self {
            SuspendReason::A2dpLongTxFailure => "A2DP long Tx failure",
            SuspendReason::A2dpTxFatalError => "A2DP Tx fatal error",
            SuspendReason::ConnWatchTimeout => "Conn watch times out",
            SuspendReason::HfpScoSocketError => "SCO socket error",
            SuspendReason::HfpAgStartFailure => "HFP AG start failure",
            SuspendReason::UnexpectedProfileDrop => "Unexpected profile drop",
        }
    }
}

/// Audio effect bits carried in node info and stream requests.
///
/// Values are stable across releases; external tooling hardcodes them.
pub mod effects {
    /// Echo cancellation.
    pub const AEC: u32 = 0x1;
    /// Noise suppression.
    pub const NS: u32 = 0x2;
    /// Automatic gain control.
    pub const AGC: u32 = 0x4;
    /// Voice activity detection.
    pub const VAD: u32 = 0x8;
    /// Echo cancellation may run on DSP.
    pub const AEC_ON_DSP_ALLOWED: u32 = 0x10;
    /// Noise suppression may run on DSP.
    pub const NS_ON_DSP_ALLOWED: u32 = 0x20;
    /// Gain control may run on DSP.
    pub const AGC_ON_DSP_ALLOWED: u32 = 0x40;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_round_trip() {
        let id = NodeId::new(7, 42);
        assert_eq!(id.dev_index(), 7);
        assert_eq!(id.node_index(), 42);
        assert_eq!(NodeId::from_raw(id.raw()), id);
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId::new(3, 0).to_string(), "3:0");
    }

    #[test]
    fn client_type_order_is_stable() {
        for (i, ct) in ClientType::ALL.iter().enumerate() {
            assert_eq!(ct.index(), i);
        }
        assert_eq!(ClientType::COUNT, 12);
    }

    #[test]
    fn profile_bits_disjoint() {
        assert_eq!(BtProfile::A2dpSink.bit() & BtProfile::HfpHandsfree.bit(), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn node_id_pack_unpack_identity(dev in any::<u32>(), node in any::<u32>()) {
                let id = NodeId::new(dev, node);
                prop_assert_eq!(id.dev_index(), dev);
                prop_assert_eq!(id.node_index(), node);
                prop_assert_eq!(NodeId::from_raw(id.raw()), id);
            }
        }
    }
}
