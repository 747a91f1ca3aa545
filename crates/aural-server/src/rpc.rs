//! The abstract control surface: typed requests, replies, and errors.
//!
//! A transport (message bus, test harness) turns wire calls into
//! [`ControlRequest`] values and maps [`ControlReply`]/[`ControlError`] back
//! out. Requests recover locally: validate, mutate, emit an alert or return
//! an error; none of them escalates to a device suspend.

use crate::plane::ControlPlane;
use crate::text::{PLAYER_STRING_MAX, sanitize};
use aural_core::hash::pseudonymize;
use aural_core::{CH_MAX, ClientType, Direction, NodeId};
use aural_device::{NodeAttr, NodeRecord, OpenResult, RegistryError};
use serde_json::{Value, json};
use thiserror::Error;

/// Errors returned synchronously on the control surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    /// Value out of range or malformed id.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Node, device, or model id unknown.
    #[error("not found: {0}")]
    NotFound(String),

    /// Resource in use.
    #[error("busy: {0}")]
    Busy(String),

    /// Underlying card or socket error the caller may retry.
    #[error("transient i/o: {0}")]
    TransientIo(String),

    /// Device failure that triggered recovery elsewhere.
    #[error("fatal device error: {0}")]
    FatalDevice(String),

    /// The card does not advertise the capability.
    #[error("capability missing: {0}")]
    CapabilityMissing(String),
}

impl From<RegistryError> for ControlError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DeviceNotFound(_)
            | RegistryError::NodeNotFound(_)
            | RegistryError::ModelNotFound(_) => ControlError::NotFound(err.to_string()),
            RegistryError::InvalidValue { .. } => ControlError::InvalidArgument(err.to_string()),
            RegistryError::NoSupportedFormat(_) | RegistryError::NotOpen(_) => {
                ControlError::Busy(err.to_string())
            }
            RegistryError::OpenFailed { .. } => ControlError::TransientIo(err.to_string()),
        }
    }
}

/// Player metadata payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Track length in microseconds.
    pub length: i64,
}

/// The method set exposed over the message bus.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    // Volumes & mutes.
    SetOutputVolume(i32),
    SetOutputNodeVolume { node_id: u64, volume: i32 },
    SetDisplayRotation { node_id: u64, rotation: u32 },
    SwapLeftRight { node_id: u64, swap: bool },
    SetOutputMute(bool),
    SetOutputUserMute(bool),
    SetSuspendAudio(bool),
    SetInputNodeGain { node_id: u64, gain: i32 },
    SetInputMute(bool),
    GetVolumeState,

    // Enumeration.
    GetNodes,
    GetNodeInfos,

    // Selection.
    SetActiveOutputNode(u64),
    SetActiveInputNode(u64),
    AddActiveOutputNode(u64),
    AddActiveInputNode(u64),
    RemoveActiveOutputNode(u64),
    RemoveActiveInputNode(u64),

    // Capabilities and feature flags.
    GetSystemAecSupported,
    GetSystemAecGroupId,
    GetSystemNsSupported,
    GetSystemAgcSupported,
    GetDeprioritizeBtWbsMic,
    GetRtcRunning,
    SetFlossEnabled(bool),
    SetWbsEnabled(bool),
    SetNoiseCancellationEnabled(bool),
    IsNoiseCancellationSupported,
    SetBypassBlockNoiseCancellation(bool),
    SetForceSrBtEnabled(bool),
    GetForceSrBtEnabled,
    SetFixA2dpPacketSize(bool),
    SetSpeakOnMuteDetection(bool),
    SpeakOnMuteDetectionEnabled,
    SetForceRespectUiGains(bool),
    IsInternalCardDetected,

    // Streams and global processing.
    GetNumberOfActiveStreams,
    GetNumberOfActiveInputStreams,
    GetNumberOfActiveOutputStreams,
    GetNumberOfNonChromeOutputStreams,
    GetNumberOfInputStreamsWithPermission,
    SetGlobalOutputChannelRemix { num_channels: i32, coefficients: Vec<f64> },

    // Player metadata.
    SetPlayerPlaybackStatus(String),
    SetPlayerIdentity(String),
    SetPlayerPosition(i64),
    SetPlayerMetadata(PlayerMetadata),

    // Misc.
    SetHotwordModel { node_id: u64, model: String },
    IsAudioOutputActive,
    GetDefaultOutputBufferSize,
    Introspect,
}

/// Reply payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlReply {
    Empty,
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    VolumeState {
        volume: i32,
        system_muted: bool,
        capture_muted: bool,
        user_muted: bool,
    },
    NodeList(Vec<Value>),
    DictList(Vec<Value>),
    Xml(String),
}

impl ControlPlane {
    /// Handle one control-surface request.
    pub fn handle_control(&mut self, req: ControlRequest) -> Result<ControlReply, ControlError> {
        use ControlRequest as R;
        match req {
            R::SetOutputVolume(volume) => {
                if !(0..=100).contains(&volume) {
                    return Err(ControlError::InvalidArgument(format!("volume {volume}")));
                }
                self.state.volume = volume;
                self.observer.notify_output_volume(volume);
                Ok(ControlReply::Empty)
            }
            R::SetOutputNodeVolume { node_id, volume } => {
                if !(0..=100).contains(&volume) {
                    return Err(ControlError::InvalidArgument(format!("volume {volume}")));
                }
                self.registry
                    .set_node_attr(NodeId::from_raw(node_id), NodeAttr::Volume(volume as u32))?;
                Ok(ControlReply::Empty)
            }
            R::SetDisplayRotation { node_id, rotation } => {
                if rotation > 3 {
                    return Err(ControlError::InvalidArgument(format!("rotation {rotation}")));
                }
                self.registry.set_node_attr(
                    NodeId::from_raw(node_id),
                    NodeAttr::DisplayRotation(rotation),
                )?;
                Ok(ControlReply::Empty)
            }
            R::SwapLeftRight { node_id, swap } => {
                self.registry
                    .set_node_attr(NodeId::from_raw(node_id), NodeAttr::SwapLeftRight(swap))?;
                Ok(ControlReply::Empty)
            }
            R::SetOutputMute(muted) => {
                self.state.system_mute = muted;
                let user = self.state.user_mute;
                self.observer.notify_output_mute(muted, user);
                Ok(ControlReply::Empty)
            }
            R::SetOutputUserMute(muted) => {
                self.state.user_mute = muted;
                let system = self.state.system_mute;
                self.observer.notify_output_mute(system, muted);
                Ok(ControlReply::Empty)
            }
            R::SetSuspendAudio(suspended) => {
                self.state.suspended = suspended;
                self.observer.notify_suspend_changed(suspended);
                Ok(ControlReply::Empty)
            }
            R::SetInputNodeGain { node_id, gain } => {
                self.registry
                    .set_node_attr(NodeId::from_raw(node_id), NodeAttr::CaptureGain(gain))?;
                Ok(ControlReply::Empty)
            }
            R::SetInputMute(muted) => {
                self.state.capture_mute = muted;
                self.observer.notify_capture_mute(muted);
                self.capture_mute_changed();
                Ok(ControlReply::Empty)
            }
            R::GetVolumeState => Ok(ControlReply::VolumeState {
                volume: self.state.volume,
                system_muted: self.state.system_mute,
                capture_muted: self.state.capture_mute,
                user_muted: self.state.user_mute,
            }),

            R::GetNodes => Ok(ControlReply::NodeList(self.node_dicts(false))),
            R::GetNodeInfos => Ok(ControlReply::NodeList(self.node_dicts(true))),

            R::SetActiveOutputNode(id) => self.select(Direction::Output, id),
            R::SetActiveInputNode(id) => self.select(Direction::Input, id),
            R::AddActiveOutputNode(id) => self.add_active(Direction::Output, id),
            R::AddActiveInputNode(id) => self.add_active(Direction::Input, id),
            R::RemoveActiveOutputNode(id) => self.rm_active(Direction::Output, id),
            R::RemoveActiveInputNode(id) => self.rm_active(Direction::Input, id),

            R::GetSystemAecSupported => Ok(ControlReply::Bool(self.state.aec_supported)),
            R::GetSystemAecGroupId => Ok(ControlReply::Int32(self.state.aec_group_id)),
            R::GetSystemNsSupported => Ok(ControlReply::Bool(self.state.ns_supported)),
            R::GetSystemAgcSupported => Ok(ControlReply::Bool(self.state.agc_supported)),
            R::GetDeprioritizeBtWbsMic => {
                Ok(ControlReply::Bool(self.state.deprioritize_bt_wbs_mic))
            }
            R::GetRtcRunning => Ok(ControlReply::Bool(self.rtc.is_running())),
            R::SetFlossEnabled(enabled) => {
                self.state.floss_enabled = enabled;
                Ok(ControlReply::Empty)
            }
            R::SetWbsEnabled(enabled) => {
                self.state.wbs_enabled = enabled;
                Ok(ControlReply::Empty)
            }
            R::SetNoiseCancellationEnabled(enabled) => {
                self.state.noise_cancellation_enabled = enabled;
                Ok(ControlReply::Empty)
            }
            R::IsNoiseCancellationSupported => {
                // Supported iff any input node advertises the effect.
                let supported = self.registry.node_records().iter().any(|r| {
                    r.direction == Direction::Input
                        && r.node.audio_effect & aural_core::effects::NS != 0
                });
                Ok(ControlReply::Bool(supported))
            }
            R::SetBypassBlockNoiseCancellation(bypass) => {
                self.state.bypass_block_noise_cancellation = bypass;
                Ok(ControlReply::Empty)
            }
            R::SetForceSrBtEnabled(enabled) => {
                self.state.force_sr_bt_enabled = enabled;
                Ok(ControlReply::Empty)
            }
            R::GetForceSrBtEnabled => Ok(ControlReply::Bool(self.state.force_sr_bt_enabled)),
            R::SetFixA2dpPacketSize(fix) => {
                self.state.fix_a2dp_packet_size = fix;
                Ok(ControlReply::Empty)
            }
            R::SetSpeakOnMuteDetection(enabled) => {
                self.set_speak_on_mute_enabled(enabled);
                Ok(ControlReply::Empty)
            }
            R::SpeakOnMuteDetectionEnabled => {
                Ok(ControlReply::Bool(self.speak_on_mute.enabled()))
            }
            R::SetForceRespectUiGains(force) => {
                self.state.force_respect_ui_gains = force;
                Ok(ControlReply::Empty)
            }
            R::IsInternalCardDetected => {
                Ok(ControlReply::Bool(self.state.internal_card_detected))
            }

            R::GetNumberOfActiveStreams => {
                Ok(ControlReply::Int32(self.registry.streams().len() as i32))
            }
            R::GetNumberOfActiveInputStreams => Ok(ControlReply::Int32(
                self.count_streams(Direction::Input) as i32,
            )),
            R::GetNumberOfActiveOutputStreams => Ok(ControlReply::Int32(
                self.count_streams(Direction::Output) as i32,
            )),
            R::GetNumberOfNonChromeOutputStreams => {
                let count = self
                    .registry
                    .streams()
                    .iter()
                    .filter(|s| {
                        s.direction == Direction::Output
                            && !matches!(
                                s.client_type,
                                ClientType::Chrome | ClientType::Lacros
                            )
                    })
                    .count();
                Ok(ControlReply::Int32(count as i32))
            }
            R::GetNumberOfInputStreamsWithPermission => {
                Ok(ControlReply::DictList(self.input_streams_with_permission()))
            }
            R::SetGlobalOutputChannelRemix {
                num_channels,
                coefficients,
            } => {
                if num_channels <= 0 || num_channels as usize > CH_MAX {
                    return Err(ControlError::InvalidArgument(format!(
                        "num_channels {num_channels}"
                    )));
                }
                let n = num_channels as usize;
                if coefficients.len() != n * n {
                    return Err(ControlError::InvalidArgument(format!(
                        "expected {} coefficients, got {}",
                        n * n,
                        coefficients.len()
                    )));
                }
                self.output_remix = Some((n, coefficients));
                Ok(ControlReply::Empty)
            }

            R::SetPlayerPlaybackStatus(status) => {
                if !self.state.set_playback_status(&status) {
                    return Err(ControlError::InvalidArgument(format!(
                        "playback status '{status}'"
                    )));
                }
                Ok(ControlReply::Empty)
            }
            R::SetPlayerIdentity(identity) => {
                if !self.state.set_player_identity(&identity) {
                    return Err(ControlError::InvalidArgument("identity too long".into()));
                }
                Ok(ControlReply::Empty)
            }
            R::SetPlayerPosition(position) => {
                if !self.state.set_player_position(position) {
                    return Err(ControlError::InvalidArgument(format!(
                        "position {position}"
                    )));
                }
                Ok(ControlReply::Empty)
            }
            R::SetPlayerMetadata(metadata) => {
                for field in [&metadata.title, &metadata.artist, &metadata.album] {
                    if field.len() > PLAYER_STRING_MAX {
                        return Err(ControlError::InvalidArgument("metadata too long".into()));
                    }
                }
                self.state.player.title = sanitize(&metadata.title).to_string();
                self.state.player.artist = sanitize(&metadata.artist).to_string();
                self.state.player.album = sanitize(&metadata.album).to_string();
                self.state.player.length = metadata.length;
                Ok(ControlReply::Empty)
            }

            R::SetHotwordModel { node_id, model } => {
                self.registry
                    .set_hotword_model(NodeId::from_raw(node_id), &model)?;
                Ok(ControlReply::Empty)
            }
            R::IsAudioOutputActive => Ok(ControlReply::Bool(self.state.non_empty_audio)),
            R::GetDefaultOutputBufferSize => {
                Ok(ControlReply::Uint32(self.state.default_output_buffer_size))
            }
            R::Introspect => Ok(ControlReply::Xml(introspect_xml())),
        }
    }

    fn select(&mut self, direction: Direction, id: u64) -> Result<ControlReply, ControlError> {
        self.registry.select_node(direction, NodeId::from_raw(id))?;
        Ok(ControlReply::Empty)
    }

    fn add_active(&mut self, direction: Direction, id: u64) -> Result<ControlReply, ControlError> {
        self.registry
            .add_active_node(direction, NodeId::from_raw(id))?;
        Ok(ControlReply::Empty)
    }

    fn rm_active(&mut self, direction: Direction, id: u64) -> Result<ControlReply, ControlError> {
        self.registry
            .rm_active_node(direction, NodeId::from_raw(id))?;
        Ok(ControlReply::Empty)
    }

    fn count_streams(&self, direction: Direction) -> usize {
        self.registry
            .streams()
            .iter()
            .filter(|s| s.direction == direction)
            .count()
    }

    /// One entry per client type, in enum order.
    fn input_streams_with_permission(&self) -> Vec<Value> {
        let mut counts = [0u32; ClientType::COUNT];
        for stream in self.registry.streams() {
            if stream.direction == Direction::Input && stream.has_permission {
                counts[stream.client_type.index()] += 1;
            }
        }
        ClientType::ALL
            .iter()
            .map(|ct| {
                json!({
                    "ClientType": sanitize(ct.as_str()),
                    "NumStreamsWithPermission": counts[ct.index()],
                })
            })
            .collect()
    }

    fn node_dicts(&self, with_debug_stats: bool) -> Vec<Value> {
        self.registry
            .node_records()
            .into_iter()
            .map(|r| self.node_dict(&r, with_debug_stats))
            .collect()
    }

    fn node_dict(&self, record: &NodeRecord, with_debug_stats: bool) -> Value {
        let is_input = record.direction == Direction::Input;
        let mut map = serde_json::Map::new();
        map.insert("IsInput".into(), json!(is_input));
        map.insert("Id".into(), json!(record.id.raw()));
        map.insert("DeviceName".into(), json!(sanitize(&record.dev_name)));
        map.insert(
            "StableDeviceId".into(),
            json!(u64::from(pseudonymize(record.stable_dev_id))),
        );
        map.insert(
            "MaxSupportedChannels".into(),
            json!(record.max_supported_channels),
        );
        map.insert(
            "DeviceLastOpenResult".into(),
            json!(open_result_str(record.last_open_result)),
        );
        map.insert("Type".into(), json!(record.node.node_type.as_str()));
        map.insert("Name".into(), json!(sanitize(&record.node.name)));
        map.insert("Active".into(), json!(record.active));
        map.insert("PluggedTime".into(), json!(record.node.plugged_time_us()));
        map.insert("NodeVolume".into(), json!(record.node.volume));
        map.insert("NodeCaptureGain".into(), json!(record.node.capture_gain));
        map.insert("AudioEffect".into(), json!(record.node.audio_effect));
        map.insert(
            "NumberOfVolumeSteps".into(),
            json!(record.node.number_of_volume_steps),
        );
        map.insert(
            "HotwordModels".into(),
            json!(record.node.hotword_models.join(",")),
        );
        if is_input {
            map.insert("InputNodeGain".into(), json!(record.node.capture_gain));
        }
        if with_debug_stats && record.active {
            map.insert("NumberOfUnderruns".into(), json!(self.underruns));
            map.insert(
                "NumberOfSevereUnderruns".into(),
                json!(self.severe_underruns),
            );
        }
        Value::Object(map)
    }
}

fn open_result_str(result: OpenResult) -> &'static str {
    match result {
        OpenResult::NotAttempted => "UNKNOWN",
        OpenResult::Success => "SUCCESS",
        OpenResult::InvalidArgument => "EINVAL",
        OpenResult::Busy => "EBUSY",
        OpenResult::Io => "EIO",
    }
}

fn introspect_xml() -> String {
    let methods = [
        "SetOutputVolume",
        "SetOutputNodeVolume",
        "SetDisplayRotation",
        "SwapLeftRight",
        "SetOutputMute",
        "SetOutputUserMute",
        "SetSuspendAudio",
        "SetInputNodeGain",
        "SetInputMute",
        "GetVolumeState",
        "GetNodes",
        "GetNodeInfos",
        "SetActiveOutputNode",
        "SetActiveInputNode",
        "AddActiveOutputNode",
        "AddActiveInputNode",
        "RemoveActiveOutputNode",
        "RemoveActiveInputNode",
        "GetSystemAecSupported",
        "GetSystemAecGroupId",
        "GetSystemNsSupported",
        "GetSystemAgcSupported",
        "GetDeprioritizeBtWbsMic",
        "GetRtcRunning",
        "SetFlossEnabled",
        "SetWbsEnabled",
        "SetNoiseCancellationEnabled",
        "IsNoiseCancellationSupported",
        "SetBypassBlockNoiseCancellation",
        "SetForceSrBtEnabled",
        "GetForceSrBtEnabled",
        "SetFixA2dpPacketSize",
        "SetSpeakOnMuteDetection",
        "SpeakOnMuteDetectionEnabled",
        "SetForceRespectUiGains",
        "IsInternalCardDetected",
        "GetNumberOfActiveStreams",
        "GetNumberOfActiveInputStreams",
        "GetNumberOfActiveOutputStreams",
        "GetNumberOfNonChromeOutputStreams",
        "GetNumberOfInputStreamsWithPermission",
        "SetGlobalOutputChannelRemix",
        "SetPlayerPlaybackStatus",
        "SetPlayerIdentity",
        "SetPlayerPosition",
        "SetPlayerMetadata",
        "SetHotwordModel",
        "IsAudioOutputActive",
        "GetDefaultOutputBufferSize",
        "Introspect",
    ];
    let mut xml = String::from("<node>\n  <interface name=\"org.aural.Control\">\n");
    for method in methods {
        xml.push_str(&format!("    <method name=\"{method}\"/>\n"));
    }
    xml.push_str("  </interface>\n</node>\n");
    xml
}
