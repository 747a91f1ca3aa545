//! Named alerts with coalescing.

use aural_core::{ClientType, Direction, NodeId, StreamType};
use std::collections::VecDeque;

/// Pseudo-direction buckets for the active-stream counters.
///
/// Streams can attach to the post-mix loopback tap in addition to the real
/// directions, and each bucket gets its own alert so counter updates cannot
/// shadow each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamBucket {
    Output,
    Input,
    PostMixPreDsp,
}

impl From<Direction> for StreamBucket {
    fn from(dir: Direction) -> Self {
        match dir {
            Direction::Output => StreamBucket::Output,
            Direction::Input => StreamBucket::Input,
        }
    }
}

/// The named alerts of the observer bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    OutputVolume,
    OutputMute,
    CaptureGain,
    CaptureMute,
    Nodes,
    ActiveNode,
    OutputNodeVolume,
    NodeLeftRightSwapped,
    InputNodeGain,
    SuspendChanged,
    HotwordTriggered,
    NumActiveStreams(StreamBucket),
    NumNonChromeOutputStreams,
    NonEmptyAudioStateChanged,
    BtBatteryChanged,
    NumInputStreamsWithPermission,
    SevereUnderrun,
    Underrun,
    GeneralSurvey,
    SpeakOnMuteDetected,
}

impl AlertKind {
    /// Whether distinct payloads are queued instead of coalesced.
    ///
    /// Active-node changes track user intent; dropping an intermediate
    /// selection would desynchronise preference recall, so every payload is
    /// delivered.
    pub fn keeps_all_data(self) -> bool {
        matches!(self, AlertKind::ActiveNode)
    }

    /// The prepare action to run before fan-out, if any.
    pub fn prepare(self) -> Option<PrepareAction> {
        match self {
            AlertKind::Nodes => Some(PrepareAction::RefreshNodeList),
            _ => None,
        }
    }
}

/// Work the dispatching control plane performs before an alert fans out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareAction {
    /// Re-derive the cached device/node list before `nodes_changed` fires.
    RefreshNodeList,
}

/// Payload attached to a pending alert.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertPayload {
    OutputVolume {
        volume: i32,
    },
    OutputMute {
        muted: bool,
        user_muted: bool,
    },
    CaptureGain {
        gain: i32,
    },
    CaptureMute {
        muted: bool,
    },
    Nodes,
    ActiveNode {
        direction: Direction,
        node_id: NodeId,
    },
    OutputNodeVolume {
        node_id: NodeId,
        volume: i32,
    },
    NodeLeftRightSwapped {
        node_id: NodeId,
        swapped: bool,
    },
    InputNodeGain {
        node_id: NodeId,
        gain: i32,
    },
    SuspendChanged {
        suspended: bool,
    },
    HotwordTriggered {
        tv_sec: i64,
        tv_nsec: i64,
    },
    NumActiveStreams {
        bucket: StreamBucket,
        count: u32,
    },
    NumNonChromeOutputStreams {
        count: u32,
    },
    NonEmptyAudioStateChanged {
        non_empty: bool,
    },
    BtBatteryChanged {
        address: String,
        level: u32,
    },
    NumInputStreamsWithPermission {
        counts: [u32; ClientType::COUNT],
    },
    SevereUnderrun,
    Underrun,
    GeneralSurvey {
        stream_type: StreamType,
        client_type: ClientType,
        node_pair: String,
    },
    SpeakOnMuteDetected,
}

/// One named alert: flags plus the pending payload queue.
#[derive(Debug, Default)]
pub(crate) struct Alert {
    pending: VecDeque<AlertPayload>,
}

impl Alert {
    /// Queue a payload, coalescing latest-wins unless the kind keeps all
    /// data.
    pub(crate) fn pend(&mut self, kind: AlertKind, payload: AlertPayload) {
        if !kind.keeps_all_data() {
            self.pending.clear();
        }
        self.pending.push_back(payload);
    }

    pub(crate) fn take_pending(&mut self) -> VecDeque<AlertPayload> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
