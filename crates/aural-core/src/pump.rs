//! Main-thread message pump.
//!
//! The pump is the single ordered channel from any thread to the control
//! thread. Senders encode a [`MainMessage`] as a length-prefixed record and
//! push it through an OS pipe in one write; a drain thread owned by the pump
//! decodes records and forwards them to the control thread, which waits on
//! [`MessagePump::poll`] with a timeout bounded by its timer queue.
//!
//! Messages carry ids, never references. A handler validates that the named
//! object still exists before acting, so a message that raced with teardown
//! drops silently.

use crate::error::CoreError;
use crate::types::{AudioThreadEvent, BtDeviceId, BtProfile, SuspendReason};
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::warn;

/// Largest encoded record, chosen so one pipe write is atomic.
pub const MAX_RECORD_BYTES: usize = 4096;

/// Type tag of a main-thread message. One handler may be registered per tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    A2dp,
    AudioThreadEvent,
    Bt,
    BtPolicy,
    Metrics,
    MonitorDevice,
    HotwordTriggered,
    NonEmptyAudioState,
    SpeakOnMute,
    StreamApm,
    EwmaPowerReport,
}

/// Events posted by the BT host adapter layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BtHostEvent {
    /// A remote peer appeared.
    DeviceAdded { device: BtDeviceId },
    /// A remote peer disappeared.
    DeviceRemoved { device: BtDeviceId },
    /// A profile reached connected state.
    ProfileConnected {
        device: BtDeviceId,
        profile: BtProfile,
    },
    /// A profile dropped without the server asking.
    ProfileDropped {
        device: BtDeviceId,
        profile: BtProfile,
    },
}

/// Commands serialized to the BT policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BtPolicyMsg {
    /// Close both iodevs of the device's manager and re-open on the other
    /// profile (output delayed).
    SwitchProfile { device: BtDeviceId },
    /// Arm (or keep) the per-device suspend timer.
    ScheduleSuspend {
        device: BtDeviceId,
        delay_ms: u64,
        reason: SuspendReason,
    },
    /// Disarm the per-device suspend timer.
    CancelSuspend { device: BtDeviceId },
}

/// Requests to the device monitor (reset a misbehaving device, re-apply
/// mute state after a route change).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceAction {
    Reset,
    SetMuteState,
}

/// A typed record deliverable to the control thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MainMessage {
    /// A2DP endpoint asks to tear down its iodev after an unrecoverable
    /// transport error.
    A2dp { dev_index: u32 },
    /// Anomaly classified by the audio callback thread.
    AudioThreadEvent { event: AudioThreadEvent },
    /// BT host adapter event.
    Bt { event: BtHostEvent },
    /// BT policy command.
    BtPolicy(BtPolicyMsg),
    /// Metrics sample for out-of-band reporting.
    Metrics { name: String, value: i64 },
    /// Device monitor request.
    MonitorDevice { dev_index: u32, action: DeviceAction },
    /// Hotword fired at the given monotonic timestamp.
    HotwordTriggered { tv_sec: i64, tv_nsec: i64 },
    /// The mix transitioned between silent and non-silent.
    NonEmptyAudioState { non_empty: bool },
    /// Voice-activity sample from the VAD target stream.
    ///
    /// `when_ns` is nanoseconds on the sender's monotonic clock; only
    /// relative ordering is used.
    SpeakOnMute { detected: bool, when_ns: u64 },
    /// A stream's audio-processing module changed state.
    StreamApm { stream_id: u32 },
    /// Batched maximum EWMA power since the previous report.
    EwmaPowerReport { power: f64 },
}

impl MainMessage {
    /// The tag this message dispatches on.
    pub fn tag(&self) -> MessageTag {
        match self {
            MainMessage::A2dp { .. } => MessageTag::A2dp,
            MainMessage::AudioThreadEvent { .. } => MessageTag::AudioThreadEvent,
            MainMessage::Bt { .. } => MessageTag::Bt,
            MainMessage::BtPolicy(_) => MessageTag::BtPolicy,
            MainMessage::Metrics { .. } => MessageTag::Metrics,
            MainMessage::MonitorDevice { .. } => MessageTag::MonitorDevice,
            MainMessage::HotwordTriggered { .. } => MessageTag::HotwordTriggered,
            MainMessage::NonEmptyAudioState { .. } => MessageTag::NonEmptyAudioState,
            MainMessage::SpeakOnMute { .. } => MessageTag::SpeakOnMute,
            MainMessage::StreamApm { .. } => MessageTag::StreamApm,
            MainMessage::EwmaPowerReport { .. } => MessageTag::EwmaPowerReport,
        }
    }
}

/// Cloneable sending half of the pump. Safe to use from the audio thread;
/// never blocks past the pipe write itself.
#[derive(Debug, Clone)]
pub struct MessageSender {
    writer: std::sync::Arc<std::io::PipeWriter>,
}

impl MessageSender {
    /// Encode and transmit one message as a single pipe write.
    ///
    /// Fails if the record exceeds [`MAX_RECORD_BYTES`] or the write is
    /// short; the caller decides whether to retry or drop.
    pub fn send(&mut self, msg: &MainMessage) -> Result<(), CoreError> {
        let body = serde_json::to_vec(msg)?;
        let total = body.len() + 4;
        if total > MAX_RECORD_BYTES {
            return Err(CoreError::MessageTooLong {
                len: total,
                max: MAX_RECORD_BYTES,
            });
        }
        let mut record = Vec::with_capacity(total);
        record.extend_from_slice(&(body.len() as u32).to_le_bytes());
        record.extend_from_slice(&body);
        let written = (&*self.writer).write(&record)?;
        if written != record.len() {
            return Err(CoreError::ShortWrite {
                written,
                len: record.len(),
            });
        }
        Ok(())
    }
}

/// Control-thread half of the pump.
pub struct MessagePump {
    rx: Receiver<MainMessage>,
    sender: MessageSender,
    _drain: std::thread::JoinHandle<()>,
}

impl MessagePump {
    /// Create the pipe and start the drain thread.
    pub fn new() -> Result<Self, CoreError> {
        let (reader, writer) = std::io::pipe()?;
        let (tx, rx) = unbounded();
        let drain = std::thread::Builder::new()
            .name("aural-msg-drain".into())
            .spawn(move || drain_records(reader, &tx))?;
        Ok(MessagePump {
            rx,
            sender: MessageSender {
                writer: std::sync::Arc::new(writer),
            },
            _drain: drain,
        })
    }

    /// A sender usable from any thread.
    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// Wait up to `timeout` for the next message; `None` on timeout.
    pub fn poll(&self, timeout: Duration) -> Option<MainMessage> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take a message without waiting.
    pub fn try_poll(&self) -> Option<MainMessage> {
        self.rx.try_recv().ok()
    }
}

fn drain_records(mut reader: std::io::PipeReader, tx: &crossbeam_channel::Sender<MainMessage>) {
    loop {
        let mut len_buf = [0u8; 4];
        if reader.read_exact(&mut len_buf).is_err() {
            return;
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_RECORD_BYTES {
            warn!(len, "oversized pump record, stopping drain");
            return;
        }
        let mut body = vec![0u8; len];
        if reader.read_exact(&mut body).is_err() {
            return;
        }
        match serde_json::from_slice::<MainMessage>(&body) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    return;
                }
            }
            Err(err) => warn!(%err, "dropping undecodable pump record"),
        }
    }
}

/// Per-tag handler registry. At most one handler per tag; registering again
/// replaces the previous handler.
pub struct HandlerTable<Ctx> {
    handlers: HashMap<MessageTag, Box<dyn FnMut(&mut Ctx, MainMessage)>>,
}

impl<Ctx> Default for HandlerTable<Ctx> {
    fn default() -> Self {
        HandlerTable {
            handlers: HashMap::new(),
        }
    }
}

impl<Ctx> HandlerTable<Ctx> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `tag`, replacing any previous binding.
    pub fn register(&mut self, tag: MessageTag, handler: impl FnMut(&mut Ctx, MainMessage) + 'static) {
        self.handlers.insert(tag, Box::new(handler));
    }

    /// Remove the handler for `tag`, if any.
    pub fn unregister(&mut self, tag: MessageTag) {
        self.handlers.remove(&tag);
    }

    /// Dispatch one message to its handler. Returns whether a handler ran.
    pub fn dispatch(&mut self, ctx: &mut Ctx, msg: MainMessage) -> bool {
        match self.handlers.get_mut(&msg.tag()) {
            Some(handler) => {
                handler(ctx, msg);
                true
            }
            None => false,
        }
    }
}
