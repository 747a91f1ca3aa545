//! The control plane aggregate and event loop.

use crate::config::ServerConfig;
use crate::state::SystemState;
use aural_bt::{BtArena, BtError, BtPolicy, BtPolicyOps};
use aural_core::pump::{
    BtHostEvent, DeviceAction, HandlerTable, MainMessage, MessagePump, MessageTag,
};
use aural_core::{AudioThreadEvent, BtDeviceId, BtProfile, Stream, StreamId, SuspendReason};
use aural_device::{DeviceRegistry, NodeRecord};
use aural_observer::{
    AudioThreadMonitor, EwmaReporterControl, ObserverServer, PrepareAction, RtcActiveSink,
    RtcDetector, SpeakOnMuteConfig, SpeakOnMuteError, SpeakOnMuteMonitor,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default BT policy ops: log-only stand-in until a transport registers the
/// real implementation.
struct LogBtOps;

impl BtPolicyOps for LogBtOps {
    fn connect_profile(&mut self, device: BtDeviceId, profile: BtProfile) {
        info!(?device, ?profile, "requesting profile connection");
    }
    fn start_a2dp(&mut self, device: BtDeviceId) {
        info!(?device, "starting a2dp");
    }
    fn start_hfp(&mut self, device: BtDeviceId) -> Result<(), BtError> {
        info!(?device, "starting hfp audio gateway");
        Ok(())
    }
    fn suspend_a2dp(&mut self, device: BtDeviceId) {
        info!(?device, "suspending a2dp");
    }
    fn suspend_hfp(&mut self, device: BtDeviceId) {
        info!(?device, "suspending hfp");
    }
    fn disconnect(&mut self, device: BtDeviceId) {
        info!(?device, "requesting disconnect");
    }
    fn deconflict(&mut self, keep: BtDeviceId) {
        info!(?keep, "deconflicting other bt peers");
    }
}

struct LogRtcSink;

impl RtcActiveSink for LogRtcSink {
    fn rtc_active_changed(&mut self, active: bool) {
        info!(active, "rtc state changed");
    }
}

/// The process-wide aggregate.
///
/// Everything mutable lives here and is touched only from the control
/// thread; the audio threads reach it exclusively through main-thread
/// messages.
pub struct ControlPlane {
    pub observer: ObserverServer,
    pub registry: DeviceRegistry,
    pub arena: BtArena,
    pub policy: BtPolicy,
    pub monitor: AudioThreadMonitor,
    pub rtc: RtcDetector,
    pub speak_on_mute: SpeakOnMuteMonitor,
    pub ewma_control: EwmaReporterControl,
    pub state: SystemState,

    handlers: HandlerTable<ControlPlane>,
    bt_ops: Box<dyn BtPolicyOps>,
    rtc_sink: Box<dyn RtcActiveSink>,
    vad_target_notify: Box<dyn FnMut(Option<StreamId>)>,

    /// Node snapshot refreshed by the `nodes` alert's prepare action.
    pub cached_nodes: Vec<NodeRecord>,
    /// Global underrun counters reported on active nodes.
    pub underruns: u32,
    pub severe_underruns: u32,
    /// Latest batched power report from the audio thread.
    pub last_ewma_power: f64,
    /// Global output remix (channel count, n*n coefficient matrix).
    pub output_remix: Option<(usize, Vec<f64>)>,
}

impl ControlPlane {
    /// Bring the control plane up with default collaborators.
    pub fn new(config: &ServerConfig) -> Result<Self, SpeakOnMuteError> {
        let observer = ObserverServer::new();
        let registry = DeviceRegistry::new(observer.clone());
        let speak_on_mute = SpeakOnMuteMonitor::new(SpeakOnMuteConfig {
            detection_window_size: config.speak_on_mute.detection_window_size,
            detection_threshold: config.speak_on_mute.detection_threshold,
            rate_limit_duration: Duration::from_millis(config.speak_on_mute.rate_limit_ms),
        })?;
        let mut state = SystemState::default();
        state.wbs_enabled = config.wbs_enabled;
        state.fix_a2dp_packet_size = config.fix_a2dp_packet_size;

        let mut plane = ControlPlane {
            observer,
            registry,
            arena: BtArena::new(),
            policy: BtPolicy::new(),
            monitor: AudioThreadMonitor::new(),
            rtc: RtcDetector::new(),
            speak_on_mute,
            ewma_control: EwmaReporterControl::new(),
            state,
            handlers: HandlerTable::new(),
            bt_ops: Box::new(LogBtOps),
            rtc_sink: Box::new(LogRtcSink),
            vad_target_notify: Box::new(|target| {
                debug!(?target, "vad target forwarded to audio thread");
            }),
            cached_nodes: Vec::new(),
            underruns: 0,
            severe_underruns: 0,
            last_ewma_power: 0.0,
            output_remix: None,
        };
        plane.register_default_handlers();
        Ok(plane)
    }

    /// Replace the BT policy ops (a transport registering itself).
    pub fn set_bt_ops(&mut self, ops: Box<dyn BtPolicyOps>) {
        self.bt_ops = ops;
    }

    /// Replace the RTC edge sink.
    pub fn set_rtc_sink(&mut self, sink: Box<dyn RtcActiveSink>) {
        self.rtc_sink = sink;
    }

    /// Replace the audio-thread VAD target notifier.
    pub fn set_vad_target_notify(&mut self, notify: Box<dyn FnMut(Option<StreamId>)>) {
        self.vad_target_notify = notify;
    }

    fn register_default_handlers(&mut self) {
        let table = &mut self.handlers;
        table.register(MessageTag::AudioThreadEvent, |plane, msg| {
            if let MainMessage::AudioThreadEvent { event } = msg {
                plane.handle_audio_thread_event(event, Instant::now());
            }
        });
        table.register(MessageTag::Bt, |plane, msg| {
            if let MainMessage::Bt { event } = msg {
                plane.handle_bt_host_event(event, Instant::now());
            }
        });
        table.register(MessageTag::BtPolicy, |plane, msg| {
            if let MainMessage::BtPolicy(cmd) = msg {
                plane.policy.handle_message(
                    cmd,
                    &mut plane.arena,
                    &mut plane.registry,
                    Instant::now(),
                );
            }
        });
        table.register(MessageTag::A2dp, |plane, msg| {
            if let MainMessage::A2dp { dev_index } = msg {
                plane.handle_a2dp_force_suspend(dev_index);
            }
        });
        table.register(MessageTag::MonitorDevice, |plane, msg| {
            if let MainMessage::MonitorDevice { dev_index, action } = msg {
                plane.handle_monitor_device(dev_index, action, Instant::now());
            }
        });
        table.register(MessageTag::HotwordTriggered, |plane, msg| {
            if let MainMessage::HotwordTriggered { tv_sec, tv_nsec } = msg {
                plane.observer.notify_hotword_triggered(tv_sec, tv_nsec);
            }
        });
        table.register(MessageTag::NonEmptyAudioState, |plane, msg| {
            if let MainMessage::NonEmptyAudioState { non_empty } = msg {
                plane.state.non_empty_audio = non_empty;
                plane
                    .observer
                    .notify_non_empty_audio_state_changed(non_empty);
            }
        });
        table.register(MessageTag::SpeakOnMute, |plane, msg| {
            if let MainMessage::SpeakOnMute { detected, when_ns } = msg {
                let capture_muted = plane.state.capture_mute;
                plane.speak_on_mute.handle_activity(
                    &plane.observer,
                    capture_muted,
                    detected,
                    Duration::from_nanos(when_ns),
                );
            }
        });
        table.register(MessageTag::StreamApm, |plane, msg| {
            if let MainMessage::StreamApm { stream_id } = msg {
                debug!(stream_id, "stream apm changed");
                plane.refresh_stream_dependents();
            }
        });
        table.register(MessageTag::Metrics, |_plane, msg| {
            if let MainMessage::Metrics { name, value } = msg {
                debug!(name, value, "metrics sample");
            }
        });
        table.register(MessageTag::EwmaPowerReport, |plane, msg| {
            if let MainMessage::EwmaPowerReport { power } = msg {
                plane.last_ewma_power = power;
            }
        });
    }

    /// Dispatch one main-thread message to its registered handler.
    pub fn dispatch_message(&mut self, msg: MainMessage) {
        let mut handlers = std::mem::take(&mut self.handlers);
        let handled = handlers.dispatch(self, msg);
        self.handlers = handlers;
        if !handled {
            debug!("message with no registered handler dropped");
        }
    }

    /// Fire due policy timers.
    pub fn tick_timers(&mut self, now: Instant) {
        self.policy
            .tick(&mut self.arena, &mut self.registry, &mut *self.bt_ops, now);
    }

    /// Drain pending alerts, running prepare actions first.
    pub fn dispatch_alerts(&mut self) {
        let observer = self.observer.clone();
        observer.dispatch_alerts(&mut |action| match action {
            PrepareAction::RefreshNodeList => {
                self.cached_nodes = self.registry.node_records();
            }
        });
    }

    /// One event-loop iteration: wait for a message (bounded by the next
    /// timer deadline), dispatch, fire timers, drain alerts.
    pub fn run_iteration(&mut self, pump: &MessagePump, max_wait: Duration) {
        let now = Instant::now();
        let wait = self
            .policy
            .next_deadline()
            .map_or(max_wait, |d| d.saturating_duration_since(now))
            .min(max_wait);
        if let Some(msg) = pump.poll(wait) {
            self.dispatch_message(msg);
            while let Some(msg) = pump.try_poll() {
                self.dispatch_message(msg);
            }
        }
        self.tick_timers(Instant::now());
        self.dispatch_alerts();
    }

    /// Track a newly attached stream through every consumer: registry
    /// bookkeeping, loopback routing, RTC pairing, VAD target, power
    /// metering.
    pub fn stream_attached(&mut self, stream: Stream, now: Instant) {
        let id = stream.id;
        let dev_index = stream.dev_index;
        self.registry.add_stream(stream);
        {
            let streams = self.registry.streams_mut();
            self.rtc
                .add_stream(streams, id, dev_index, now, &mut *self.rtc_sink);
        }
        self.refresh_stream_dependents();
    }

    /// Untrack a detached stream.
    pub fn stream_detached(&mut self, id: StreamId) {
        let dev_index = self
            .registry
            .streams()
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.dev_index);
        if let Some(dev_index) = dev_index {
            self.rtc
                .remove_stream(self.registry.streams(), id, dev_index, &mut *self.rtc_sink);
        }
        self.registry.rm_stream(id);
        self.refresh_stream_dependents();
    }

    /// Re-derive the VAD target and power-meter target from the stream
    /// list.
    pub fn refresh_stream_dependents(&mut self) {
        let capture_muted = self.state.capture_mute;
        self.speak_on_mute.streams_changed(
            self.registry.streams(),
            capture_muted,
            &mut *self.vad_target_notify,
        );
        self.ewma_control.streams_changed(self.registry.streams());
    }

    /// Enable or disable speak-on-mute detection, re-deriving the VAD
    /// target.
    pub fn set_speak_on_mute_enabled(&mut self, enabled: bool) {
        let capture_muted = self.state.capture_mute;
        self.speak_on_mute
            .set_enabled(enabled, capture_muted, &mut *self.vad_target_notify);
    }

    /// React to a capture-mute flip everywhere it matters.
    pub fn capture_mute_changed(&mut self) {
        let capture_muted = self.state.capture_mute;
        self.speak_on_mute
            .capture_mute_changed(capture_muted, &mut *self.vad_target_notify);
    }

    fn handle_audio_thread_event(&mut self, event: AudioThreadEvent, now: Instant) {
        match event {
            AudioThreadEvent::Underrun => self.underruns += 1,
            AudioThreadEvent::SevereUnderrun => self.severe_underruns += 1,
            _ => {}
        }
        self.monitor.handle_event(&self.observer, event, now);
    }

    fn handle_bt_host_event(&mut self, event: BtHostEvent, now: Instant) {
        match event {
            BtHostEvent::DeviceAdded { device } => {
                if self.arena.is_valid(device) {
                    self.policy.start_connection_watch(device, now);
                }
            }
            BtHostEvent::DeviceRemoved { device } => {
                self.policy.remove_device(device);
                if self.arena.remove(device).is_some() {
                    self.observer.notify_nodes();
                }
            }
            BtHostEvent::ProfileConnected { device, profile } => {
                if let Some(dev) = self.arena.get_mut(device) {
                    dev.set_profile_connected(profile, true);
                }
            }
            BtHostEvent::ProfileDropped { device, profile } => {
                let Some(dev) = self.arena.get_mut(device) else {
                    return;
                };
                dev.set_profile_connected(profile, false);
                warn!(?profile, "unexpected profile drop");
                self.policy.schedule_suspend(
                    device,
                    Duration::ZERO,
                    SuspendReason::UnexpectedProfileDrop,
                    now,
                );
            }
        }
    }

    fn handle_a2dp_force_suspend(&mut self, dev_index: u32) {
        // The iodev may already be gone; a stale index is silent.
        if self.registry.device(dev_index).is_none() {
            return;
        }
        if let Err(err) = self.registry.suspend_dev(dev_index) {
            warn!(%err, dev_index, "a2dp force suspend failed");
        }
    }

    fn handle_monitor_device(&mut self, dev_index: u32, action: DeviceAction, now: Instant) {
        match action {
            DeviceAction::Reset => {
                if self.registry.suspend_dev(dev_index).is_ok() {
                    if let Err(err) = self.registry.resume_dev(dev_index, now) {
                        warn!(%err, dev_index, "device reset failed to re-open");
                    }
                }
            }
            DeviceAction::SetMuteState => {
                let volume = if self.state.output_muted() {
                    0
                } else {
                    self.state.volume.max(0) as u32
                };
                if let Some(dev) = self.registry.device(dev_index) {
                    dev.borrow_mut().set_volume(volume);
                }
            }
        }
    }
}
