//! Observer client registry and alert fan-out.

use crate::alert::{Alert, AlertKind, AlertPayload, PrepareAction, StreamBucket};
use aural_core::{ClientType, Direction, NodeId, StreamType};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Callbacks a subscriber may implement. Every method defaults to a no-op,
/// so clients implement only the slots they care about.
#[allow(unused_variables)]
pub trait AudioObserver {
    fn output_volume_changed(&mut self, volume: i32) {}
    fn output_mute_changed(&mut self, muted: bool, user_muted: bool) {}
    fn capture_gain_changed(&mut self, gain: i32) {}
    fn capture_mute_changed(&mut self, muted: bool) {}
    fn nodes_changed(&mut self) {}
    fn active_node_changed(&mut self, direction: Direction, node_id: NodeId) {}
    fn output_node_volume_changed(&mut self, node_id: NodeId, volume: i32) {}
    fn node_left_right_swapped_changed(&mut self, node_id: NodeId, swapped: bool) {}
    fn input_node_gain_changed(&mut self, node_id: NodeId, gain: i32) {}
    fn suspend_changed(&mut self, suspended: bool) {}
    fn hotword_triggered(&mut self, tv_sec: i64, tv_nsec: i64) {}
    fn num_active_streams_changed(&mut self, bucket: StreamBucket, count: u32) {}
    fn num_non_chrome_output_streams_changed(&mut self, count: u32) {}
    fn non_empty_audio_state_changed(&mut self, non_empty: bool) {}
    fn bt_battery_changed(&mut self, address: &str, level: u32) {}
    fn num_input_streams_with_permission_changed(&mut self, counts: &[u32; ClientType::COUNT]) {}
    fn severe_underrun(&mut self) {}
    fn underrun(&mut self) {}
    fn general_survey(
        &mut self,
        stream_type: StreamType,
        client_type: ClientType,
        node_pair: &str,
    ) {
    }
    fn speak_on_mute_detected(&mut self) {}
}

/// Handle identifying a registered observer client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type ClientRef = Rc<RefCell<dyn AudioObserver>>;

struct Inner {
    next_id: u64,
    clients: Vec<(ObserverId, ClientRef)>,
    alerts: HashMap<AlertKind, Alert>,
    pending_order: Vec<AlertKind>,
}

/// The observer bus.
///
/// Cheap to clone; clones share state, which lets a client callback add or
/// remove observers through its own handle mid-dispatch. Clients added
/// during a dispatch cycle observe the next cycle; clients removed during a
/// cycle are unlinked before their next would-be callback.
#[derive(Clone)]
pub struct ObserverServer {
    inner: Rc<RefCell<Inner>>,
}

impl Default for ObserverServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverServer {
    /// Create an empty bus.
    pub fn new() -> Self {
        ObserverServer {
            inner: Rc::new(RefCell::new(Inner {
                next_id: 1,
                clients: Vec::new(),
                alerts: HashMap::new(),
                pending_order: Vec::new(),
            })),
        }
    }

    /// Register an observer client.
    pub fn add(&self, client: Rc<RefCell<dyn AudioObserver>>) -> ObserverId {
        let mut inner = self.inner.borrow_mut();
        let id = ObserverId(inner.next_id);
        inner.next_id += 1;
        inner.clients.push((id, client));
        id
    }

    /// Remove an observer client. Safe during dispatch.
    pub fn remove(&self, id: ObserverId) {
        self.inner.borrow_mut().clients.retain(|(cid, _)| *cid != id);
    }

    /// Number of registered clients.
    pub fn num_clients(&self) -> usize {
        self.inner.borrow().clients.len()
    }

    /// Whether any alert has pending payloads.
    pub fn has_pending_alerts(&self) -> bool {
        self.inner
            .borrow()
            .alerts
            .values()
            .any(Alert::has_pending)
    }

    fn pend(&self, kind: AlertKind, payload: AlertPayload) {
        let mut inner = self.inner.borrow_mut();
        if !inner.pending_order.contains(&kind) {
            inner.pending_order.push(kind);
        }
        inner.alerts.entry(kind).or_default().pend(kind, payload);
    }

    // Notify entry points, one per alert.

    pub fn notify_output_volume(&self, volume: i32) {
        self.pend(AlertKind::OutputVolume, AlertPayload::OutputVolume { volume });
    }

    pub fn notify_output_mute(&self, muted: bool, user_muted: bool) {
        self.pend(
            AlertKind::OutputMute,
            AlertPayload::OutputMute { muted, user_muted },
        );
    }

    pub fn notify_capture_gain(&self, gain: i32) {
        self.pend(AlertKind::CaptureGain, AlertPayload::CaptureGain { gain });
    }

    pub fn notify_capture_mute(&self, muted: bool) {
        self.pend(AlertKind::CaptureMute, AlertPayload::CaptureMute { muted });
    }

    pub fn notify_nodes(&self) {
        self.pend(AlertKind::Nodes, AlertPayload::Nodes);
    }

    pub fn notify_active_node(&self, direction: Direction, node_id: NodeId) {
        self.pend(
            AlertKind::ActiveNode,
            AlertPayload::ActiveNode { direction, node_id },
        );
    }

    pub fn notify_output_node_volume(&self, node_id: NodeId, volume: i32) {
        self.pend(
            AlertKind::OutputNodeVolume,
            AlertPayload::OutputNodeVolume { node_id, volume },
        );
    }

    pub fn notify_node_left_right_swapped(&self, node_id: NodeId, swapped: bool) {
        self.pend(
            AlertKind::NodeLeftRightSwapped,
            AlertPayload::NodeLeftRightSwapped { node_id, swapped },
        );
    }

    pub fn notify_input_node_gain(&self, node_id: NodeId, gain: i32) {
        self.pend(
            AlertKind::InputNodeGain,
            AlertPayload::InputNodeGain { node_id, gain },
        );
    }

    pub fn notify_suspend_changed(&self, suspended: bool) {
        self.pend(
            AlertKind::SuspendChanged,
            AlertPayload::SuspendChanged { suspended },
        );
    }

    pub fn notify_hotword_triggered(&self, tv_sec: i64, tv_nsec: i64) {
        self.pend(
            AlertKind::HotwordTriggered,
            AlertPayload::HotwordTriggered { tv_sec, tv_nsec },
        );
    }

    pub fn notify_num_active_streams(&self, bucket: StreamBucket, count: u32) {
        self.pend(
            AlertKind::NumActiveStreams(bucket),
            AlertPayload::NumActiveStreams { bucket, count },
        );
    }

    pub fn notify_num_non_chrome_output_streams(&self, count: u32) {
        self.pend(
            AlertKind::NumNonChromeOutputStreams,
            AlertPayload::NumNonChromeOutputStreams { count },
        );
    }

    pub fn notify_non_empty_audio_state_changed(&self, non_empty: bool) {
        self.pend(
            AlertKind::NonEmptyAudioStateChanged,
            AlertPayload::NonEmptyAudioStateChanged { non_empty },
        );
    }

    pub fn notify_bt_battery_changed(&self, address: String, level: u32) {
        self.pend(
            AlertKind::BtBatteryChanged,
            AlertPayload::BtBatteryChanged { address, level },
        );
    }

    pub fn notify_input_streams_with_permission(&self, counts: [u32; ClientType::COUNT]) {
        self.pend(
            AlertKind::NumInputStreamsWithPermission,
            AlertPayload::NumInputStreamsWithPermission { counts },
        );
    }

    pub fn notify_severe_underrun(&self) {
        self.pend(AlertKind::SevereUnderrun, AlertPayload::SevereUnderrun);
    }

    pub fn notify_underrun(&self) {
        self.pend(AlertKind::Underrun, AlertPayload::Underrun);
    }

    pub fn notify_general_survey(
        &self,
        stream_type: StreamType,
        client_type: ClientType,
        node_pair: String,
    ) {
        self.pend(
            AlertKind::GeneralSurvey,
            AlertPayload::GeneralSurvey {
                stream_type,
                client_type,
                node_pair,
            },
        );
    }

    pub fn notify_speak_on_mute_detected(&self) {
        self.pend(AlertKind::SpeakOnMuteDetected, AlertPayload::SpeakOnMuteDetected);
    }

    /// Run one dispatch cycle.
    ///
    /// Takes everything pending at entry, runs each alert's prepare action
    /// through `prepare`, and fans payloads out to the clients registered at
    /// entry. Alerts pended by callbacks stay queued for the next cycle.
    pub fn dispatch_alerts(&self, prepare: &mut dyn FnMut(PrepareAction)) {
        let (batch, clients) = {
            let mut inner = self.inner.borrow_mut();
            let order = std::mem::take(&mut inner.pending_order);
            let batch: Vec<(AlertKind, Vec<AlertPayload>)> = order
                .into_iter()
                .map(|kind| {
                    let payloads = inner
                        .alerts
                        .get_mut(&kind)
                        .map(|a| a.take_pending().into_iter().collect())
                        .unwrap_or_default();
                    (kind, payloads)
                })
                .collect();
            (batch, inner.clients.clone())
        };

        for (kind, payloads) in batch {
            if let Some(action) = kind.prepare() {
                prepare(action);
            }
            for payload in payloads {
                for (id, client) in &clients {
                    let alive = self
                        .inner
                        .borrow()
                        .clients
                        .iter()
                        .any(|(cid, _)| cid == id);
                    if !alive {
                        continue;
                    }
                    deliver(&mut *client.borrow_mut(), &payload);
                }
            }
        }
    }
}

fn deliver(client: &mut dyn AudioObserver, payload: &AlertPayload) {
    match payload {
        AlertPayload::OutputVolume { volume } => client.output_volume_changed(*volume),
        AlertPayload::OutputMute { muted, user_muted } => {
            client.output_mute_changed(*muted, *user_muted);
        }
        AlertPayload::CaptureGain { gain } => client.capture_gain_changed(*gain),
        AlertPayload::CaptureMute { muted } => client.capture_mute_changed(*muted),
        AlertPayload::Nodes => client.nodes_changed(),
        AlertPayload::ActiveNode { direction, node_id } => {
            client.active_node_changed(*direction, *node_id);
        }
        AlertPayload::OutputNodeVolume { node_id, volume } => {
            client.output_node_volume_changed(*node_id, *volume);
        }
        AlertPayload::NodeLeftRightSwapped { node_id, swapped } => {
            client.node_left_right_swapped_changed(*node_id, *swapped);
        }
        AlertPayload::InputNodeGain { node_id, gain } => {
            client.input_node_gain_changed(*node_id, *gain);
        }
        AlertPayload::SuspendChanged { suspended } => client.suspend_changed(*suspended),
        AlertPayload::HotwordTriggered { tv_sec, tv_nsec } => {
            client.hotword_triggered(*tv_sec, *tv_nsec);
        }
        AlertPayload::NumActiveStreams { bucket, count } => {
            client.num_active_streams_changed(*bucket, *count);
        }
        AlertPayload::NumNonChromeOutputStreams { count } => {
            client.num_non_chrome_output_streams_changed(*count);
        }
        AlertPayload::NonEmptyAudioStateChanged { non_empty } => {
            client.non_empty_audio_state_changed(*non_empty);
        }
        AlertPayload::BtBatteryChanged { address, level } => {
            client.bt_battery_changed(address, *level);
        }
        AlertPayload::NumInputStreamsWithPermission { counts } => {
            client.num_input_streams_with_permission_changed(counts);
        }
        AlertPayload::SevereUnderrun => client.severe_underrun(),
        AlertPayload::Underrun => client.underrun(),
        AlertPayload::GeneralSurvey {
            stream_type,
            client_type,
            node_pair,
        } => client.general_survey(*stream_type, *client_type, node_pair),
        AlertPayload::SpeakOnMuteDetected => client.speak_on_mute_detected(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        volumes: Vec<i32>,
        active_nodes: Vec<NodeId>,
        nodes_changed: usize,
    }

    impl AudioObserver for Recorder {
        fn output_volume_changed(&mut self, volume: i32) {
            self.volumes.push(volume);
        }
        fn active_node_changed(&mut self, _direction: Direction, node_id: NodeId) {
            self.active_nodes.push(node_id);
        }
        fn nodes_changed(&mut self) {
            self.nodes_changed += 1;
        }
    }

    fn no_prepare(_: PrepareAction) {}

    #[test]
    fn coalesced_alert_delivers_latest_only() {
        let bus = ObserverServer::new();
        let rec = Rc::new(RefCell::new(Recorder::default()));
        bus.add(rec.clone());

        bus.notify_output_volume(10);
        bus.notify_output_volume(30);
        bus.dispatch_alerts(&mut no_prepare);

        assert_eq!(rec.borrow().volumes, vec![30]);
    }

    #[test]
    fn keep_all_alert_delivers_every_payload() {
        let bus = ObserverServer::new();
        let rec = Rc::new(RefCell::new(Recorder::default()));
        bus.add(rec.clone());

        let id = NodeId::new(4, 1);
        bus.notify_active_node(Direction::Output, id);
        bus.notify_active_node(Direction::Output, id);
        bus.dispatch_alerts(&mut no_prepare);

        assert_eq!(rec.borrow().active_nodes, vec![id, id]);
    }

    #[test]
    fn prepare_runs_before_nodes_fan_out() {
        let bus = ObserverServer::new();
        let rec = Rc::new(RefCell::new(Recorder::default()));
        bus.add(rec.clone());

        bus.notify_nodes();
        let mut prepared = Vec::new();
        bus.dispatch_alerts(&mut |action| prepared.push(action));

        assert_eq!(prepared, vec![PrepareAction::RefreshNodeList]);
        assert_eq!(rec.borrow().nodes_changed, 1);
    }

    #[test]
    fn removed_client_misses_remaining_callbacks() {
        let bus = ObserverServer::new();
        let rec = Rc::new(RefCell::new(Recorder::default()));
        let id = bus.add(rec.clone());

        bus.notify_output_volume(10);
        bus.remove(id);
        bus.dispatch_alerts(&mut no_prepare);

        assert!(rec.borrow().volumes.is_empty());
    }

    /// A client that removes itself on its first callback.
    struct SelfRemover {
        bus: ObserverServer,
        id: Option<ObserverId>,
        calls: usize,
    }

    impl AudioObserver for SelfRemover {
        fn active_node_changed(&mut self, _direction: Direction, _node_id: NodeId) {
            self.calls += 1;
            if let Some(id) = self.id.take() {
                self.bus.remove(id);
            }
        }
    }

    #[test]
    fn client_can_remove_itself_mid_dispatch() {
        let bus = ObserverServer::new();
        let client = Rc::new(RefCell::new(SelfRemover {
            bus: bus.clone(),
            id: None,
            calls: 0,
        }));
        let id = bus.add(client.clone());
        client.borrow_mut().id = Some(id);

        // Two queued payloads; the second must not be delivered.
        bus.notify_active_node(Direction::Output, NodeId::new(1, 0));
        bus.notify_active_node(Direction::Output, NodeId::new(2, 0));
        bus.dispatch_alerts(&mut no_prepare);

        assert_eq!(client.borrow().calls, 1);
        assert_eq!(bus.num_clients(), 0);
    }

    /// A client that pends a new alert from inside a callback.
    struct Repender {
        bus: ObserverServer,
        saw: Rc<RefCell<Vec<i32>>>,
    }

    impl AudioObserver for Repender {
        fn output_volume_changed(&mut self, volume: i32) {
            self.saw.borrow_mut().push(volume);
            if volume == 1 {
                self.bus.notify_output_volume(2);
            }
        }
    }

    #[test]
    fn alerts_pended_during_dispatch_wait_for_next_cycle() {
        let bus = ObserverServer::new();
        let saw = Rc::new(RefCell::new(Vec::new()));
        bus.add(Rc::new(RefCell::new(Repender {
            bus: bus.clone(),
            saw: saw.clone(),
        })));

        bus.notify_output_volume(1);
        bus.dispatch_alerts(&mut no_prepare);
        assert_eq!(*saw.borrow(), vec![1]);
        assert!(bus.has_pending_alerts());

        bus.dispatch_alerts(&mut no_prepare);
        assert_eq!(*saw.borrow(), vec![1, 2]);
    }
}
