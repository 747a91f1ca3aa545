//! Registry behavior against scripted devices.

use aural_core::{ClientType, Direction, NodeId, NodeType, SampleFormat, Stream, StreamId, StreamType};
use aural_device::{
    DeviceRegistry, FloopPair, FloopParams, Iodev, IodevBase, Node, NodeAttr, RegistryError,
};
use aural_observer::{AudioObserver, ObserverServer, StreamBucket};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

struct TestDev {
    base: IodevBase,
    configure_calls: usize,
    close_calls: usize,
}

impl TestDev {
    fn new(name: &str, direction: Direction, node_type: NodeType, stable_id: u32) -> Rc<RefCell<Self>> {
        let mut base = IodevBase::new(name, direction, stable_id);
        base.supported_rates = vec![48000, 44100];
        base.supported_channel_counts = vec![2, 1];
        base.supported_formats = vec![SampleFormat::S16Le];
        let mut node = Node::new(name, node_type, stable_id);
        node.plugged = true;
        node.plugged_time = Some(std::time::SystemTime::now());
        let idx = base.add_node(node);
        base.set_active_node(idx);
        Rc::new(RefCell::new(TestDev {
            base,
            configure_calls: 0,
            close_calls: 0,
        }))
    }
}

impl Iodev for TestDev {
    fn base(&self) -> &IodevBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut IodevBase {
        &mut self.base
    }
    fn configure_dev(&mut self, _now: Instant) -> Result<(), RegistryError> {
        self.configure_calls += 1;
        self.base.buffer_size = 512;
        Ok(())
    }
    fn close_dev(&mut self) -> Result<(), RegistryError> {
        self.close_calls += 1;
        self.base.format = None;
        Ok(())
    }
    fn frames_queued(&mut self, _now: Instant) -> usize {
        0
    }
    fn write_buffer(
        &mut self,
        _frames: usize,
        _f: aural_device::WriteFn<'_>,
    ) -> Result<usize, RegistryError> {
        Ok(0)
    }
    fn read_buffer(
        &mut self,
        _frames: usize,
        _f: aural_device::ReadFn<'_>,
    ) -> Result<usize, RegistryError> {
        Ok(0)
    }
}

#[derive(Default)]
struct Recorder {
    active_nodes: Vec<(Direction, NodeId)>,
    nodes_changed: usize,
    stream_counts: Vec<(StreamBucket, u32)>,
    permission_counts: Vec<[u32; ClientType::COUNT]>,
}

impl AudioObserver for Recorder {
    fn active_node_changed(&mut self, direction: Direction, node_id: NodeId) {
        self.active_nodes.push((direction, node_id));
    }
    fn nodes_changed(&mut self) {
        self.nodes_changed += 1;
    }
    fn num_active_streams_changed(&mut self, bucket: StreamBucket, count: u32) {
        self.stream_counts.push((bucket, count));
    }
    fn num_input_streams_with_permission_changed(&mut self, counts: &[u32; ClientType::COUNT]) {
        self.permission_counts.push(*counts);
    }
}

fn setup() -> (DeviceRegistry, Rc<RefCell<Recorder>>, ObserverServer) {
    let bus = ObserverServer::new();
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    bus.add(recorder.clone());
    (DeviceRegistry::new(bus.clone()), recorder, bus)
}

fn drain(bus: &ObserverServer) {
    bus.dispatch_alerts(&mut |_| {});
}

#[test]
fn registration_assigns_indices_and_fires_nodes_changed() {
    let (mut registry, recorder, bus) = setup();
    let spk = TestDev::new("Speaker", Direction::Output, NodeType::InternalSpeaker, 1);
    let mic = TestDev::new("Internal Mic", Direction::Input, NodeType::InternalMic, 2);

    let spk_idx = registry.add_output(spk).unwrap();
    let mic_idx = registry.add_input(mic).unwrap();
    assert_ne!(spk_idx, mic_idx);
    assert!(spk_idx >= aural_observer::MAX_SPECIAL_DEVICE_IDX);

    drain(&bus);
    // Two adds coalesce into one nodes_changed per dispatch cycle.
    assert_eq!(recorder.borrow().nodes_changed, 1);
}

#[test]
fn direction_mismatch_is_rejected() {
    let (mut registry, _, _) = setup();
    let mic = TestDev::new("Mic", Direction::Input, NodeType::InternalMic, 1);
    assert!(registry.add_output(mic).is_err());
}

#[test]
fn select_node_twice_emits_twice() {
    let (mut registry, recorder, bus) = setup();
    let spk = TestDev::new("Speaker", Direction::Output, NodeType::InternalSpeaker, 1);
    let idx = registry.add_output(spk).unwrap();
    let id = NodeId::new(idx, 0);

    registry.select_node(Direction::Output, id).unwrap();
    registry.select_node(Direction::Output, id).unwrap();
    drain(&bus);

    // active_node keeps all payloads; both selections are observed.
    assert_eq!(
        recorder.borrow().active_nodes,
        vec![(Direction::Output, id), (Direction::Output, id)]
    );
}

#[test]
fn removing_active_device_reports_node_zero() {
    let (mut registry, recorder, bus) = setup();
    let spk = TestDev::new("Speaker", Direction::Output, NodeType::InternalSpeaker, 1);
    let idx = registry.add_output(spk).unwrap();
    let id = NodeId::new(idx, 0);
    registry.select_node(Direction::Output, id).unwrap();
    drain(&bus);
    recorder.borrow_mut().active_nodes.clear();

    registry.rm_output(idx).unwrap();
    drain(&bus);
    assert_eq!(
        recorder.borrow().active_nodes,
        vec![(Direction::Output, NodeId::NONE)]
    );
    assert!(recorder.borrow().nodes_changed >= 1);
}

#[test]
fn plug_edge_triggers_reconciliation() {
    let (mut registry, recorder, bus) = setup();
    let spk = TestDev::new("Speaker", Direction::Output, NodeType::InternalSpeaker, 1);
    let hp = TestDev::new("Headphone", Direction::Output, NodeType::Headphone, 2);
    hp.borrow_mut().base_mut().nodes[0].plugged = false;
    hp.borrow_mut().base_mut().nodes[0].plugged_time = None;

    let spk_idx = registry.add_output(spk).unwrap();
    let hp_idx = registry.add_output(hp).unwrap();
    registry
        .select_node(Direction::Output, NodeId::new(spk_idx, 0))
        .unwrap();
    drain(&bus);
    recorder.borrow_mut().active_nodes.clear();

    // Headphones appear: plugged selection stays with the explicit choice.
    registry
        .set_node_attr(NodeId::new(hp_idx, 0), NodeAttr::Plugged(true))
        .unwrap();
    assert_eq!(registry.active_node(Direction::Output), NodeId::new(spk_idx, 0));

    // Speaker node unplugs: the registry re-scores and picks the headphones.
    registry
        .set_node_attr(NodeId::new(spk_idx, 0), NodeAttr::Plugged(false))
        .unwrap();
    assert_eq!(registry.active_node(Direction::Output), NodeId::new(hp_idx, 0));
}

#[test]
fn scoring_prefers_recent_plug_then_type() {
    let (mut registry, _, _) = setup();
    let spk = TestDev::new("Speaker", Direction::Output, NodeType::InternalSpeaker, 1);
    let hp = TestDev::new("Headphone", Direction::Output, NodeType::Headphone, 2);
    // Same plug instant: the type table breaks the tie toward headphones.
    let t = std::time::SystemTime::now();
    spk.borrow_mut().base_mut().nodes[0].plugged_time = Some(t);
    hp.borrow_mut().base_mut().nodes[0].plugged_time = Some(t);

    registry.add_output(spk).unwrap();
    let hp_idx = registry.add_output(hp).unwrap();
    assert_eq!(registry.best_node(Direction::Output), Some(NodeId::new(hp_idx, 0)));
}

#[test]
fn format_lifecycle_follows_open_close() {
    let (mut registry, _, _) = setup();
    let spk = TestDev::new("Speaker", Direction::Output, NodeType::InternalSpeaker, 1);
    let dev = spk.clone();
    let idx = registry.add_output(spk).unwrap();

    assert!(dev.borrow().base().format.is_none());
    registry.open_dev(idx, Instant::now()).unwrap();
    {
        let d = dev.borrow();
        let fmt = d.base().format.as_ref().unwrap();
        assert_eq!(fmt.frame_rate, 48000);
        assert_eq!(fmt.num_channels, 2);
        assert_eq!(d.base().buffer_size, 512);
    }

    registry.suspend_dev(idx).unwrap();
    assert!(dev.borrow().base().format.is_none());
    assert!(registry.is_suspended(idx));

    registry.resume_dev(idx, Instant::now()).unwrap();
    assert!(dev.borrow().base().format.is_some());
    assert!(!registry.is_suspended(idx));
    assert_eq!(dev.borrow().configure_calls, 2);
    assert_eq!(dev.borrow().close_calls, 1);
}

#[test]
fn hotword_model_selection() {
    let (mut registry, _, _) = setup();
    let mic = TestDev::new("Hotword Mic", Direction::Input, NodeType::Hotword, 1);
    mic.borrow_mut().base_mut().nodes[0].hotword_models =
        vec!["en_us".to_string(), "jp".to_string()];
    let idx = registry.add_input(mic).unwrap();
    let id = NodeId::new(idx, 0);

    assert_eq!(registry.get_hotword_models(id).unwrap(), "en_us,jp");
    registry.set_hotword_model(id, "jp").unwrap();
    registry.set_hotword_model(id, "jp").unwrap();
    assert_eq!(registry.with_node(id, |n| n.active_hotword_model.clone()).unwrap(), "jp");

    assert_eq!(
        registry.set_hotword_model(id, "de"),
        Err(RegistryError::ModelNotFound("de".into()))
    );
}

fn chrome_output_stream(id: u32) -> Stream {
    Stream {
        id: StreamId(id),
        direction: Direction::Output,
        stream_type: StreamType::Default,
        client_type: ClientType::Chrome,
        cb_threshold: 480,
        dev_index: 100,
        has_apm: false,
        has_permission: true,
    }
}

#[test]
fn floop_pair_lifecycle() {
    let (mut registry, _, _) = setup();
    let params = FloopParams {
        client_types_mask: ClientType::Chrome.bit(),
    };
    let pair = FloopPair::new(params);
    let (input_idx, _output_idx) = registry.add_floop_pair(pair).unwrap();

    // Before the capture side opens, matching playback streams attach to
    // nothing.
    registry.add_stream(chrome_output_stream(1));
    assert_eq!(registry.find_floop_pair(params).unwrap().attached_output_streams(), 0);

    // Opening the capture side activates the pair and picks up the stream.
    let t0 = Instant::now();
    registry.open_dev(input_idx, t0).unwrap();
    assert_eq!(registry.find_floop_pair(params).unwrap().attached_output_streams(), 1);

    // A second matching stream attaches as it arrives.
    registry.add_stream(chrome_output_stream(2));
    assert_eq!(registry.find_floop_pair(params).unwrap().attached_output_streams(), 2);

    // Non-matching client types are ignored.
    let mut arc = chrome_output_stream(3);
    arc.client_type = ClientType::Arc;
    registry.add_stream(arc);
    assert_eq!(registry.find_floop_pair(params).unwrap().attached_output_streams(), 2);

    // Closing the capture side detaches everything.
    registry.close_dev(input_idx).unwrap();
    assert_eq!(registry.find_floop_pair(params).unwrap().attached_output_streams(), 0);
}

#[test]
fn floop_silence_pacing_after_open() {
    let (mut registry, _, _) = setup();
    let params = FloopParams {
        client_types_mask: ClientType::Chrome.bit(),
    };
    let pair = FloopPair::new(params);
    let (input_idx, _) = registry.add_floop_pair(pair).unwrap();

    let t0 = Instant::now();
    registry.open_dev(input_idx, t0).unwrap();

    let input = registry.device(input_idx).unwrap();
    let queued = input
        .borrow_mut()
        .frames_queued(t0 + Duration::from_millis(10));
    assert!(queued >= 480, "queued {queued}");
}

#[test]
fn stream_counters_cover_every_client_type() {
    let (mut registry, recorder, bus) = setup();

    let mut input = chrome_output_stream(1);
    input.direction = Direction::Input;
    registry.add_stream(input);
    drain(&bus);

    let recorder = recorder.borrow();
    let counts = recorder.permission_counts.last().unwrap();
    assert_eq!(counts.len(), ClientType::COUNT);
    assert_eq!(counts[ClientType::Chrome.index()], 1);
    assert_eq!(counts.iter().sum::<u32>(), 1);
    assert!(recorder
        .stream_counts
        .contains(&(StreamBucket::Input, 1)));
}
