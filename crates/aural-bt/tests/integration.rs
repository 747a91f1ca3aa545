//! BT policy scenarios with a manual clock and recording fakes.

use aural_bt::{
    BtArena, BtDevice, BtError, BtPolicy, BtPolicyOps, CONN_WATCH_MAX_RETRIES, CONN_WATCH_PERIOD,
    PROFILE_SWITCH_DELAY,
};
use aural_core::pump::BtPolicyMsg;
use aural_core::{BtDeviceId, BtProfile, Direction, NodeType, SampleFormat, SuspendReason};
use aural_device::{DeviceRegistry, Iodev, IodevBase, Node, ReadFn, RegistryError, WriteFn};
use aural_observer::ObserverServer;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

struct TestDev {
    base: IodevBase,
    configure_calls: usize,
    close_calls: usize,
}

impl TestDev {
    fn new(name: &str, direction: Direction) -> Rc<RefCell<Self>> {
        let mut base = IodevBase::new(name, direction, 1);
        base.supported_rates = vec![48000];
        base.supported_channel_counts = vec![2];
        base.supported_formats = vec![SampleFormat::S16Le];
        let idx = base.add_node(Node::new(name, NodeType::Bluetooth, 1));
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
        self.base.buffer_size = 256;
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
    fn write_buffer(&mut self, _frames: usize, _f: WriteFn<'_>) -> Result<usize, RegistryError> {
        Ok(0)
    }
    fn read_buffer(&mut self, _frames: usize, _f: ReadFn<'_>) -> Result<usize, RegistryError> {
        Ok(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    ConnectProfile(BtProfile),
    StartA2dp,
    StartHfp,
    SuspendA2dp,
    SuspendHfp,
    Disconnect,
    Deconflict,
}

#[derive(Default)]
struct FakeOps {
    calls: Vec<Call>,
    fail_hfp_start: bool,
}

impl BtPolicyOps for FakeOps {
    fn connect_profile(&mut self, _device: BtDeviceId, profile: BtProfile) {
        self.calls.push(Call::ConnectProfile(profile));
    }
    fn start_a2dp(&mut self, _device: BtDeviceId) {
        self.calls.push(Call::StartA2dp);
    }
    fn start_hfp(&mut self, _device: BtDeviceId) -> Result<(), BtError> {
        self.calls.push(Call::StartHfp);
        if self.fail_hfp_start {
            Err(BtError::AgStartFailed("no slc".into()))
        } else {
            Ok(())
        }
    }
    fn suspend_a2dp(&mut self, _device: BtDeviceId) {
        self.calls.push(Call::SuspendA2dp);
    }
    fn suspend_hfp(&mut self, _device: BtDeviceId) {
        self.calls.push(Call::SuspendHfp);
    }
    fn disconnect(&mut self, _device: BtDeviceId) {
        self.calls.push(Call::Disconnect);
    }
    fn deconflict(&mut self, _keep: BtDeviceId) {
        self.calls.push(Call::Deconflict);
    }
}

struct Fixture {
    arena: BtArena,
    registry: DeviceRegistry,
    policy: BtPolicy,
    ops: FakeOps,
    device: BtDeviceId,
    input: Rc<RefCell<TestDev>>,
    output: Rc<RefCell<TestDev>>,
    input_idx: u32,
    output_idx: u32,
}

fn fixture() -> Fixture {
    let mut arena = BtArena::new();
    let mut registry = DeviceRegistry::new(ObserverServer::new());

    let device = arena.insert(|id| {
        let mut dev = BtDevice::new(id, "AA:BB:CC:DD:EE:FF", "Headset", "/dev_AA");
        dev.add_supported_profile(BtProfile::A2dpSink);
        dev.add_supported_profile(BtProfile::HfpHandsfree);
        dev
    });

    let input = TestDev::new("Headset", Direction::Input);
    let output = TestDev::new("Headset", Direction::Output);
    let input_idx = registry.add_input(input.clone()).unwrap();
    let output_idx = registry.add_output(output.clone()).unwrap();

    let manager = arena.get_mut(device).unwrap().manager_mut();
    manager.set_iodev(Direction::Input, Some(input_idx));
    manager.set_iodev(Direction::Output, Some(output_idx));

    Fixture {
        arena,
        registry,
        policy: BtPolicy::new(),
        ops: FakeOps::default(),
        device,
        input,
        output,
        input_idx,
        output_idx,
    }
}

/// S2: switch_profile suspends both iodevs synchronously, resumes the input
/// immediately, and resumes the output only after the 500 ms delay. A second
/// switch before the delay elapses reschedules the timer.
#[test]
fn profile_switch_timing() {
    let mut fx = fixture();
    let t0 = Instant::now();
    fx.registry.open_dev(fx.input_idx, t0).unwrap();
    fx.registry.open_dev(fx.output_idx, t0).unwrap();

    fx.policy
        .switch_profile(fx.device, &mut fx.arena, &mut fx.registry, t0);

    // Both suspended; input resumed in the same call.
    assert_eq!(fx.input.borrow().close_calls, 1);
    assert_eq!(fx.output.borrow().close_calls, 1);
    assert_eq!(fx.input.borrow().configure_calls, 2);
    assert_eq!(fx.output.borrow().configure_calls, 1);
    assert!(fx.registry.is_suspended(fx.output_idx));
    assert!(
        fx.arena
            .get(fx.device)
            .unwrap()
            .manager
            .as_ref()
            .unwrap()
            .is_profile_switching
    );

    // Before the delay elapses nothing resumes.
    fx.policy
        .tick(&mut fx.arena, &mut fx.registry, &mut fx.ops, t0 + Duration::from_millis(499));
    assert_eq!(fx.output.borrow().configure_calls, 1);

    fx.policy
        .tick(&mut fx.arena, &mut fx.registry, &mut fx.ops, t0 + PROFILE_SWITCH_DELAY);
    assert_eq!(fx.output.borrow().configure_calls, 2);
    assert!(!fx.registry.is_suspended(fx.output_idx));
    assert!(
        !fx.arena
            .get(fx.device)
            .unwrap()
            .manager
            .as_ref()
            .unwrap()
            .is_profile_switching
    );
}

#[test]
fn repeated_switch_reschedules_the_output_resume() {
    let mut fx = fixture();
    let t0 = Instant::now();
    fx.registry.open_dev(fx.input_idx, t0).unwrap();
    fx.registry.open_dev(fx.output_idx, t0).unwrap();

    fx.policy
        .switch_profile(fx.device, &mut fx.arena, &mut fx.registry, t0);
    let t1 = t0 + Duration::from_millis(200);
    fx.policy
        .switch_profile(fx.device, &mut fx.arena, &mut fx.registry, t1);

    // The first deadline passes without a resume.
    fx.policy
        .tick(&mut fx.arena, &mut fx.registry, &mut fx.ops, t0 + PROFILE_SWITCH_DELAY);
    assert!(fx.registry.is_suspended(fx.output_idx));

    // Only the rescheduled deadline resumes the output, once.
    fx.policy
        .tick(&mut fx.arena, &mut fx.registry, &mut fx.ops, t1 + PROFILE_SWITCH_DELAY);
    assert!(!fx.registry.is_suspended(fx.output_idx));
    assert_eq!(fx.output.borrow().configure_calls, 2);
}

#[test]
fn device_removed_mid_switch_cancels_silently() {
    let mut fx = fixture();
    let t0 = Instant::now();
    fx.registry.open_dev(fx.output_idx, t0).unwrap();
    fx.policy
        .switch_profile(fx.device, &mut fx.arena, &mut fx.registry, t0);

    fx.policy.remove_device(fx.device);
    fx.arena.remove(fx.device);
    fx.policy
        .tick(&mut fx.arena, &mut fx.registry, &mut fx.ops, t0 + PROFILE_SWITCH_DELAY);

    // No resume happened and no timer remains.
    assert_eq!(fx.output.borrow().configure_calls, 0);
    assert!(fx.policy.next_deadline().is_none());
}

/// S3: with only A2DP connected the first tick requests HFP; once both
/// profiles connect, the policy deconflicts, starts audio, plugs the nodes,
/// and stops watching.
#[test]
fn connection_watch_success() {
    let mut fx = fixture();
    let t0 = Instant::now();
    fx.arena
        .get_mut(fx.device)
        .unwrap()
        .set_profile_connected(BtProfile::A2dpSink, true);

    fx.policy.start_connection_watch(fx.device, t0);
    assert!(fx.policy.is_watching(fx.device));

    fx.policy
        .tick(&mut fx.arena, &mut fx.registry, &mut fx.ops, t0 + CONN_WATCH_PERIOD);
    assert_eq!(
        fx.ops.calls,
        vec![Call::ConnectProfile(BtProfile::HfpHandsfree)]
    );

    fx.arena
        .get_mut(fx.device)
        .unwrap()
        .set_profile_connected(BtProfile::HfpHandsfree, true);
    fx.policy
        .tick(&mut fx.arena, &mut fx.registry, &mut fx.ops, t0 + CONN_WATCH_PERIOD * 2);

    assert_eq!(
        fx.ops.calls[1..],
        [Call::Deconflict, Call::StartA2dp, Call::StartHfp]
    );
    // Nodes came up plugged and the watch is gone with no timer armed.
    assert!(fx.input.borrow().base().nodes[0].plugged);
    assert!(fx.output.borrow().base().nodes[0].plugged);
    assert!(!fx.policy.is_watching(fx.device));
    assert!(fx.policy.next_deadline().is_none());
}

/// S4: profiles never connect; after 30 fires exactly one suspend is
/// scheduled, with the conn-watch-timeout reason.
#[test]
fn connection_watch_timeout() {
    let mut fx = fixture();
    let t0 = Instant::now();
    fx.policy.start_connection_watch(fx.device, t0);

    let mut fires = 0;
    for i in 1..=CONN_WATCH_MAX_RETRIES {
        let now = t0 + CONN_WATCH_PERIOD * i;
        assert!(fx.policy.next_deadline().is_some());
        fx.policy.tick(&mut fx.arena, &mut fx.registry, &mut fx.ops, now);
        fires += 1;
    }
    assert_eq!(fires, 30);
    assert!(!fx.policy.is_watching(fx.device));
    assert_eq!(fx.policy.pending_suspends(), 1);
    assert_eq!(
        fx.policy.pending_suspend_reason(fx.device),
        Some(SuspendReason::ConnWatchTimeout)
    );

    // The zero-delay suspend fires on the next tick.
    fx.policy.tick(
        &mut fx.arena,
        &mut fx.registry,
        &mut fx.ops,
        t0 + CONN_WATCH_PERIOD * (CONN_WATCH_MAX_RETRIES + 1),
    );
    assert_eq!(
        fx.ops.calls,
        vec![Call::SuspendA2dp, Call::SuspendHfp, Call::Disconnect]
    );
    assert_eq!(fx.policy.pending_suspends(), 0);
}

#[test]
fn hfp_start_failure_schedules_suspend() {
    let mut fx = fixture();
    fx.ops.fail_hfp_start = true;
    let t0 = Instant::now();
    {
        let dev = fx.arena.get_mut(fx.device).unwrap();
        dev.set_profile_connected(BtProfile::A2dpSink, true);
        dev.set_profile_connected(BtProfile::HfpHandsfree, true);
    }

    fx.policy.start_connection_watch(fx.device, t0);
    fx.policy
        .tick(&mut fx.arena, &mut fx.registry, &mut fx.ops, t0 + CONN_WATCH_PERIOD);

    assert_eq!(
        fx.policy.pending_suspend_reason(fx.device),
        Some(SuspendReason::HfpAgStartFailure)
    );
}

/// At most one suspend timer per device; the first reason wins.
#[test]
fn suspend_schedule_is_idempotent() {
    let mut fx = fixture();
    let t0 = Instant::now();

    fx.policy.schedule_suspend(
        fx.device,
        Duration::from_millis(100),
        SuspendReason::HfpScoSocketError,
        t0,
    );
    fx.policy.schedule_suspend(
        fx.device,
        Duration::ZERO,
        SuspendReason::UnexpectedProfileDrop,
        t0,
    );

    assert_eq!(fx.policy.pending_suspends(), 1);
    assert_eq!(
        fx.policy.pending_suspend_reason(fx.device),
        Some(SuspendReason::HfpScoSocketError)
    );

    fx.policy.cancel_suspend(fx.device);
    assert_eq!(fx.policy.pending_suspends(), 0);
    fx.policy
        .tick(&mut fx.arena, &mut fx.registry, &mut fx.ops, t0 + Duration::from_secs(1));
    assert!(fx.ops.calls.is_empty());
}

/// Stale handles drop policy messages without side effects.
#[test]
fn stale_message_is_dropped() {
    let mut fx = fixture();
    let t0 = Instant::now();
    let stale = fx.device;
    fx.policy.remove_device(stale);
    fx.arena.remove(stale);

    fx.policy.handle_message(
        BtPolicyMsg::ScheduleSuspend {
            device: stale,
            delay_ms: 0,
            reason: SuspendReason::A2dpTxFatalError,
        },
        &mut fx.arena,
        &mut fx.registry,
        t0,
    );
    assert_eq!(fx.policy.pending_suspends(), 0);

    fx.policy.handle_message(
        BtPolicyMsg::SwitchProfile { device: stale },
        &mut fx.arena,
        &mut fx.registry,
        t0,
    );
    assert!(fx.policy.next_deadline().is_none());
}

/// Messages for live devices route to the same state machine entry points.
#[test]
fn policy_messages_drive_the_state_machine() {
    let mut fx = fixture();
    let t0 = Instant::now();
    fx.registry.open_dev(fx.output_idx, t0).unwrap();

    fx.policy.handle_message(
        BtPolicyMsg::SwitchProfile { device: fx.device },
        &mut fx.arena,
        &mut fx.registry,
        t0,
    );
    assert!(fx.registry.is_suspended(fx.output_idx));

    fx.policy.handle_message(
        BtPolicyMsg::ScheduleSuspend {
            device: fx.device,
            delay_ms: 5000,
            reason: SuspendReason::A2dpLongTxFailure,
        },
        &mut fx.arena,
        &mut fx.registry,
        t0,
    );
    assert_eq!(fx.policy.pending_suspends(), 1);

    fx.policy.handle_message(
        BtPolicyMsg::CancelSuspend { device: fx.device },
        &mut fx.arena,
        &mut fx.registry,
        t0,
    );
    assert_eq!(fx.policy.pending_suspends(), 0);
}
