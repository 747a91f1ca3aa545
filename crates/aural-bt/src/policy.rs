//! BT profile policy state machine.
//!
//! Connection watch, profile switch, and suspend scheduling are edge
//! triggered timers driving explicit state, never tasks: each `(device,
//! purpose)` pair holds at most one timer, and re-scheduling cancels the
//! predecessor. All entry points run on the control thread after arriving
//! as main-thread messages; a stale device handle drops the message.

use crate::arena::BtArena;
use crate::error::BtError;
use aural_core::pump::BtPolicyMsg;
use aural_core::{BtDeviceId, BtProfile, Direction, SuspendReason, TimerId, TimerQueue};
use aural_device::DeviceRegistry;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Spacing of connection-watch checks.
pub const CONN_WATCH_PERIOD: Duration = Duration::from_secs(2);
/// Checks before the watch gives up and suspends the peer.
pub const CONN_WATCH_MAX_RETRIES: u32 = 30;
/// Delay before the output iodev resumes after a profile switch. Some
/// headsets fail playback when the HFP to A2DP resume happens too soon.
pub const PROFILE_SWITCH_DELAY: Duration = Duration::from_millis(500);

/// Timer events owned by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PolicyTimer {
    ConnWatch(BtDeviceId),
    ProfileSwitch(BtDeviceId),
    Suspend(BtDeviceId),
}

/// Audio-side operations the policy drives. The transport flavors differ;
/// the policy only cares about this surface.
pub trait BtPolicyOps {
    /// Ask the transport to connect a missing profile.
    fn connect_profile(&mut self, device: BtDeviceId, profile: BtProfile);
    /// Start the A2DP audio path.
    fn start_a2dp(&mut self, device: BtDeviceId);
    /// Start the HFP audio gateway.
    fn start_hfp(&mut self, device: BtDeviceId) -> Result<(), BtError>;
    /// Stop the A2DP audio path.
    fn suspend_a2dp(&mut self, device: BtDeviceId);
    /// Stop the HFP audio path.
    fn suspend_hfp(&mut self, device: BtDeviceId);
    /// Request a transport-level disconnect.
    fn disconnect(&mut self, device: BtDeviceId);
    /// Suspend any other peer currently holding audio.
    fn deconflict(&mut self, keep: BtDeviceId);
}

struct ConnWatch {
    retries_left: u32,
    timer: TimerId,
}

struct SuspendPolicy {
    reason: SuspendReason,
    timer: TimerId,
}

/// The policy engine.
pub struct BtPolicy {
    timers: TimerQueue<PolicyTimer>,
    conn_watch: HashMap<BtDeviceId, ConnWatch>,
    switch_timers: HashMap<BtDeviceId, TimerId>,
    suspends: HashMap<BtDeviceId, SuspendPolicy>,
}

impl Default for BtPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl BtPolicy {
    /// Engine with no pending timers.
    pub fn new() -> Self {
        BtPolicy {
            timers: TimerQueue::new(),
            conn_watch: HashMap::new(),
            switch_timers: HashMap::new(),
            suspends: HashMap::new(),
        }
    }

    /// The earliest pending deadline, to bound the event-loop wait.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Handle a validated policy message.
    pub fn handle_message(
        &mut self,
        msg: BtPolicyMsg,
        arena: &mut BtArena,
        registry: &mut DeviceRegistry,
        now: Instant,
    ) {
        // The sender may be a stale handle; drop silently in that case.
        let device = match msg {
            BtPolicyMsg::SwitchProfile { device }
            | BtPolicyMsg::ScheduleSuspend { device, .. }
            | BtPolicyMsg::CancelSuspend { device } => device,
        };
        if !arena.is_valid(device) {
            debug!(?device, "dropping policy message for stale device");
            return;
        }
        match msg {
            BtPolicyMsg::SwitchProfile { device } => {
                self.switch_profile(device, arena, registry, now);
            }
            BtPolicyMsg::ScheduleSuspend {
                device,
                delay_ms,
                reason,
            } => {
                self.schedule_suspend(device, Duration::from_millis(delay_ms), reason, now);
            }
            BtPolicyMsg::CancelSuspend { device } => self.cancel_suspend(device),
        }
    }

    /// Close both iodevs of the device's manager, resume the input
    /// immediately, and defer the output resume by 500 ms.
    pub fn switch_profile(
        &mut self,
        device: BtDeviceId,
        arena: &mut BtArena,
        registry: &mut DeviceRegistry,
        now: Instant,
    ) {
        let Some(dev) = arena.get_mut(device) else {
            return;
        };
        let Some(manager) = dev.manager.as_mut() else {
            return;
        };
        manager.is_profile_switching = true;
        let input = manager.input_index;
        let output = manager.output_index;

        for index in [input, output].into_iter().flatten() {
            if let Err(err) = registry.suspend_dev(index) {
                warn!(%err, index, "suspend during profile switch failed");
            }
        }

        if let Some(index) = input {
            if let Some(iodev) = registry.device(index) {
                iodev.borrow_mut().update_active_node(0, true);
            }
            if let Err(err) = registry.resume_dev(index, now) {
                warn!(%err, index, "input resume during profile switch failed");
            }
        }

        if output.is_some() {
            // A pending switch is cancelled and rescheduled.
            if let Some(timer) = self.switch_timers.remove(&device) {
                self.timers.cancel(timer);
            }
            let timer = self
                .timers
                .schedule(now + PROFILE_SWITCH_DELAY, PolicyTimer::ProfileSwitch(device));
            self.switch_timers.insert(device, timer);
        }
    }

    /// Begin watching a device's profile connections.
    pub fn start_connection_watch(&mut self, device: BtDeviceId, now: Instant) {
        if let Some(watch) = self.conn_watch.remove(&device) {
            self.timers.cancel(watch.timer);
        }
        let timer = self
            .timers
            .schedule(now + CONN_WATCH_PERIOD, PolicyTimer::ConnWatch(device));
        self.conn_watch.insert(
            device,
            ConnWatch {
                retries_left: CONN_WATCH_MAX_RETRIES,
                timer,
            },
        );
    }

    /// Cancel the pending watch and drop its state.
    pub fn stop_connection_watch(&mut self, device: BtDeviceId) {
        if let Some(watch) = self.conn_watch.remove(&device) {
            self.timers.cancel(watch.timer);
        }
    }

    /// Arm the per-device suspend timer. While one is pending, further
    /// schedules are no-ops; the earliest reason wins.
    pub fn schedule_suspend(
        &mut self,
        device: BtDeviceId,
        delay: Duration,
        reason: SuspendReason,
        now: Instant,
    ) {
        if self.suspends.contains_key(&device) {
            return;
        }
        let timer = self.timers.schedule(now + delay, PolicyTimer::Suspend(device));
        self.suspends.insert(device, SuspendPolicy { reason, timer });
    }

    /// Disarm the suspend timer.
    pub fn cancel_suspend(&mut self, device: BtDeviceId) {
        if let Some(policy) = self.suspends.remove(&device) {
            self.timers.cancel(policy.timer);
        }
    }

    /// Drop every timer owned by a removed device, silently.
    pub fn remove_device(&mut self, device: BtDeviceId) {
        if let Some(timer) = self.switch_timers.remove(&device) {
            self.timers.cancel(timer);
        }
        self.cancel_suspend(device);
        self.stop_connection_watch(device);
    }

    /// Number of pending suspend timers (test observability).
    pub fn pending_suspends(&self) -> usize {
        self.suspends.len()
    }

    /// The reason a pending suspend was first scheduled with.
    pub fn pending_suspend_reason(&self, device: BtDeviceId) -> Option<SuspendReason> {
        self.suspends.get(&device).map(|p| p.reason)
    }

    /// Whether a connection watch is active for the device.
    pub fn is_watching(&self, device: BtDeviceId) -> bool {
        self.conn_watch.contains_key(&device)
    }

    /// Fire every timer due at `now`.
    pub fn tick(
        &mut self,
        arena: &mut BtArena,
        registry: &mut DeviceRegistry,
        ops: &mut dyn BtPolicyOps,
        now: Instant,
    ) {
        for event in self.timers.fire_due(now) {
            match event {
                PolicyTimer::ConnWatch(device) => {
                    self.conn_watch_fired(device, arena, registry, ops, now);
                }
                PolicyTimer::ProfileSwitch(device) => {
                    self.profile_switch_fired(device, arena, registry, now);
                }
                PolicyTimer::Suspend(device) => self.suspend_fired(device, arena, ops),
            }
        }
    }

    fn conn_watch_fired(
        &mut self,
        device: BtDeviceId,
        arena: &mut BtArena,
        registry: &mut DeviceRegistry,
        ops: &mut dyn BtPolicyOps,
        now: Instant,
    ) {
        let Some(mut watch) = self.conn_watch.remove(&device) else {
            return;
        };
        let Some(dev) = arena.get(device) else {
            return;
        };
        // Not an audio device after all; stop watching.
        if dev.supported_profiles == 0 {
            return;
        }

        let a2dp_supported = dev.supports_profile(BtProfile::A2dpSink);
        let a2dp_connected = dev.is_profile_connected(BtProfile::A2dpSink);
        let hfp_supported = dev.supports_profile(BtProfile::HfpHandsfree);
        let hfp_connected = dev.is_profile_connected(BtProfile::HfpHandsfree);

        // When the peer does both profiles, ask the transport to bring up
        // whichever is lagging; a single-profile peer just gets waited on.
        if a2dp_supported && hfp_supported {
            if !a2dp_connected && hfp_connected {
                ops.connect_profile(device, BtProfile::A2dpSink);
            }
            if a2dp_connected && !hfp_connected {
                ops.connect_profile(device, BtProfile::HfpHandsfree);
            }
        }

        if a2dp_supported != a2dp_connected || hfp_supported != hfp_connected {
            debug!(retries_left = watch.retries_left, "conn watch retry");
            watch.retries_left -= 1;
            if watch.retries_left > 0 {
                watch.timer = self
                    .timers
                    .schedule(now + CONN_WATCH_PERIOD, PolicyTimer::ConnWatch(device));
                self.conn_watch.insert(device, watch);
            } else {
                warn!("connection watch timeout");
                self.schedule_suspend(
                    device,
                    Duration::ZERO,
                    SuspendReason::ConnWatchTimeout,
                    now,
                );
            }
            return;
        }

        // Every expected profile is up. Only the latest connected peer is
        // exposed to the user; push the others out before starting audio.
        ops.deconflict(device);
        if a2dp_connected {
            ops.start_a2dp(device);
        }
        if hfp_connected {
            if let Err(err) = ops.start_hfp(device) {
                warn!(%err, "audio gateway start failed");
                self.schedule_suspend(
                    device,
                    Duration::ZERO,
                    SuspendReason::HfpAgStartFailure,
                    now,
                );
            }
        }
        if let Some(manager) = arena.get(device).and_then(|d| d.manager.clone()) {
            manager.set_nodes_plugged(registry, true);
        }
    }

    fn profile_switch_fired(
        &mut self,
        device: BtDeviceId,
        arena: &mut BtArena,
        registry: &mut DeviceRegistry,
        now: Instant,
    ) {
        self.switch_timers.remove(&device);
        let Some(dev) = arena.get_mut(device) else {
            return;
        };
        let Some(manager) = dev.manager.as_mut() else {
            return;
        };
        manager.is_profile_switching = false;
        let Some(index) = manager.output_index else {
            return;
        };
        if let Some(iodev) = registry.device(index) {
            iodev.borrow_mut().update_active_node(0, true);
        }
        if let Err(err) = registry.resume_dev(index, now) {
            warn!(%err, index, "output resume after profile switch failed");
        }
    }

    fn suspend_fired(&mut self, device: BtDeviceId, arena: &mut BtArena, ops: &mut dyn BtPolicyOps) {
        let Some(policy) = self.suspends.remove(&device) else {
            return;
        };
        if !arena.is_valid(device) {
            return;
        }
        warn!(reason = policy.reason.describe(), "suspending bt device");
        ops.suspend_a2dp(device);
        ops.suspend_hfp(device);
        ops.disconnect(device);
    }
}
