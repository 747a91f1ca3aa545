//! The device and node registry.

use crate::error::RegistryError;
use crate::floop::{FloopPair, FloopParams};
use crate::iodev::{IodevRef, OpenResult};
use crate::node::{Node, NodeAttr, node_type_priority};
use aural_core::{AudioFormat, Direction, NodeId, Stream, StreamId};
use aural_observer::{MAX_SPECIAL_DEVICE_IDX, ObserverServer, StreamBucket};
use std::time::{Instant, SystemTime};
use tracing::{debug, info, warn};

struct Entry {
    index: u32,
    dev: IodevRef,
    suspended: bool,
}

/// A point-in-time view of one node, for control-surface enumeration.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: NodeId,
    pub direction: Direction,
    pub dev_name: String,
    pub stable_dev_id: u32,
    pub max_supported_channels: u32,
    pub last_open_result: OpenResult,
    pub active: bool,
    pub node: Node,
}

/// Owns the set of known devices and their nodes.
///
/// Devices are created by the card-enumeration layer and registered here;
/// the registry assigns indices, arbitrates active-node selection, and
/// publishes every mutation through the observer bus. It reads nodes but
/// never grows or shrinks a device's node list; that stays with the device.
pub struct DeviceRegistry {
    observer: ObserverServer,
    devices: Vec<Entry>,
    next_index: u32,
    /// Active node ids per direction; the first entry is the primary.
    active_nodes: [Vec<NodeId>; Direction::COUNT],
    floops: Vec<FloopPair>,
    streams: Vec<Stream>,
}

impl DeviceRegistry {
    /// Create an empty registry publishing to `observer`.
    pub fn new(observer: ObserverServer) -> Self {
        DeviceRegistry {
            observer,
            devices: Vec::new(),
            // Indices below the cutoff are reserved for synthetic devices.
            next_index: MAX_SPECIAL_DEVICE_IDX,
            active_nodes: [Vec::new(), Vec::new()],
            floops: Vec::new(),
            streams: Vec::new(),
        }
    }

    /// The observer bus this registry publishes to.
    pub fn observer(&self) -> &ObserverServer {
        &self.observer
    }

    /// Register an output device. Emits `nodes_changed`.
    pub fn add_output(&mut self, dev: IodevRef) -> Result<u32, RegistryError> {
        self.add_dev(dev, Direction::Output)
    }

    /// Register an input device. Emits `nodes_changed`.
    pub fn add_input(&mut self, dev: IodevRef) -> Result<u32, RegistryError> {
        self.add_dev(dev, Direction::Input)
    }

    fn add_dev(&mut self, dev: IodevRef, direction: Direction) -> Result<u32, RegistryError> {
        let index = self.next_index;
        {
            let mut borrowed = dev.borrow_mut();
            let base = borrowed.base_mut();
            if base.direction != direction {
                return Err(RegistryError::InvalidValue {
                    attr: "direction",
                    value: base.direction.index() as i64,
                });
            }
            if base.nodes.is_empty() {
                return Err(RegistryError::InvalidValue {
                    attr: "nodes",
                    value: 0,
                });
            }
            base.index = index;
            info!(index, name = %base.name, ?direction, "device registered");
        }
        self.next_index += 1;
        self.devices.push(Entry {
            index,
            dev,
            suspended: false,
        });
        self.observer.notify_nodes();
        Ok(index)
    }

    /// Remove an output device. Emits `nodes_changed`, and an
    /// `active_node_changed(0)` if the active node vanished with it.
    pub fn rm_output(&mut self, index: u32) -> Result<(), RegistryError> {
        self.rm_dev(index, Direction::Output)
    }

    /// Remove an input device.
    pub fn rm_input(&mut self, index: u32) -> Result<(), RegistryError> {
        self.rm_dev(index, Direction::Input)
    }

    fn rm_dev(&mut self, index: u32, direction: Direction) -> Result<(), RegistryError> {
        let pos = self
            .devices
            .iter()
            .position(|e| e.index == index && e.dev.borrow().base().direction == direction)
            .ok_or(RegistryError::DeviceNotFound(index))?;
        let entry = self.devices.remove(pos);
        {
            let mut dev = entry.dev.borrow_mut();
            if dev.is_open() {
                if let Err(err) = dev.close_dev() {
                    warn!(%err, index, "close during removal failed");
                }
            }
        }

        let actives = &mut self.active_nodes[direction.index()];
        let had_active = actives.iter().any(|id| id.dev_index() == index);
        actives.retain(|id| id.dev_index() != index);
        if had_active {
            let fallback = actives.first().copied().unwrap_or(NodeId::NONE);
            self.observer.notify_active_node(direction, fallback);
        }
        self.observer.notify_nodes();
        Ok(())
    }

    /// Look up a registered device by index.
    pub fn device(&self, index: u32) -> Option<IodevRef> {
        self.devices
            .iter()
            .find(|e| e.index == index)
            .map(|e| e.dev.clone())
    }

    /// Whether a node id designates a registered device and one of its
    /// nodes.
    pub fn node_exists(&self, id: NodeId) -> bool {
        self.device(id.dev_index())
            .is_some_and(|dev| (id.node_index() as usize) < dev.borrow().base().nodes.len())
    }

    /// Read access to a node.
    pub fn with_node<R>(
        &self,
        id: NodeId,
        f: impl FnOnce(&Node) -> R,
    ) -> Result<R, RegistryError> {
        let dev = self
            .device(id.dev_index())
            .ok_or(RegistryError::NodeNotFound(id.to_string()))?;
        let borrowed = dev.borrow();
        let node = borrowed
            .base()
            .nodes
            .get(id.node_index() as usize)
            .ok_or(RegistryError::NodeNotFound(id.to_string()))?;
        Ok(f(node))
    }

    fn with_node_mut<R>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut Node) -> R,
    ) -> Result<R, RegistryError> {
        let dev = self
            .device(id.dev_index())
            .ok_or(RegistryError::NodeNotFound(id.to_string()))?;
        let mut borrowed = dev.borrow_mut();
        let node = borrowed
            .base_mut()
            .nodes
            .get_mut(id.node_index() as usize)
            .ok_or(RegistryError::NodeNotFound(id.to_string()))?;
        Ok(f(node))
    }

    /// The primary active node for a direction, `NodeId::NONE` if none.
    pub fn active_node(&self, direction: Direction) -> NodeId {
        self.active_nodes[direction.index()]
            .first()
            .copied()
            .unwrap_or(NodeId::NONE)
    }

    /// All active nodes for a direction, primary first.
    pub fn active_nodes(&self, direction: Direction) -> &[NodeId] {
        &self.active_nodes[direction.index()]
    }

    /// Select `id` as the only active node for its direction.
    ///
    /// The selection is recorded (and announced) before any device open so
    /// observers see a consistent state even for devices that open later.
    pub fn select_node(&mut self, direction: Direction, id: NodeId) -> Result<(), RegistryError> {
        self.check_node_direction(id, direction)?;
        let actives = &mut self.active_nodes[direction.index()];
        actives.clear();
        actives.push(id);
        if let Some(dev) = self.device(id.dev_index()) {
            dev.borrow_mut()
                .update_active_node(id.node_index() as usize, true);
            dev.borrow_mut()
                .base_mut()
                .set_active_node(id.node_index() as usize);
        }
        self.observer.notify_active_node(direction, id);
        Ok(())
    }

    /// Add `id` to the set of simultaneously active nodes.
    pub fn add_active_node(
        &mut self,
        direction: Direction,
        id: NodeId,
    ) -> Result<(), RegistryError> {
        self.check_node_direction(id, direction)?;
        let actives = &mut self.active_nodes[direction.index()];
        if !actives.contains(&id) {
            actives.push(id);
            self.observer.notify_active_node(direction, id);
        }
        Ok(())
    }

    /// Remove `id` from the active set.
    pub fn rm_active_node(
        &mut self,
        direction: Direction,
        id: NodeId,
    ) -> Result<(), RegistryError> {
        let actives = &mut self.active_nodes[direction.index()];
        let was_primary = actives.first() == Some(&id);
        let before = actives.len();
        actives.retain(|a| *a != id);
        if actives.len() == before {
            return Err(RegistryError::NodeNotFound(id.to_string()));
        }
        if was_primary {
            let fallback = actives.first().copied().unwrap_or(NodeId::NONE);
            self.observer.notify_active_node(direction, fallback);
        }
        Ok(())
    }

    /// Mutate a single node attribute, with attribute-specific side effects.
    pub fn set_node_attr(&mut self, id: NodeId, attr: NodeAttr) -> Result<(), RegistryError> {
        match attr {
            NodeAttr::Volume(volume) => {
                if volume > 100 {
                    return Err(RegistryError::InvalidValue {
                        attr: "volume",
                        value: i64::from(volume),
                    });
                }
                self.with_node_mut(id, |n| n.volume = volume)?;
                if let Some(dev) = self.device(id.dev_index()) {
                    dev.borrow_mut().set_volume(volume);
                }
                self.observer.notify_output_node_volume(id, volume as i32);
            }
            NodeAttr::CaptureGain(gain) => {
                self.with_node_mut(id, |n| n.capture_gain = gain)?;
                self.observer.notify_input_node_gain(id, gain);
            }
            NodeAttr::Plugged(plugged) => {
                let direction = self.node_direction(id)?;
                let changed = self.with_node_mut(id, |n| {
                    let changed = n.plugged != plugged;
                    n.plugged = plugged;
                    if plugged && changed {
                        n.plugged_time = Some(SystemTime::now());
                    }
                    changed
                })?;
                if changed {
                    self.reconcile_active(direction);
                    self.observer.notify_nodes();
                }
            }
            NodeAttr::SwapLeftRight(swapped) => {
                self.with_node_mut(id, |n| n.left_right_swapped = swapped)?;
                self.observer.notify_node_left_right_swapped(id, swapped);
            }
            NodeAttr::DisplayRotation(rotation) => {
                self.with_node_mut(id, |n| n.display_rotation = rotation)?;
            }
            NodeAttr::UiGainScaler(scaler) => {
                self.with_node_mut(id, |n| n.ui_gain_scaler = scaler)?;
            }
        }
        Ok(())
    }

    /// Pick the best selectable node after plug state changed: keep an
    /// explicitly selected plugged node, otherwise score candidates.
    fn reconcile_active(&mut self, direction: Direction) {
        let current = self.active_node(direction);
        if current != NodeId::NONE
            && self
                .with_node(current, |n| n.plugged)
                .unwrap_or(false)
        {
            return;
        }
        if let Some(best) = self.best_node(direction) {
            debug!(node = %best, "auto-selecting node");
            let _ = self.select_node(direction, best);
        }
    }

    /// Score candidates for a direction: plugged beats unplugged, newer
    /// plug beats older, then the type priority table, then ascending
    /// stable id.
    pub fn best_node(&self, direction: Direction) -> Option<NodeId> {
        let mut best: Option<(NodeId, (bool, u64, u32, std::cmp::Reverse<u32>))> = None;
        for entry in &self.devices {
            let dev = entry.dev.borrow();
            let base = dev.base();
            if base.direction != direction {
                continue;
            }
            for (node_idx, node) in base.nodes.iter().enumerate() {
                if !node.plugged {
                    continue;
                }
                let id = NodeId::new(entry.index, node_idx as u32);
                let score = (
                    node.plugged,
                    node.plugged_time_us(),
                    node_type_priority(node.node_type),
                    std::cmp::Reverse(node.stable_id),
                );
                if best.as_ref().is_none_or(|(_, s)| score > *s) {
                    best = Some((id, score));
                }
            }
        }
        best.map(|(id, _)| id)
    }

    /// Open a device: negotiate a format from its preferred-first lists,
    /// then configure. Floop inputs additionally activate their pair.
    pub fn open_dev(&mut self, index: u32, now: Instant) -> Result<(), RegistryError> {
        let dev = self
            .device(index)
            .ok_or(RegistryError::DeviceNotFound(index))?;
        {
            let mut borrowed = dev.borrow_mut();
            if borrowed.is_open() {
                return Ok(());
            }
            let base = borrowed.base_mut();
            let rate = *base
                .supported_rates
                .first()
                .ok_or(RegistryError::NoSupportedFormat(index))?;
            let channels = *base
                .supported_channel_counts
                .first()
                .ok_or(RegistryError::NoSupportedFormat(index))?;
            let sample_format = *base
                .supported_formats
                .first()
                .ok_or(RegistryError::NoSupportedFormat(index))?;
            base.format = Some(AudioFormat::new(rate, channels, sample_format));
            match borrowed.configure_dev(now) {
                Ok(()) => borrowed.base_mut().last_open_result = OpenResult::Success,
                Err(err) => {
                    let base = borrowed.base_mut();
                    base.format = None;
                    base.last_open_result = OpenResult::Io;
                    return Err(err);
                }
            }
        }
        self.after_floop_input_opened(index);
        Ok(())
    }

    /// Close a device; floop inputs detach their pair's playback streams.
    pub fn close_dev(&mut self, index: u32) -> Result<(), RegistryError> {
        let dev = self
            .device(index)
            .ok_or(RegistryError::DeviceNotFound(index))?;
        {
            let mut borrowed = dev.borrow_mut();
            if !borrowed.is_open() {
                return Ok(());
            }
            borrowed.close_dev()?;
            borrowed.base_mut().format = None;
        }
        if let Some(pair) = self.floops.iter().find(|p| p.input_index() == index) {
            pair.detach_all_output_streams();
        }
        Ok(())
    }

    /// Force-close a device without removing it (profile switches).
    pub fn suspend_dev(&mut self, index: u32) -> Result<(), RegistryError> {
        self.close_dev(index)?;
        if let Some(entry) = self.devices.iter_mut().find(|e| e.index == index) {
            entry.suspended = true;
            debug!(index, "device suspended");
        }
        Ok(())
    }

    /// Re-open a previously suspended device.
    pub fn resume_dev(&mut self, index: u32, now: Instant) -> Result<(), RegistryError> {
        if let Some(entry) = self.devices.iter_mut().find(|e| e.index == index) {
            entry.suspended = false;
        }
        self.open_dev(index, now)?;
        debug!(index, "device resumed");
        Ok(())
    }

    /// Whether the device is currently suspended.
    pub fn is_suspended(&self, index: u32) -> bool {
        self.devices
            .iter()
            .find(|e| e.index == index)
            .is_some_and(|e| e.suspended)
    }

    /// Comma-joined hotword models advertised by a node.
    pub fn get_hotword_models(&self, id: NodeId) -> Result<String, RegistryError> {
        self.with_node(id, |n| n.hotword_models.join(","))
    }

    /// Configure the hotword model for a node. Fails with `not-found` when
    /// the name is not advertised; re-selecting the current model is a
    /// no-op.
    pub fn set_hotword_model(&mut self, id: NodeId, model: &str) -> Result<(), RegistryError> {
        let advertised = self.with_node(id, |n| n.hotword_models.clone())?;
        if !advertised.iter().any(|m| m == model) {
            return Err(RegistryError::ModelNotFound(model.to_string()));
        }
        self.with_node_mut(id, |n| {
            if n.active_hotword_model != model {
                n.active_hotword_model = model.to_string();
            }
        })
    }

    /// Register a loopback pair: both halves become regular devices.
    pub fn add_floop_pair(&mut self, pair: FloopPair) -> Result<(u32, u32), RegistryError> {
        let input_idx = self.add_input(pair.input_ref())?;
        let output_idx = self.add_output(pair.output_ref())?;
        self.floops.push(pair);
        Ok((input_idx, output_idx))
    }

    /// The registered pair serving `params`, if any.
    pub fn find_floop_pair(&self, params: FloopParams) -> Option<&FloopPair> {
        self.floops.iter().find(|p| p.match_params(params))
    }

    /// All registered loopback pairs.
    pub fn floop_pairs(&self) -> &[FloopPair] {
        &self.floops
    }

    fn after_floop_input_opened(&mut self, index: u32) {
        let Some(pair) = self.floops.iter().find(|p| p.input_index() == index) else {
            return;
        };
        // Attach every playback stream the newly active pair selects.
        for stream in &self.streams {
            if pair.match_output_stream(stream) {
                pair.output_stream_attached();
            }
        }
    }

    /// Track a newly attached stream; routes playback streams into matching
    /// loopback pairs and refreshes the stream counters.
    pub fn add_stream(&mut self, stream: Stream) {
        for pair in &self.floops {
            if pair.match_output_stream(&stream) {
                pair.output_stream_attached();
            }
        }
        self.streams.push(stream);
        self.notify_stream_counts();
    }

    /// Untrack a detached stream.
    pub fn rm_stream(&mut self, id: StreamId) {
        let Some(pos) = self.streams.iter().position(|s| s.id == id) else {
            return;
        };
        let stream = self.streams.remove(pos);
        for pair in &self.floops {
            if pair.match_output_stream(&stream) {
                pair.output_stream_detached();
            }
        }
        self.notify_stream_counts();
    }

    /// The attached streams.
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// Mutable access for detectors that upgrade stream types.
    pub fn streams_mut(&mut self) -> &mut Vec<Stream> {
        &mut self.streams
    }

    fn notify_stream_counts(&self) {
        let outputs = self
            .streams
            .iter()
            .filter(|s| s.direction == Direction::Output)
            .count() as u32;
        let inputs = self
            .streams
            .iter()
            .filter(|s| s.direction == Direction::Input)
            .count() as u32;
        self.observer
            .notify_num_active_streams(StreamBucket::Output, outputs);
        self.observer
            .notify_num_active_streams(StreamBucket::Input, inputs);
        let non_chrome = self
            .streams
            .iter()
            .filter(|s| {
                s.direction == Direction::Output
                    && !matches!(
                        s.client_type,
                        aural_core::ClientType::Chrome | aural_core::ClientType::Lacros
                    )
            })
            .count() as u32;
        self.observer
            .notify_num_non_chrome_output_streams(non_chrome);

        let mut with_permission = [0u32; aural_core::ClientType::COUNT];
        for stream in &self.streams {
            if stream.direction == Direction::Input && stream.has_permission {
                with_permission[stream.client_type.index()] += 1;
            }
        }
        self.observer
            .notify_input_streams_with_permission(with_permission);
    }

    /// Snapshot every node for control-surface enumeration.
    pub fn node_records(&self) -> Vec<NodeRecord> {
        let mut records = Vec::new();
        for entry in &self.devices {
            let dev = entry.dev.borrow();
            let base = dev.base();
            for (node_idx, node) in base.nodes.iter().enumerate() {
                let id = NodeId::new(entry.index, node_idx as u32);
                records.push(NodeRecord {
                    id,
                    direction: base.direction,
                    dev_name: base.name.clone(),
                    stable_dev_id: base.stable_id,
                    max_supported_channels: base.max_supported_channels,
                    last_open_result: base.last_open_result,
                    active: self.active_nodes[base.direction.index()].contains(&id),
                    node: node.clone(),
                });
            }
        }
        records
    }

    fn node_direction(&self, id: NodeId) -> Result<Direction, RegistryError> {
        let dev = self
            .device(id.dev_index())
            .ok_or(RegistryError::NodeNotFound(id.to_string()))?;
        let direction = dev.borrow().base().direction;
        if (id.node_index() as usize) >= dev.borrow().base().nodes.len() {
            return Err(RegistryError::NodeNotFound(id.to_string()));
        }
        Ok(direction)
    }

    fn check_node_direction(
        &self,
        id: NodeId,
        direction: Direction,
    ) -> Result<(), RegistryError> {
        if self.node_direction(id)? != direction {
            return Err(RegistryError::NodeNotFound(id.to_string()));
        }
        Ok(())
    }
}
