//! BT I/O manager: the iodev pair of one peer.

use aural_core::{Direction, NodeId};
use aural_device::{DeviceRegistry, NodeAttr};

/// Pairs the input and output BT iodevs of one device.
///
/// Exactly one manager per BT device; the device owns it, and the iodevs
/// reference it upward only through their device handle.
#[derive(Debug, Default, Clone)]
pub struct BtIoManager {
    /// Registry index of the capture iodev, if the HFP profile exists.
    pub input_index: Option<u32>,
    /// Registry index of the playback iodev.
    pub output_index: Option<u32>,
    /// Set while a profile switch is in flight; cleared when the delayed
    /// output resume fires.
    pub is_profile_switching: bool,
}

impl BtIoManager {
    /// Manager with no iodevs yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The iodev index for a direction.
    pub fn iodev(&self, direction: Direction) -> Option<u32> {
        match direction {
            Direction::Output => self.output_index,
            Direction::Input => self.input_index,
        }
    }

    /// Record the iodev for a direction.
    pub fn set_iodev(&mut self, direction: Direction, index: Option<u32>) {
        match direction {
            Direction::Output => self.output_index = index,
            Direction::Input => self.input_index = index,
        }
    }

    /// Flip the plugged state of every node on both iodevs.
    pub fn set_nodes_plugged(&self, registry: &mut DeviceRegistry, plugged: bool) {
        for direction in Direction::all() {
            let Some(index) = self.iodev(direction) else {
                continue;
            };
            let Some(dev) = registry.device(index) else {
                continue;
            };
            let node_count = dev.borrow().base().nodes.len();
            for node_idx in 0..node_count {
                let id = NodeId::new(index, node_idx as u32);
                let _ = registry.set_node_attr(id, NodeAttr::Plugged(plugged));
            }
        }
    }
}
