//! Generational arena for BT devices.
//!
//! Policy messages carry [`BtDeviceId`] handles instead of references; a
//! handle resolves only while its generation matches the slot, so a message
//! that raced device removal simply fails to resolve.

use crate::device::BtDevice;
use aural_core::BtDeviceId;

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    device: Option<BtDevice>,
}

/// Slab of BT devices with generation-checked handles.
#[derive(Debug, Default)]
pub struct BtArena {
    slots: Vec<Slot>,
}

impl BtArena {
    /// Empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a device, minting its handle. The builder closure receives
    /// the minted id so the device can store it.
    pub fn insert(&mut self, build: impl FnOnce(BtDeviceId) -> BtDevice) -> BtDeviceId {
        let index = self
            .slots
            .iter()
            .position(|s| s.device.is_none())
            .unwrap_or_else(|| {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            });
        let slot = &mut self.slots[index];
        let id = BtDeviceId {
            index: index as u32,
            generation: slot.generation,
        };
        slot.device = Some(build(id));
        id
    }

    /// Remove a device; stale handles are a silent no-op.
    pub fn remove(&mut self, id: BtDeviceId) -> Option<BtDevice> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let device = slot.device.take();
        if device.is_some() {
            slot.generation = slot.generation.wrapping_add(1);
        }
        device
    }

    /// Whether the handle still resolves.
    pub fn is_valid(&self, id: BtDeviceId) -> bool {
        self.get(id).is_some()
    }

    /// Resolve a handle.
    pub fn get(&self, id: BtDeviceId) -> Option<&BtDevice> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.device.as_ref()
    }

    /// Resolve a handle mutably.
    pub fn get_mut(&mut self, id: BtDeviceId) -> Option<&mut BtDevice> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.device.as_mut()
    }

    /// Iterate the live devices.
    pub fn iter(&self) -> impl Iterator<Item = &BtDevice> {
        self.slots.iter().filter_map(|s| s.device.as_ref())
    }
}
