//! The iodev capability set.

use crate::error::RegistryError;
use crate::node::Node;
use aural_core::{AudioFormat, Direction, EwmaPower, SampleFormat};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

/// Outcome of the most recent open attempt, reported on the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenResult {
    /// Never opened since registration.
    NotAttempted,
    Success,
    InvalidArgument,
    Busy,
    Io,
}

/// State common to every iodev implementation.
///
/// Implementations embed this and expose it through [`Iodev::base`]; the
/// registry works against it for everything that is not device specific.
#[derive(Debug)]
pub struct IodevBase {
    /// Registry-assigned index, unique per process lifetime.
    pub index: u32,
    /// Human-readable device name.
    pub name: String,
    /// Hash of persistent attributes.
    pub stable_id: u32,
    pub direction: Direction,
    /// Preferred-first candidate rates.
    pub supported_rates: Vec<usize>,
    /// Preferred-first candidate channel counts.
    pub supported_channel_counts: Vec<usize>,
    /// Preferred-first candidate sample formats.
    pub supported_formats: Vec<SampleFormat>,
    /// Negotiated format; `Some` exactly between a successful
    /// `configure_dev` and its matching `close_dev`.
    pub format: Option<AudioFormat>,
    /// Frames per hardware buffer; set during `configure_dev`, meaningless
    /// before.
    pub buffer_size: usize,
    pub max_supported_channels: u32,
    pub last_open_result: OpenResult,
    /// The device's nodes. Mutated only by the owning device.
    pub nodes: Vec<Node>,
    /// Index into `nodes` of the active node, if any.
    pub active_node: Option<usize>,
    pub ewma: EwmaPower,
}

impl IodevBase {
    /// Base with one-node defaults filled in by the caller afterwards.
    pub fn new(name: &str, direction: Direction, stable_id: u32) -> Self {
        IodevBase {
            index: 0,
            name: name.to_string(),
            stable_id,
            direction,
            supported_rates: Vec::new(),
            supported_channel_counts: Vec::new(),
            supported_formats: Vec::new(),
            format: None,
            buffer_size: 0,
            max_supported_channels: 2,
            last_open_result: OpenResult::NotAttempted,
            nodes: Vec::new(),
            active_node: None,
            ewma: EwmaPower::new(48000),
        }
    }

    /// Append a node owned by this device.
    pub fn add_node(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Set the active node by index into the node list.
    pub fn set_active_node(&mut self, node_idx: usize) {
        if node_idx < self.nodes.len() {
            self.active_node = Some(node_idx);
        }
    }

    /// The active node, if one is set.
    pub fn active_node(&self) -> Option<&Node> {
        self.active_node.and_then(|i| self.nodes.get(i))
    }
}

/// Callback receiving a writable frame window; returns frames produced.
pub type WriteFn<'a> = &'a mut dyn FnMut(&mut [u8]) -> usize;
/// Callback receiving a readable frame window; returns frames consumed.
pub type ReadFn<'a> = &'a mut dyn FnMut(&[u8]) -> usize;

/// The polymorphic endpoint capability set.
///
/// Buffer access pairs the get/put halves into a single call: the callback
/// sees a zero-copy window into the device ring and returns how many frames
/// it produced or consumed, which commits the matching pointer advance.
pub trait Iodev {
    /// Common state.
    fn base(&self) -> &IodevBase;
    /// Common state, mutable.
    fn base_mut(&mut self) -> &mut IodevBase;

    /// Ready the device for audio using `base().format`. Sets
    /// `buffer_size`; the format must already be chosen.
    fn configure_dev(&mut self, now: Instant) -> Result<(), RegistryError>;

    /// Release hardware resources. Clears the chosen format.
    fn close_dev(&mut self) -> Result<(), RegistryError>;

    /// Frames currently queued in the device buffer.
    fn frames_queued(&mut self, now: Instant) -> usize;

    /// Additional latency frames reported by the hardware.
    fn delay_frames(&self) -> usize {
        0
    }

    /// Zero-copy write access for up to `frames` frames.
    fn write_buffer(&mut self, frames: usize, f: WriteFn<'_>) -> Result<usize, RegistryError>;

    /// Zero-copy read access for up to `frames` frames.
    fn read_buffer(&mut self, frames: usize, f: ReadFn<'_>) -> Result<usize, RegistryError>;

    /// Drop queued audio; returns the number of frames discarded.
    fn flush_buffer(&mut self) -> usize {
        0
    }

    /// Enter or leave the idle fill policy when no stream is attached.
    fn no_stream(&mut self, _enable: bool) -> Result<(), RegistryError> {
        Ok(())
    }

    /// React to an output underrun; returns frames of recovery fill.
    fn output_underrun(&mut self) -> Result<usize, RegistryError> {
        Ok(0)
    }

    /// Re-evaluate the active node after a selection or profile change.
    fn update_active_node(&mut self, _node_idx: usize, _dev_enabled: bool) {}

    /// Apply the system volume to the device (hardware or transport).
    fn set_volume(&mut self, _volume: u32) {}

    /// Optional explicit start after configure.
    fn start(&mut self) -> Result<(), RegistryError> {
        Ok(())
    }

    /// Whether the device currently holds a configured format.
    fn is_open(&self) -> bool {
        self.base().format.is_some()
    }
}

/// Shared handle to a registered device. The control thread is single
/// threaded, so interior mutability is uncontended by construction.
pub type IodevRef = Rc<RefCell<dyn Iodev>>;
