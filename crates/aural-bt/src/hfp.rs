//! HFP SCO iodev.

use crate::sco::Sco;
use crate::transport::{HfpCodec, ScoConnector};
use aural_core::{BtDeviceId, ByteBuffer, Direction, NodeType, SampleFormat};
use aural_device::{Iodev, IodevBase, Node, ReadFn, RegistryError, WriteFn};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;
use tracing::warn;

/// Frames buffered against SCO jitter.
const HFP_BUFFER_FRAMES: usize = 1024;

/// One direction of the HFP speech path.
///
/// The input and output halves share one [`Sco`] object; whichever half
/// opens first wires the link up, whichever closes last tears it down.
pub struct HfpIodev {
    base: IodevBase,
    device: BtDeviceId,
    sco: Rc<RefCell<Sco>>,
    connector: Box<dyn ScoConnector>,
    codec: HfpCodec,
    ring: ByteBuffer,
}

impl HfpIodev {
    /// Build one half of the HFP pair.
    ///
    /// The input node reports the narrowband mic type when the peer lacks
    /// wideband speech, so selection can deprioritise it.
    pub fn new(
        device: BtDeviceId,
        name: &str,
        stable_id: u32,
        direction: Direction,
        wideband_supported: bool,
        sco: Rc<RefCell<Sco>>,
        connector: Box<dyn ScoConnector>,
    ) -> Self {
        let codec = if wideband_supported {
            HfpCodec::Msbc
        } else {
            HfpCodec::Cvsd
        };
        let mut base = IodevBase::new(name, direction, stable_id);
        base.supported_rates = vec![codec.sample_rate()];
        base.supported_channel_counts = vec![1];
        base.supported_formats = vec![SampleFormat::S16Le];
        base.max_supported_channels = 1;
        let node_type = if direction == Direction::Input && !wideband_supported {
            NodeType::BluetoothNbMic
        } else {
            NodeType::Bluetooth
        };
        let mut node = Node::new(name, node_type, stable_id);
        node.plugged = false;
        let idx = base.add_node(node);
        base.set_active_node(idx);
        base.ewma.disable();
        HfpIodev {
            base,
            device,
            sco,
            connector,
            codec,
            ring: ByteBuffer::new(HFP_BUFFER_FRAMES * 2),
        }
    }

    /// The owning BT device.
    pub fn device(&self) -> BtDeviceId {
        self.device
    }

    /// The codec this half was built for.
    pub fn codec(&self) -> HfpCodec {
        self.codec
    }
}

impl Iodev for HfpIodev {
    fn base(&self) -> &IodevBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut IodevBase {
        &mut self.base
    }

    fn configure_dev(&mut self, _now: Instant) -> Result<(), RegistryError> {
        {
            let mut sco = self.sco.borrow_mut();
            if sco.link().is_none() {
                let codec = self.connector.negotiate_codec(self.device);
                match self.connector.sco_connect(self.device, codec) {
                    Ok(link) => sco.set_link(link),
                    Err(err) => {
                        warn!(%err, "sco connect failed");
                        return Err(RegistryError::OpenFailed {
                            index: self.base.index,
                            reason: err.to_string(),
                        });
                    }
                }
                self.connector.set_call_active(self.device, true);
            }
            sco.add_iodev(self.base.direction);
        }
        self.ring.reset();
        self.base.buffer_size = HFP_BUFFER_FRAMES;
        Ok(())
    }

    fn close_dev(&mut self) -> Result<(), RegistryError> {
        {
            let mut sco = self.sco.borrow_mut();
            sco.rm_iodev(self.base.direction);
            if !sco.has_iodev() {
                self.connector.set_call_active(self.device, false);
                sco.close_link();
            }
        }
        self.ring.reset();
        self.base.format = None;
        Ok(())
    }

    fn frames_queued(&mut self, _now: Instant) -> usize {
        self.ring.queued() / 2
    }

    fn write_buffer(&mut self, frames: usize, f: WriteFn<'_>) -> Result<usize, RegistryError> {
        if self.base.direction != Direction::Output {
            return Ok(0);
        }
        let avail = self.ring.writable() / 2;
        let limit = frames.min(avail);
        let produced = {
            let window = &mut self.ring.write_window()[..limit * 2];
            f(window).min(limit)
        };
        self.ring.advance_write(produced * 2);
        Ok(produced)
    }

    fn read_buffer(&mut self, frames: usize, f: ReadFn<'_>) -> Result<usize, RegistryError> {
        if self.base.direction != Direction::Input {
            return Ok(0);
        }
        let avail = self.ring.readable() / 2;
        let limit = frames.min(avail);
        let consumed = {
            let window = &self.ring.read_window()[..limit * 2];
            f(window).min(limit)
        };
        self.ring.advance_read(consumed * 2);
        Ok(consumed)
    }

    fn flush_buffer(&mut self) -> usize {
        let queued = self.ring.queued() / 2;
        self.ring.reset();
        queued
    }

    fn set_volume(&mut self, volume: u32) {
        self.connector.speaker_gain(self.device, volume);
    }
}
