//! HFP-over-ALSA shim iodev.
//!
//! On platforms whose SCO audio is routed through the sound card, the HFP
//! device is a real ALSA PCM plus SCO link setup. The shim wraps the inner
//! iodev, owns the link lifecycle on the shared [`Sco`] object, and forces
//! the speech format: the negotiated codec fixes the rate (16 kHz wideband,
//! 8 kHz narrowband), one channel, S16LE.

use crate::sco::Sco;
use crate::transport::{HfpCodec, ScoConnector};
use aural_core::{BtDeviceId, Direction, NodeType, SampleFormat};
use aural_device::{Iodev, IodevBase, IodevRef, Node, ReadFn, RegistryError, WriteFn};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;
use tracing::warn;

/// Shim pairing a real ALSA iodev with SCO link management.
pub struct HfpAlsaIodev {
    base: IodevBase,
    inner: IodevRef,
    device: BtDeviceId,
    sco: Rc<RefCell<Sco>>,
    connector: Box<dyn ScoConnector>,
    wideband_supported: bool,
}

impl HfpAlsaIodev {
    /// Wrap `inner` for the given peer.
    pub fn new(
        device: BtDeviceId,
        name: &str,
        stable_id: u32,
        inner: IodevRef,
        wideband_supported: bool,
        sco: Rc<RefCell<Sco>>,
        connector: Box<dyn ScoConnector>,
    ) -> Self {
        let direction = inner.borrow().base().direction;
        let mut base = IodevBase::new(name, direction, stable_id);
        base.supported_rates = vec![if wideband_supported { 16000 } else { 8000 }];
        base.supported_channel_counts = vec![1];
        base.supported_formats = vec![SampleFormat::S16Le];
        base.max_supported_channels = 1;
        let node_type = if direction == Direction::Input && !wideband_supported {
            NodeType::BluetoothNbMic
        } else {
            NodeType::Bluetooth
        };
        let mut node = Node::new(name, node_type, stable_id);
        node.plugged = true;
        node.plugged_time = Some(std::time::SystemTime::now());
        let idx = base.add_node(node);
        base.set_active_node(idx);
        // No host-side PCM metering on either the shim or the wrapped dev.
        base.ewma.disable();
        inner.borrow_mut().base_mut().ewma.disable();
        HfpAlsaIodev {
            base,
            inner,
            device,
            sco,
            connector,
            wideband_supported,
        }
    }

    /// The wrapped ALSA iodev.
    pub fn inner(&self) -> IodevRef {
        self.inner.clone()
    }

    fn rate_for_codec(&self, codec: HfpCodec) -> usize {
        if self.wideband_supported {
            codec.sample_rate()
        } else {
            HfpCodec::Cvsd.sample_rate()
        }
    }
}

impl Iodev for HfpAlsaIodev {
    fn base(&self) -> &IodevBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut IodevBase {
        &mut self.base
    }

    fn configure_dev(&mut self, now: Instant) -> Result<(), RegistryError> {
        // Wiring the shared SCO object happens once per pair, on whichever
        // half opens first.
        let link_missing = self.sco.borrow().link().is_none();
        if link_missing {
            let codec = self.connector.negotiate_codec(self.device);
            let rate = self.rate_for_codec(codec);
            self.base.supported_rates = vec![rate];
            if let Some(fmt) = &mut self.base.format {
                fmt.frame_rate = rate;
                fmt.num_channels = 1;
                fmt.set_default_channel_layout();
            }
            match self.connector.sco_connect(self.device, codec) {
                Ok(link) => self.sco.borrow_mut().set_link(link),
                Err(err) => {
                    warn!(%err, "sco connect failed");
                    return Err(RegistryError::OpenFailed {
                        index: self.base.index,
                        reason: err.to_string(),
                    });
                }
            }
        }

        {
            let mut inner = self.inner.borrow_mut();
            if inner.base().format.is_none() {
                inner.base_mut().format = self.base.format.clone();
            }
            inner.configure_dev(now)?;
            self.base.buffer_size = inner.base().buffer_size;
        }

        let mut sco = self.sco.borrow_mut();
        sco.add_iodev(self.base.direction);
        self.connector.set_call_active(self.device, true);
        Ok(())
    }

    fn close_dev(&mut self) -> Result<(), RegistryError> {
        {
            let mut sco = self.sco.borrow_mut();
            sco.rm_iodev(self.base.direction);
            // Shared teardown waits for the later of the two halves.
            if !sco.has_iodev() {
                self.connector.set_call_active(self.device, false);
                sco.close_link();
            }
        }
        self.base.format = None;
        let mut inner = self.inner.borrow_mut();
        inner.close_dev()?;
        inner.base_mut().format = None;
        Ok(())
    }

    fn frames_queued(&mut self, now: Instant) -> usize {
        self.inner.borrow_mut().frames_queued(now)
    }

    fn delay_frames(&self) -> usize {
        self.inner.borrow().delay_frames()
    }

    fn write_buffer(&mut self, frames: usize, f: WriteFn<'_>) -> Result<usize, RegistryError> {
        self.inner.borrow_mut().write_buffer(frames, f)
    }

    fn read_buffer(&mut self, frames: usize, f: ReadFn<'_>) -> Result<usize, RegistryError> {
        self.inner.borrow_mut().read_buffer(frames, f)
    }

    fn flush_buffer(&mut self) -> usize {
        self.inner.borrow_mut().flush_buffer()
    }

    fn no_stream(&mut self, enable: bool) -> Result<(), RegistryError> {
        self.inner.borrow_mut().no_stream(enable)
    }

    fn output_underrun(&mut self) -> Result<usize, RegistryError> {
        self.inner.borrow_mut().output_underrun()
    }

    fn update_active_node(&mut self, node_idx: usize, dev_enabled: bool) {
        self.inner
            .borrow_mut()
            .update_active_node(node_idx, dev_enabled);
    }

    fn set_volume(&mut self, volume: u32) {
        let adjusted = self
            .base
            .active_node()
            .map_or(volume, |n| volume.min(n.volume));
        self.connector.speaker_gain(self.device, adjusted);
    }

    fn start(&mut self) -> Result<(), RegistryError> {
        self.inner.borrow_mut().start()
    }
}
