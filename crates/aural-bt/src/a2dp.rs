//! A2DP PCM output iodev.

use crate::error::BtError;
use aural_core::pump::{BtPolicyMsg, MainMessage, MessageSender};
use aural_core::{
    BtDeviceId, ByteBuffer, Direction, NodeType, SampleFormat, SuspendReason,
};
use aural_device::{Iodev, IodevBase, Node, ReadFn, RegistryError, WriteFn};
use std::time::Instant;
use tracing::warn;

/// Frames buffered between the mixer and the transport writer.
const A2DP_BUFFER_FRAMES: usize = 4096;

/// Default L2CAP payload size used when the fixed-packet-size workaround is
/// on. Peripherals sometimes negotiate a larger MTU and then fail to keep
/// up with it, causing audio artifacts.
pub const A2DP_FIX_PACKET_SIZE: usize = 672;

/// Transport surface of an A2DP media session.
pub trait A2dpTransport {
    /// Push encoded-side PCM toward the peer. Short writes are throttling;
    /// errors are fatal for the session.
    fn write(&mut self, device: BtDeviceId, data: &[u8]) -> Result<usize, BtError>;

    /// Forward absolute volume to the peer.
    fn set_volume(&mut self, device: BtDeviceId, volume: u32);
}

/// Output iodev streaming music-quality audio over A2DP.
pub struct A2dpIodev {
    base: IodevBase,
    device: BtDeviceId,
    ring: ByteBuffer,
    transport: Box<dyn A2dpTransport>,
    sender: MessageSender,
    fixed_packet_size: bool,
}

impl A2dpIodev {
    /// Build the iodev for a connected A2DP sink.
    pub fn new(
        device: BtDeviceId,
        name: &str,
        stable_id: u32,
        transport: Box<dyn A2dpTransport>,
        sender: MessageSender,
    ) -> Self {
        let mut base = IodevBase::new(name, Direction::Output, stable_id);
        base.supported_rates = vec![48000, 44100];
        base.supported_channel_counts = vec![2];
        base.supported_formats = vec![SampleFormat::S16Le];
        base.max_supported_channels = 2;
        let mut node = Node::new(name, NodeType::Bluetooth, stable_id);
        node.plugged = false;
        let idx = base.add_node(node);
        base.set_active_node(idx);
        // No PCM passes through the host mix for offloaded A2DP.
        base.ewma.disable();
        A2dpIodev {
            base,
            device,
            ring: ByteBuffer::new(A2DP_BUFFER_FRAMES * 4),
            transport,
            sender,
            fixed_packet_size: false,
        }
    }

    /// The owning BT device.
    pub fn device(&self) -> BtDeviceId {
        self.device
    }

    /// Cap transport writes at the default L2CAP payload size instead of
    /// the negotiated MTU.
    pub fn set_fixed_packet_size(&mut self, fixed: bool) {
        self.fixed_packet_size = fixed;
    }

    /// Drain buffered audio into the transport. A transport error schedules
    /// a suspend with the fatal TX reason and reports the error.
    pub fn transmit(&mut self) -> Result<usize, BtError> {
        let readable = if self.fixed_packet_size {
            self.ring.readable().min(A2DP_FIX_PACKET_SIZE)
        } else {
            self.ring.readable()
        };
        if readable == 0 {
            return Ok(0);
        }
        let written = {
            let window = &self.ring.read_window()[..readable];
            match self.transport.write(self.device, window) {
                Ok(n) => n,
                Err(err) => {
                    self.schedule_fatal_suspend();
                    return Err(err);
                }
            }
        };
        self.ring.advance_read(written.min(readable));
        Ok(written)
    }

    fn schedule_fatal_suspend(&mut self) {
        let msg = MainMessage::BtPolicy(BtPolicyMsg::ScheduleSuspend {
            device: self.device,
            delay_ms: 0,
            reason: SuspendReason::A2dpTxFatalError,
        });
        if let Err(err) = self.sender.send(&msg) {
            warn!(%err, "failed to post a2dp suspend request");
        }
    }
}

impl Iodev for A2dpIodev {
    fn base(&self) -> &IodevBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut IodevBase {
        &mut self.base
    }

    fn configure_dev(&mut self, _now: Instant) -> Result<(), RegistryError> {
        self.base.buffer_size = A2DP_BUFFER_FRAMES;
        self.ring.reset();
        Ok(())
    }

    fn close_dev(&mut self) -> Result<(), RegistryError> {
        self.ring.reset();
        self.base.format = None;
        Ok(())
    }

    fn frames_queued(&mut self, _now: Instant) -> usize {
        let frame_bytes = self.base.format.as_ref().map_or(4, |f| f.frame_bytes());
        self.ring.queued() / frame_bytes
    }

    fn write_buffer(&mut self, frames: usize, f: WriteFn<'_>) -> Result<usize, RegistryError> {
        let frame_bytes = self.base.format.as_ref().map_or(4, |f| f.frame_bytes());
        let avail = self.ring.writable() / frame_bytes;
        let limit = frames.min(avail);
        let produced = {
            let window = &mut self.ring.write_window()[..limit * frame_bytes];
            f(window).min(limit)
        };
        self.ring.advance_write(produced * frame_bytes);
        Ok(produced)
    }

    fn read_buffer(&mut self, _frames: usize, _f: ReadFn<'_>) -> Result<usize, RegistryError> {
        Ok(0)
    }

    fn flush_buffer(&mut self) -> usize {
        let frame_bytes = self.base.format.as_ref().map_or(4, |f| f.frame_bytes());
        let queued = self.ring.queued() / frame_bytes;
        self.ring.reset();
        queued
    }

    fn set_volume(&mut self, volume: u32) {
        // Volume rides the transport; the host mix stays untouched.
        self.transport.set_volume(self.device, volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aural_core::pump::MessagePump;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeTransport {
        volumes: Rc<RefCell<Vec<u32>>>,
        written: Rc<RefCell<usize>>,
        fail: Rc<RefCell<bool>>,
    }

    impl A2dpTransport for FakeTransport {
        fn write(&mut self, _device: BtDeviceId, data: &[u8]) -> Result<usize, BtError> {
            if *self.fail.borrow() {
                return Err(BtError::Transport("link reset".into()));
            }
            *self.written.borrow_mut() += data.len();
            Ok(data.len())
        }
        fn set_volume(&mut self, _device: BtDeviceId, volume: u32) {
            self.volumes.borrow_mut().push(volume);
        }
    }

    fn dev_id() -> BtDeviceId {
        BtDeviceId {
            index: 0,
            generation: 0,
        }
    }

    fn make(pump: &MessagePump) -> (A2dpIodev, FakeTransport) {
        let transport = FakeTransport::default();
        let handle = FakeTransport {
            volumes: transport.volumes.clone(),
            written: transport.written.clone(),
            fail: transport.fail.clone(),
        };
        let dev = A2dpIodev::new(dev_id(), "Buds", 7, Box::new(handle), pump.sender());
        (dev, transport)
    }

    #[test]
    fn volume_forwards_to_transport() {
        let pump = MessagePump::new().unwrap();
        let (mut dev, transport) = make(&pump);
        dev.set_volume(63);
        assert_eq!(*transport.volumes.borrow(), vec![63]);
    }

    #[test]
    fn buffered_audio_reaches_the_peer() {
        let pump = MessagePump::new().unwrap();
        let (mut dev, transport) = make(&pump);
        dev.base_mut().format = Some(aural_core::AudioFormat::new(
            48000,
            2,
            SampleFormat::S16Le,
        ));
        dev.configure_dev(Instant::now()).unwrap();

        let produced = dev
            .write_buffer(256, &mut |w: &mut [u8]| {
                w.fill(1);
                w.len() / 4
            })
            .unwrap();
        assert_eq!(produced, 256);
        assert_eq!(dev.transmit().unwrap(), 256 * 4);
        assert_eq!(*transport.written.borrow(), 256 * 4);
        assert_eq!(dev.frames_queued(Instant::now()), 0);
    }

    #[test]
    fn fixed_packet_size_caps_each_write() {
        let pump = MessagePump::new().unwrap();
        let (mut dev, transport) = make(&pump);
        dev.base_mut().format = Some(aural_core::AudioFormat::new(
            48000,
            2,
            SampleFormat::S16Le,
        ));
        dev.configure_dev(Instant::now()).unwrap();
        dev.set_fixed_packet_size(true);

        dev.write_buffer(512, &mut |w: &mut [u8]| w.len() / 4).unwrap();
        assert_eq!(dev.transmit().unwrap(), A2DP_FIX_PACKET_SIZE);
        assert_eq!(*transport.written.borrow(), A2DP_FIX_PACKET_SIZE);
    }

    #[test]
    fn tx_error_schedules_fatal_suspend() {
        let pump = MessagePump::new().unwrap();
        let (mut dev, transport) = make(&pump);
        dev.base_mut().format = Some(aural_core::AudioFormat::new(
            48000,
            2,
            SampleFormat::S16Le,
        ));
        dev.configure_dev(Instant::now()).unwrap();
        dev.write_buffer(16, &mut |w: &mut [u8]| w.len() / 4).unwrap();

        *transport.fail.borrow_mut() = true;
        assert!(dev.transmit().is_err());

        let msg = pump.poll(Duration::from_secs(2)).unwrap();
        assert_eq!(
            msg,
            MainMessage::BtPolicy(BtPolicyMsg::ScheduleSuspend {
                device: dev_id(),
                delay_ms: 0,
                reason: SuspendReason::A2dpTxFatalError,
            })
        );
    }
}
