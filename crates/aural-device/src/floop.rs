//! Flexible loopback: a coupled (output, input) iodev pair.
//!
//! Playback streams whose client type matches the pair's mask are routed
//! into the output half; the mix becomes readable from the input half after
//! the natural audio delay. Lifecycle:
//!
//! ```text
//! +--------------+---------------+----------------------+
//! |              | no capture    | has capture          |
//! |              | streams       | streams              |
//! +--------------+---------------+----------------------+
//! | no playback  | do nothing    | feed zero samples    |
//! | streams      |               | paced by the clock   |
//! +--------------+---------------+----------------------+
//! | has playback | do nothing    | playback streams are |
//! | streams      |               | attached to the      |
//! |              |               | output iodev         |
//! +--------------+---------------+----------------------+
//! ```

use crate::error::RegistryError;
use crate::iodev::{Iodev, IodevBase, IodevRef, ReadFn, WriteFn};
use crate::node::Node;
use aural_core::hash::{fnv1a32, fnv1a32_seeded};
use aural_core::{AudioFormat, ByteBuffer, Direction, NodeType, SampleFormat, Stream};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

/// Ring capacity in frames.
pub const FLOOP_BUFFER_FRAMES: usize = 8192;

const FLOOP_RATE: usize = 48000;
const FLOOP_CHANNELS: usize = 2;
const FRAME_BYTES: usize = 4;

/// Routing parameters of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloopParams {
    /// Playback streams route into the pair iff their client-type bit is
    /// set.
    pub client_types_mask: u32,
}

/// State shared by both halves.
#[derive(Debug)]
struct FloopShared {
    buffer: ByteBuffer,
    input_active: bool,
    dev_start_time: Option<Instant>,
    read_frames: usize,
    attached_output_streams: usize,
}

impl FloopShared {
    fn new() -> Self {
        FloopShared {
            buffer: ByteBuffer::new(FLOOP_BUFFER_FRAMES * FRAME_BYTES),
            input_active: false,
            dev_start_time: None,
            read_frames: 0,
            attached_output_streams: 0,
        }
    }
}

fn floop_format() -> AudioFormat {
    // Fixed stereo S16LE at 48 kHz; the layout stays the default stereo map
    // regardless of what the stream side suggests.
    let mut fmt = AudioFormat::new(FLOOP_RATE, FLOOP_CHANNELS, SampleFormat::S16Le);
    fmt.set_default_channel_layout();
    fmt
}

fn common_base(params: FloopParams, name: &str, direction: Direction, node_type: NodeType) -> IodevBase {
    let name_hash = fnv1a32(name.as_bytes());
    let stable_id = fnv1a32_seeded(name_hash, &params.client_types_mask.to_le_bytes());
    let mut base = IodevBase::new(name, direction, stable_id);
    base.supported_rates = vec![FLOOP_RATE];
    base.supported_channel_counts = vec![FLOOP_CHANNELS];
    base.supported_formats = vec![SampleFormat::S16Le];
    base.buffer_size = FLOOP_BUFFER_FRAMES;
    base.max_supported_channels = FLOOP_CHANNELS as u32;
    let mut node = Node::new(name, node_type, stable_id);
    node.plugged = true;
    node.plugged_time = Some(std::time::SystemTime::now());
    let idx = base.add_node(node);
    base.set_active_node(idx);
    base
}

struct FloopInput {
    base: IodevBase,
    shared: Rc<RefCell<FloopShared>>,
}

struct FloopOutput {
    base: IodevBase,
    shared: Rc<RefCell<FloopShared>>,
}

impl Iodev for FloopInput {
    fn base(&self) -> &IodevBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut IodevBase {
        &mut self.base
    }

    fn configure_dev(&mut self, now: Instant) -> Result<(), RegistryError> {
        // Active must be set before playback streams are matched against the
        // pair, or match_output_stream rejects everything.
        let mut shared = self.shared.borrow_mut();
        shared.input_active = true;
        shared.dev_start_time = Some(now);
        shared.read_frames = 0;
        if let Some(fmt) = &mut self.base.format {
            fmt.set_default_channel_layout();
        }
        self.base.buffer_size = FLOOP_BUFFER_FRAMES;
        Ok(())
    }

    fn close_dev(&mut self) -> Result<(), RegistryError> {
        let mut shared = self.shared.borrow_mut();
        shared.input_active = false;
        shared.buffer.reset();
        self.base.format = None;
        Ok(())
    }

    fn frames_queued(&mut self, now: Instant) -> usize {
        let mut shared = self.shared.borrow_mut();
        // With no playback producer, fabricate silence up to the frame count
        // the wall clock expects, so the capture side keeps pacing.
        if shared.input_active && shared.attached_output_streams == 0 {
            if let Some(start) = shared.dev_start_time {
                let expected = floop_format().frames_since(now.duration_since(start));
                let to_fill = expected.saturating_sub(shared.read_frames);
                if to_fill > 0 {
                    shared.buffer.fill_zeros(to_fill * FRAME_BYTES);
                }
            }
        }
        shared.buffer.queued() / FRAME_BYTES
    }

    fn write_buffer(&mut self, _frames: usize, _f: WriteFn<'_>) -> Result<usize, RegistryError> {
        // The input half is read-only; producers go through the output half.
        Ok(0)
    }

    fn read_buffer(&mut self, frames: usize, f: ReadFn<'_>) -> Result<usize, RegistryError> {
        let mut shared = self.shared.borrow_mut();
        let avail = shared.buffer.readable() / FRAME_BYTES;
        let limit = frames.min(avail);
        let consumed = {
            let window = &shared.buffer.read_window()[..limit * FRAME_BYTES];
            f(window).min(limit)
        };
        shared.buffer.advance_read(consumed * FRAME_BYTES);
        shared.read_frames += consumed;
        Ok(consumed)
    }

    fn flush_buffer(&mut self) -> usize {
        let mut shared = self.shared.borrow_mut();
        let queued = shared.buffer.queued() / FRAME_BYTES;
        shared.buffer.reset();
        queued
    }
}

impl Iodev for FloopOutput {
    fn base(&self) -> &IodevBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut IodevBase {
        &mut self.base
    }

    fn configure_dev(&mut self, _now: Instant) -> Result<(), RegistryError> {
        if let Some(fmt) = &mut self.base.format {
            fmt.set_default_channel_layout();
        }
        self.base.buffer_size = FLOOP_BUFFER_FRAMES;
        Ok(())
    }

    fn close_dev(&mut self) -> Result<(), RegistryError> {
        self.base.format = None;
        Ok(())
    }

    fn frames_queued(&mut self, _now: Instant) -> usize {
        self.shared.borrow().buffer.queued() / FRAME_BYTES
    }

    fn write_buffer(&mut self, frames: usize, f: WriteFn<'_>) -> Result<usize, RegistryError> {
        let mut shared = self.shared.borrow_mut();
        let avail = shared.buffer.writable() / FRAME_BYTES;
        let limit = frames.min(avail);
        let produced = {
            let window = &mut shared.buffer.write_window()[..limit * FRAME_BYTES];
            f(window).min(limit)
        };
        shared.buffer.advance_write(produced * FRAME_BYTES);
        Ok(produced)
    }

    fn read_buffer(&mut self, _frames: usize, _f: ReadFn<'_>) -> Result<usize, RegistryError> {
        Ok(0)
    }
}

/// The coupled loopback pair.
///
/// Both halves register with the device registry like any iodev; the pair
/// keeps the shared state and answers stream-matching queries.
pub struct FloopPair {
    params: FloopParams,
    shared: Rc<RefCell<FloopShared>>,
    input: Rc<RefCell<FloopInput>>,
    output: Rc<RefCell<FloopOutput>>,
}

impl FloopPair {
    /// Build a pair for the given routing mask.
    pub fn new(params: FloopParams) -> Self {
        let shared = Rc::new(RefCell::new(FloopShared::new()));
        let input = Rc::new(RefCell::new(FloopInput {
            base: common_base(params, "Flexible Loopback", Direction::Input, NodeType::Floop),
            shared: Rc::clone(&shared),
        }));
        let output = Rc::new(RefCell::new(FloopOutput {
            base: common_base(
                params,
                "Flexible Loopback (internal)",
                Direction::Output,
                NodeType::FloopInternal,
            ),
            shared: Rc::clone(&shared),
        }));
        FloopPair {
            params,
            shared,
            input,
            output,
        }
    }

    /// The routing parameters.
    pub fn params(&self) -> FloopParams {
        self.params
    }

    /// The capture half, for registry insertion.
    pub fn input_ref(&self) -> IodevRef {
        self.input.clone()
    }

    /// The playback half, for registry insertion.
    pub fn output_ref(&self) -> IodevRef {
        self.output.clone()
    }

    /// Registry index of the output half once registered.
    pub fn output_index(&self) -> u32 {
        self.output.borrow().base.index
    }

    /// Registry index of the input half once registered.
    pub fn input_index(&self) -> u32 {
        self.input.borrow().base.index
    }

    /// Whether `stream` should be attached to the output half: it is a
    /// playback stream, the capture side has a consumer, and the stream's
    /// client type is selected by the mask.
    pub fn match_output_stream(&self, stream: &Stream) -> bool {
        stream.direction == Direction::Output
            && self.shared.borrow().input_active
            && (self.params.client_types_mask & stream.client_type.bit()) != 0
    }

    /// Whether this pair serves the same routing parameters.
    pub fn match_params(&self, params: FloopParams) -> bool {
        self.params.client_types_mask == params.client_types_mask
    }

    /// Record a playback stream attach on the output half.
    pub fn output_stream_attached(&self) {
        self.shared.borrow_mut().attached_output_streams += 1;
    }

    /// Record a playback stream detach on the output half.
    pub fn output_stream_detached(&self) {
        let mut shared = self.shared.borrow_mut();
        shared.attached_output_streams = shared.attached_output_streams.saturating_sub(1);
    }

    /// Detach every playback stream (capture consumer went away).
    pub fn detach_all_output_streams(&self) {
        self.shared.borrow_mut().attached_output_streams = 0;
    }

    /// Number of playback streams currently attached.
    pub fn attached_output_streams(&self) -> usize {
        self.shared.borrow().attached_output_streams
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aural_core::{ClientType, StreamId, StreamType};
    use std::time::Duration;

    fn chrome_output_stream() -> Stream {
        Stream {
            id: StreamId(9),
            direction: Direction::Output,
            stream_type: StreamType::Default,
            client_type: ClientType::Chrome,
            cb_threshold: 480,
            dev_index: 100,
            has_apm: false,
            has_permission: true,
        }
    }

    fn open_input(pair: &FloopPair, now: Instant) {
        let input = pair.input_ref();
        let mut dev = input.borrow_mut();
        dev.base_mut().format = Some(floop_format());
        dev.configure_dev(now).unwrap();
    }

    #[test]
    fn match_requires_active_input() {
        let pair = FloopPair::new(FloopParams {
            client_types_mask: ClientType::Chrome.bit(),
        });
        let stream = chrome_output_stream();

        assert!(!pair.match_output_stream(&stream));
        open_input(&pair, Instant::now());
        assert!(pair.match_output_stream(&stream));
    }

    #[test]
    fn match_respects_client_mask_and_direction() {
        let pair = FloopPair::new(FloopParams {
            client_types_mask: ClientType::Chrome.bit(),
        });
        open_input(&pair, Instant::now());

        let mut arc = chrome_output_stream();
        arc.client_type = ClientType::Arc;
        assert!(!pair.match_output_stream(&arc));

        let mut input_side = chrome_output_stream();
        input_side.direction = Direction::Input;
        assert!(!pair.match_output_stream(&input_side));
    }

    #[test]
    fn silence_pacing_follows_the_clock() {
        let pair = FloopPair::new(FloopParams {
            client_types_mask: ClientType::Chrome.bit(),
        });
        let t0 = Instant::now();
        open_input(&pair, t0);

        let input = pair.input_ref();
        let mut dev = input.borrow_mut();
        // 10 ms at 48 kHz with no producer: at least 480 frames of silence.
        let queued = dev.frames_queued(t0 + Duration::from_millis(10));
        assert!(queued >= 480, "queued {queued}");
    }

    #[test]
    fn no_silence_while_producer_attached() {
        let pair = FloopPair::new(FloopParams {
            client_types_mask: ClientType::Chrome.bit(),
        });
        let t0 = Instant::now();
        open_input(&pair, t0);
        pair.output_stream_attached();

        let input = pair.input_ref();
        let mut dev = input.borrow_mut();
        assert_eq!(dev.frames_queued(t0 + Duration::from_millis(10)), 0);
    }

    #[test]
    fn written_frames_become_readable() {
        let pair = FloopPair::new(FloopParams {
            client_types_mask: ClientType::Chrome.bit(),
        });
        let t0 = Instant::now();
        open_input(&pair, t0);
        pair.output_stream_attached();

        let output = pair.output_ref();
        let produced = output
            .borrow_mut()
            .write_buffer(480, &mut |window: &mut [u8]| {
                window.fill(0x55);
                window.len() / FRAME_BYTES
            })
            .unwrap();
        assert_eq!(produced, 480);

        let input = pair.input_ref();
        let mut dev = input.borrow_mut();
        assert_eq!(dev.frames_queued(t0), 480);
        let mut seen = 0;
        let consumed = dev
            .read_buffer(480, &mut |window: &[u8]| {
                seen = window.len();
                assert!(window.iter().all(|&b| b == 0x55));
                window.len() / FRAME_BYTES
            })
            .unwrap();
        assert_eq!(consumed, 480);
        assert_eq!(seen, 480 * FRAME_BYTES);
        assert_eq!(dev.frames_queued(t0), 0);
    }

    #[test]
    fn close_resets_the_ring() {
        let pair = FloopPair::new(FloopParams {
            client_types_mask: ClientType::Chrome.bit(),
        });
        let t0 = Instant::now();
        open_input(&pair, t0);
        pair.output_stream_attached();
        pair.output_ref()
            .borrow_mut()
            .write_buffer(100, &mut |w: &mut [u8]| w.len() / FRAME_BYTES)
            .unwrap();

        let input = pair.input_ref();
        input.borrow_mut().close_dev().unwrap();
        assert!(!pair.match_output_stream(&chrome_output_stream()));
        assert_eq!(input.borrow_mut().frames_queued(t0), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// With an active capture side and no producer, the queue length
            /// never decreases as the clock advances.
            #[test]
            fn silence_pacing_is_monotone(
                steps in proptest::collection::vec(0u64..50, 1..20)
            ) {
                let pair = FloopPair::new(FloopParams {
                    client_types_mask: ClientType::Chrome.bit(),
                });
                let t0 = Instant::now();
                open_input(&pair, t0);
                let input = pair.input_ref();
                let mut t = t0;
                let mut last = 0;
                for step in steps {
                    t += Duration::from_millis(step);
                    let queued = input.borrow_mut().frames_queued(t);
                    prop_assert!(queued >= last, "queue shrank: {queued} < {last}");
                    last = queued;
                }
            }
        }
    }

    #[test]
    fn pairs_compare_by_mask() {
        let chrome = FloopPair::new(FloopParams {
            client_types_mask: ClientType::Chrome.bit(),
        });
        assert!(chrome.match_params(FloopParams {
            client_types_mask: ClientType::Chrome.bit(),
        }));
        assert!(!chrome.match_params(FloopParams {
            client_types_mask: ClientType::Arc.bit(),
        }));
        // Equal masks hash to equal stable ids.
        let other = FloopPair::new(FloopParams {
            client_types_mask: ClientType::Chrome.bit(),
        });
        assert_eq!(
            chrome.input_ref().borrow().base().stable_id,
            other.input_ref().borrow().base().stable_id
        );
    }
}
