//! Shared primitives for the aural audio server.
//!
//! This crate holds the vocabulary types and infrastructure every other
//! aural crate builds on:
//!
//! - **Types**: directions, node/client/stream types, packed node ids
//! - **Formats**: sample formats, channel layouts, frame arithmetic
//! - **Buffers**: the byte ring buffer shared by loopback and BT iodevs
//! - **Timers**: an explicit-state timer queue driven by the event loop
//! - **Message pump**: the single ordered channel from any thread to the
//!   control thread ([`pump`])
//!
//! Nothing here touches hardware; higher crates (`aural-device`, `aural-bt`)
//! supply the endpoint implementations.

mod buffer;
mod error;
mod ewma;
mod format;
pub mod hash;
pub mod pump;
mod stream;
mod timer;
mod types;

pub use buffer::ByteBuffer;
pub use error::CoreError;
pub use ewma::EwmaPower;
pub use format::{AudioFormat, ChannelPosition, SampleFormat, CH_MAX};
pub use stream::{Stream, StreamId};
pub use timer::{TimerId, TimerQueue};
pub use types::{
    AudioThreadEvent, BtDeviceId, BtProfile, ClientType, Direction, NodeId, NodeType, StreamType,
    SuspendReason, effects,
};

/// Convenience result type used across the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
