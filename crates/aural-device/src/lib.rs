//! I/O device abstraction and node registry.
//!
//! An [`Iodev`] is a polymorphic audio endpoint: an ALSA card front end, a
//! BT profile device, or a virtual loopback. Each iodev exposes one or more
//! [`Node`]s, the plug-level endpoints users select between. The
//! [`DeviceRegistry`] owns the set of known devices, answers which nodes are
//! active, scores candidates when a selection is needed, and publishes every
//! change through the observer bus.

mod error;
mod floop;
mod iodev;
mod jack;
mod node;
mod registry;

pub use error::RegistryError;
pub use floop::{FLOOP_BUFFER_FRAMES, FloopPair, FloopParams};
pub use iodev::{Iodev, IodevBase, IodevRef, OpenResult, ReadFn, WriteFn};
pub use jack::{JackMonitor, JackRole, classify_jack};
pub use node::{Node, NodeAttr, node_type_priority};
pub use registry::{DeviceRegistry, NodeRecord};
