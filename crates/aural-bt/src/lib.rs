//! Bluetooth audio: device arena, profile policy, and the BT iodev family.
//!
//! Three mutually dependent concerns live here:
//!
//! 1. driving a remote peer through profile connection
//!    ([`BtPolicy::start_connection_watch`]),
//! 2. switching the audio path between A2DP and HFP without discontinuity
//!    ([`BtPolicy::switch_profile`]),
//! 3. suspending a misbehaving peer ([`BtPolicy::schedule_suspend`]).
//!
//! All three are reached exclusively through main-thread messages; every
//! handler revalidates its [`aural_core::BtDeviceId`] against the arena so a
//! message racing device teardown drops silently.

mod a2dp;
mod arena;
mod device;
mod error;
mod hfp;
mod hfp_alsa;
mod manager;
mod policy;
mod sco;
mod transport;

pub use a2dp::{A2DP_FIX_PACKET_SIZE, A2dpIodev, A2dpTransport};
pub use arena::BtArena;
pub use device::BtDevice;
pub use error::BtError;
pub use hfp::HfpIodev;
pub use hfp_alsa::HfpAlsaIodev;
pub use manager::BtIoManager;
pub use policy::{BtPolicy, BtPolicyOps, CONN_WATCH_MAX_RETRIES, CONN_WATCH_PERIOD, PROFILE_SWITCH_DELAY};
pub use sco::{Sco, ScoLink};
pub use transport::{HfpCodec, ScoConnector};
