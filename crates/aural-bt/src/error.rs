//! Bluetooth error types.

use thiserror::Error;

/// Errors from BT policy and transport operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BtError {
    /// The device handle no longer resolves in the arena.
    #[error("bluetooth device is gone")]
    DeviceGone,

    /// The operation needs a profile that is not connected.
    #[error("profile not connected")]
    ProfileNotConnected,

    /// SCO link setup failed or the socket is not ready.
    #[error("sco unavailable: {0}")]
    ScoUnavailable(String),

    /// The audio gateway failed to start.
    #[error("audio gateway start failed: {0}")]
    AgStartFailed(String),

    /// Transport-level request failed.
    #[error("transport error: {0}")]
    Transport(String),
}
