//! Registry error types.

use thiserror::Error;

/// Errors from registry and device operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No device with the given index.
    #[error("device {0} not found")]
    DeviceNotFound(u32),

    /// No node with the given id.
    #[error("node {0} not found")]
    NodeNotFound(String),

    /// The named hotword model is not advertised by the node.
    #[error("hotword model '{0}' not found")]
    ModelNotFound(String),

    /// Attribute value out of range.
    #[error("invalid value for {attr}: {value}")]
    InvalidValue {
        /// Attribute name.
        attr: &'static str,
        /// Offending value.
        value: i64,
    },

    /// The device cannot open with any supported format.
    #[error("device {0} has no usable format")]
    NoSupportedFormat(u32),

    /// The device rejected the open.
    #[error("device {index} failed to open: {reason}")]
    OpenFailed {
        /// Device index.
        index: u32,
        /// Driver-reported reason.
        reason: String,
    },

    /// Operation requires an open device.
    #[error("device {0} is not open")]
    NotOpen(u32),
}
