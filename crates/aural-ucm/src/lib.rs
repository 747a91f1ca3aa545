//! Use-case-manager (UCM) query layer.
//!
//! A card's UCM database maps verbs, devices, and modifiers to named
//! parameters (jack names, mixer elements, rates, hotword models). The
//! server never parses UCM files itself; it consumes the database through
//! the [`UcmApi`] trait and issues the typed queries on [`UseCaseMgr`].
//!
//! All queries are read-only except verb selection and device/modifier
//! enablement, and state changes are filtered against the cached status
//! first: some hardware misbehaves on redundant enables, so `set_enabled`
//! must not call the backend when the state already matches.

mod fake;
mod mgr;

pub use fake::{FakeCall, FakeUcm};
pub use mgr::{HOTWORD_MODEL_PREFIX, UseCaseMgr};

use thiserror::Error;

/// Errors from UCM queries and state changes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UcmError {
    /// The variable, device, or model is not present in the database.
    #[error("not found: {0}")]
    NotFound(String),

    /// A value was present but malformed (bad integer, wrong arity).
    #[error("invalid value for {0}")]
    Invalid(String),

    /// The card does not advertise the capability.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The underlying use-case backend rejected the operation.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Abstract view of one card's use-case database.
///
/// Variable lookups are scoped to the currently selected verb, matching how
/// the underlying configuration is organized.
pub trait UcmApi {
    /// Look up `var` for `device` (empty string queries the verb section).
    fn get_var(&self, var: &str, device: &str) -> Option<String>;

    /// All verb names.
    fn list_verbs(&self) -> Vec<String>;

    /// All device section names under the current verb.
    fn list_devices(&self) -> Vec<String>;

    /// All modifier section names under the current verb.
    fn list_modifiers(&self) -> Vec<String>;

    /// Whether the device section is currently enabled.
    fn device_enabled(&self, device: &str) -> Result<bool, UcmError>;

    /// Whether the modifier is currently enabled.
    fn modifier_enabled(&self, modifier: &str) -> Result<bool, UcmError>;

    /// Select the active verb.
    fn set_verb(&mut self, verb: &str) -> Result<(), UcmError>;

    /// Enable or disable a device section.
    fn set_device_enabled(&mut self, device: &str, enable: bool) -> Result<(), UcmError>;

    /// Enable or disable a modifier.
    fn set_modifier_enabled(&mut self, modifier: &str, enable: bool) -> Result<(), UcmError>;
}
