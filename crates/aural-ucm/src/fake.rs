//! In-memory use-case database.
//!
//! Backs the manager in tests and anywhere a scripted card definition is
//! more convenient than a real use-case backend. Records every mutating
//! call so tests can assert that redundant state changes were filtered.

use crate::{UcmApi, UcmError};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A recorded mutating call on the fake backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    SetVerb(String),
    SetDevice { device: String, enable: bool },
    SetModifier { modifier: String, enable: bool },
}

/// Scriptable [`UcmApi`] implementation.
#[derive(Debug, Default)]
pub struct FakeUcm {
    vars: HashMap<(String, String), String>,
    verbs: Vec<String>,
    devices: Vec<String>,
    modifiers: Vec<String>,
    device_state: HashMap<String, bool>,
    modifier_state: HashMap<String, bool>,
    calls: Rc<RefCell<Vec<FakeCall>>>,
}

impl FakeUcm {
    /// Empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a variable for a device section (use `""` for the verb section).
    pub fn set_var(&mut self, var: &str, device: &str, value: &str) -> &mut Self {
        self.vars
            .insert((var.to_string(), device.to_string()), value.to_string());
        self
    }

    /// Add a verb name.
    pub fn add_verb(&mut self, verb: &str) -> &mut Self {
        self.verbs.push(verb.to_string());
        self
    }

    /// Add a device section, initially disabled.
    pub fn add_device(&mut self, device: &str) -> &mut Self {
        self.devices.push(device.to_string());
        self.device_state.insert(device.to_string(), false);
        self
    }

    /// Add a modifier, initially disabled.
    pub fn add_modifier(&mut self, modifier: &str) -> &mut Self {
        self.modifiers.push(modifier.to_string());
        self.modifier_state.insert(modifier.to_string(), false);
        self
    }

    /// Force a device's enabled state without recording a call.
    pub fn force_device_state(&mut self, device: &str, enabled: bool) -> &mut Self {
        self.device_state.insert(device.to_string(), enabled);
        self
    }

    /// Force a modifier's enabled state without recording a call.
    pub fn force_modifier_state(&mut self, modifier: &str, enabled: bool) -> &mut Self {
        self.modifier_state.insert(modifier.to_string(), enabled);
        self
    }

    /// Shared handle to the recorded mutating calls.
    pub fn calls(&self) -> Rc<RefCell<Vec<FakeCall>>> {
        Rc::clone(&self.calls)
    }
}

impl UcmApi for FakeUcm {
    fn get_var(&self, var: &str, device: &str) -> Option<String> {
        self.vars
            .get(&(var.to_string(), device.to_string()))
            .cloned()
    }

    fn list_verbs(&self) -> Vec<String> {
        self.verbs.clone()
    }

    fn list_devices(&self) -> Vec<String> {
        self.devices.clone()
    }

    fn list_modifiers(&self) -> Vec<String> {
        self.modifiers.clone()
    }

    fn device_enabled(&self, device: &str) -> Result<bool, UcmError> {
        self.device_state
            .get(device)
            .copied()
            .ok_or_else(|| UcmError::NotFound(device.into()))
    }

    fn modifier_enabled(&self, modifier: &str) -> Result<bool, UcmError> {
        self.modifier_state
            .get(modifier)
            .copied()
            .ok_or_else(|| UcmError::NotFound(modifier.into()))
    }

    fn set_verb(&mut self, verb: &str) -> Result<(), UcmError> {
        if !self.verbs.iter().any(|v| v == verb) {
            return Err(UcmError::NotFound(verb.into()));
        }
        self.calls.borrow_mut().push(FakeCall::SetVerb(verb.into()));
        Ok(())
    }

    fn set_device_enabled(&mut self, device: &str, enable: bool) -> Result<(), UcmError> {
        if !self.device_state.contains_key(device) {
            return Err(UcmError::NotFound(device.into()));
        }
        self.device_state.insert(device.to_string(), enable);
        self.calls.borrow_mut().push(FakeCall::SetDevice {
            device: device.into(),
            enable,
        });
        Ok(())
    }

    fn set_modifier_enabled(&mut self, modifier: &str, enable: bool) -> Result<(), UcmError> {
        if !self.modifier_state.contains_key(modifier) {
            return Err(UcmError::NotFound(modifier.into()));
        }
        self.modifier_state.insert(modifier.to_string(), enable);
        self.calls.borrow_mut().push(FakeCall::SetModifier {
            modifier: modifier.into(),
            enable,
        });
        Ok(())
    }
}
