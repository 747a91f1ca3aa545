//! Typed queries over a card's use-case database.

use crate::{UcmApi, UcmError};
use aural_core::{CH_MAX, Direction};
use tracing::{debug, warn};

/// Modifier prefix naming hotword models.
pub const HOTWORD_MODEL_PREFIX: &str = "Hotword Model";

/// Longest accepted hotword model name; longer modifier entries are skipped.
const MAX_HOTWORD_MODEL_NAME: usize = 12;

const JACK_DEV_VAR: &str = "JackDev";
const JACK_CONTROL_VAR: &str = "JackControl";
const JACK_SWITCH_VAR: &str = "JackSwitch";
const EDID_VAR: &str = "EDIDFile";
const CAP_VAR: &str = "CaptureControl";
const OVERRIDE_TYPE_NAME_VAR: &str = "OverrideNodeType";
const DSP_NAME_VAR: &str = "DspName";
const PLAYBACK_MIXER_ELEM_VAR: &str = "PlaybackMixerElem";
const CAPTURE_MIXER_ELEM_VAR: &str = "CaptureMixerElem";
const PLAYBACK_RATE_VAR: &str = "PlaybackRate";
const PLAYBACK_CHANNELS_VAR: &str = "PlaybackChannels";
const CAPTURE_RATE_VAR: &str = "CaptureRate";
const CAPTURE_CHANNEL_MAP_VAR: &str = "CaptureChannelMap";
const CAPTURE_CHANNELS_VAR: &str = "CaptureChannels";
const DEFAULT_NODE_GAIN_VAR: &str = "DefaultNodeGain";
const INTRINSIC_SENSITIVITY_VAR: &str = "IntrinsicSensitivity";
const MAIN_VOLUME_NAMES_VAR: &str = "MainVolumeNames";
const SWAP_MODE_SUFFIX: &str = "Swap Mode";
const NOISE_CANCELLATION_SUFFIX: &str = "Noise Cancellation";

/// Typed facade over one card's use-case database.
pub struct UseCaseMgr {
    api: Box<dyn UcmApi>,
    /// Verb selected with [`Self::set_use_case`], applied by
    /// [`Self::enable_use_case`].
    use_case: Option<String>,
    /// Modifier name of the currently selected hotword model.
    hotword_modifier: Option<String>,
}

impl UseCaseMgr {
    /// Wrap a card's use-case backend.
    pub fn new(api: Box<dyn UcmApi>) -> Self {
        UseCaseMgr {
            api,
            use_case: None,
            hotword_modifier: None,
        }
    }

    /// The device section whose jack variable names `jack`, honoring the
    /// Mic-section direction rule: the `Mic` section only answers input
    /// queries, every other section only output queries.
    pub fn get_dev_for_jack(&self, jack: &str, direction: Direction) -> Option<String> {
        for var in [JACK_DEV_VAR, JACK_CONTROL_VAR] {
            for dev in self.api.list_devices() {
                if self.api.get_var(var, &dev).as_deref() != Some(jack) {
                    continue;
                }
                let is_mic_section = dev == "Mic";
                match direction {
                    Direction::Output if is_mic_section => continue,
                    Direction::Input if !is_mic_section => continue,
                    _ => return Some(dev),
                }
            }
        }
        None
    }

    /// The device section whose mixer element variable names `mixer`.
    pub fn get_dev_for_mixer(&self, mixer: &str, direction: Direction) -> Option<String> {
        let var = match direction {
            Direction::Output => PLAYBACK_MIXER_ELEM_VAR,
            Direction::Input => CAPTURE_MIXER_ELEM_VAR,
        };
        self.api
            .list_devices()
            .into_iter()
            .find(|dev| self.api.get_var(var, dev).as_deref() == Some(mixer))
    }

    /// Playback mixer element for a device section.
    pub fn get_playback_mixer_elem(&self, dev: &str) -> Option<String> {
        self.api.get_var(PLAYBACK_MIXER_ELEM_VAR, dev)
    }

    /// Capture mixer element for a device section.
    pub fn get_capture_mixer_elem(&self, dev: &str) -> Option<String> {
        self.api.get_var(CAPTURE_MIXER_ELEM_VAR, dev)
    }

    /// Configured sample rate for the device in the given direction.
    pub fn get_sample_rate(&self, dev: &str, direction: Direction) -> Result<usize, UcmError> {
        let var = match direction {
            Direction::Output => PLAYBACK_RATE_VAR,
            Direction::Input => CAPTURE_RATE_VAR,
        };
        self.get_int(var, dev)
    }

    /// Configured channel count for the device in the given direction.
    pub fn get_channels(&self, dev: &str, direction: Direction) -> Result<usize, UcmError> {
        let var = match direction {
            Direction::Output => PLAYBACK_CHANNELS_VAR,
            Direction::Input => CAPTURE_CHANNELS_VAR,
        };
        let value = self.get_int(var, dev)?;
        Ok(value)
    }

    /// Capture channel map: exactly [`CH_MAX`] whitespace-separated entries.
    pub fn get_capture_channel_map(&self, dev: &str) -> Result<[i8; CH_MAX], UcmError> {
        let raw = self
            .api
            .get_var(CAPTURE_CHANNEL_MAP_VAR, dev)
            .ok_or_else(|| UcmError::NotFound(CAPTURE_CHANNEL_MAP_VAR.into()))?;
        let mut map = [-1i8; CH_MAX];
        let mut count = 0;
        for token in raw.split_whitespace() {
            if count == CH_MAX {
                return Err(UcmError::Invalid(CAPTURE_CHANNEL_MAP_VAR.into()));
            }
            map[count] = token
                .parse()
                .map_err(|_| UcmError::Invalid(CAPTURE_CHANNEL_MAP_VAR.into()))?;
            count += 1;
        }
        if count != CH_MAX {
            return Err(UcmError::Invalid(CAPTURE_CHANNEL_MAP_VAR.into()));
        }
        Ok(map)
    }

    /// Default capture gain in 0.01 dB for the device.
    pub fn get_default_node_gain(&self, dev: &str) -> Result<i32, UcmError> {
        self.get_int(DEFAULT_NODE_GAIN_VAR, dev)
    }

    /// Intrinsic sensitivity in 0.01 dBFS for the device.
    pub fn get_intrinsic_sensitivity(&self, dev: &str) -> Result<i32, UcmError> {
        self.get_int(INTRINSIC_SENSITIVITY_VAR, dev)
    }

    /// DSP config name for a device section.
    pub fn get_dsp_name(&self, dev: &str) -> Option<String> {
        self.api.get_var(DSP_NAME_VAR, dev)
    }

    /// EDID override file for an HDMI device section.
    pub fn get_edid_file(&self, dev: &str) -> Option<String> {
        self.api.get_var(EDID_VAR, dev)
    }

    /// Node type override for a device section.
    pub fn get_override_type_name(&self, dev: &str) -> Option<String> {
        self.api.get_var(OVERRIDE_TYPE_NAME_VAR, dev)
    }

    /// Capture control name for a device section.
    pub fn get_cap_control(&self, dev: &str) -> Option<String> {
        self.api.get_var(CAP_VAR, dev)
    }

    /// JackDev variable for a device section.
    pub fn get_jack_dev_for_dev(&self, dev: &str) -> Option<String> {
        self.api.get_var(JACK_DEV_VAR, dev)
    }

    /// JackControl variable for a device section.
    pub fn get_jack_control_for_dev(&self, dev: &str) -> Option<String> {
        self.api.get_var(JACK_CONTROL_VAR, dev)
    }

    /// Jack switch event bit, or `None` to auto-detect.
    pub fn get_jack_switch_for_dev(&self, dev: &str) -> Option<u32> {
        let raw = self.api.get_var(JACK_SWITCH_VAR, dev)?;
        match raw.parse::<i64>() {
            Ok(v) if v >= 0 => Some(v as u32),
            _ => None,
        }
    }

    /// Comma-joined hotword model names advertised by the card.
    ///
    /// Models are modifiers named `Hotword Model <name>`; names longer than
    /// the accepted bound are skipped.
    pub fn get_hotword_models(&self) -> String {
        let mut names = Vec::new();
        for modifier in self.api.list_modifiers() {
            let Some(rest) = modifier.strip_prefix(HOTWORD_MODEL_PREFIX) else {
                continue;
            };
            let name = rest.trim_start();
            if name.is_empty() {
                continue;
            }
            if name.len() > MAX_HOTWORD_MODEL_NAME {
                warn!(model = name, "ignoring hotword model with overlong name");
                continue;
            }
            names.push(name.to_string());
        }
        names.join(",")
    }

    /// Disable every enabled hotword-model modifier.
    pub fn disable_all_hotword_models(&mut self) {
        for modifier in self.api.list_modifiers() {
            if !modifier.starts_with(HOTWORD_MODEL_PREFIX) {
                continue;
            }
            if self.api.modifier_enabled(&modifier).unwrap_or(false) {
                if let Err(err) = self.api.set_modifier_enabled(&modifier, false) {
                    warn!(%err, modifier, "failed to disable hotword model");
                }
            }
        }
    }

    /// Select the hotword model named `model`.
    ///
    /// Unknown models fail with [`UcmError::Invalid`]. Selecting the current
    /// model again is a no-op. All other hotword modifiers are disabled
    /// first; if the previous model was enabled, the new one is enabled too.
    pub fn set_hotword_model(&mut self, model: &str) -> Result<(), UcmError> {
        let modifier = format!("{HOTWORD_MODEL_PREFIX} {model}");
        if !self.api.list_modifiers().iter().any(|m| m == &modifier) {
            return Err(UcmError::Invalid(modifier));
        }
        if self.hotword_modifier.as_deref() == Some(modifier.as_str()) {
            return Ok(());
        }
        let was_enabled = match &self.hotword_modifier {
            Some(current) => self.api.modifier_enabled(current).unwrap_or(false),
            None => false,
        };
        self.disable_all_hotword_models();
        self.hotword_modifier = Some(modifier.clone());
        if was_enabled {
            self.api.set_modifier_enabled(&modifier, true)?;
        }
        Ok(())
    }

    /// Enable the hotword model selected by [`Self::set_hotword_model`].
    pub fn enable_hotword_model(&mut self) -> Result<(), UcmError> {
        let modifier = self
            .hotword_modifier
            .clone()
            .ok_or_else(|| UcmError::NotFound("hotword model".into()))?;
        if self.api.modifier_enabled(&modifier)? {
            return Err(UcmError::Invalid(modifier));
        }
        self.api.set_modifier_enabled(&modifier, true)
    }

    /// Enable or disable a device section, skipping the backend call when the
    /// cached state already matches.
    pub fn set_enabled(&mut self, dev: &str, enable: bool) -> Result<(), UcmError> {
        if self.api.device_enabled(dev)? == enable {
            return Ok(());
        }
        debug!(dev, enable, "ucm device state change");
        self.api.set_device_enabled(dev, enable)
    }

    /// Record `verb` as the use case. The verb is only applied by
    /// [`Self::enable_use_case`].
    pub fn set_use_case(&mut self, verb: &str) -> Result<(), UcmError> {
        if !self.api.list_verbs().iter().any(|v| v == verb) {
            return Err(UcmError::NotFound(verb.into()));
        }
        self.use_case = Some(verb.to_string());
        Ok(())
    }

    /// Apply the most recently set verb.
    pub fn enable_use_case(&mut self) -> Result<(), UcmError> {
        let verb = self
            .use_case
            .clone()
            .ok_or_else(|| UcmError::NotFound("use case".into()))?;
        self.api.set_verb(&verb)
    }

    /// Whether a `"<node> Noise Cancellation"` modifier exists.
    pub fn node_noise_cancellation_exists(&self, node: &str) -> bool {
        let modifier = format!("{node} {NOISE_CANCELLATION_SUFFIX}");
        self.api.list_modifiers().iter().any(|m| m == &modifier)
    }

    /// Toggle noise cancellation for a node via its modifier.
    pub fn enable_node_noise_cancellation(
        &mut self,
        node: &str,
        enable: bool,
    ) -> Result<(), UcmError> {
        let modifier = format!("{node} {NOISE_CANCELLATION_SUFFIX}");
        self.modifier_try_enable(&modifier, enable)
    }

    /// Whether a `"<node> Swap Mode"` modifier exists.
    pub fn node_swap_mode_exists(&self, node: &str) -> bool {
        let modifier = format!("{node} {SWAP_MODE_SUFFIX}");
        self.api.list_modifiers().iter().any(|m| m == &modifier)
    }

    /// Toggle left-right swap for a node via its modifier.
    pub fn enable_swap_mode(&mut self, node: &str, enable: bool) -> Result<(), UcmError> {
        let modifier = format!("{node} {SWAP_MODE_SUFFIX}");
        self.modifier_try_enable(&modifier, enable)
    }

    /// Ordered mixer control names for the main volume chain.
    pub fn get_main_volume_names(&self) -> Vec<String> {
        self.api
            .get_var(MAIN_VOLUME_NAMES_VAR, "")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Verb-level flag lookup.
    pub fn get_flag(&self, flag: &str) -> Option<String> {
        self.api.get_var(flag, "")
    }

    fn modifier_try_enable(&mut self, modifier: &str, enable: bool) -> Result<(), UcmError> {
        if !self.api.list_modifiers().iter().any(|m| m == modifier) {
            return Err(UcmError::NotSupported(modifier.into()));
        }
        if self.api.modifier_enabled(modifier)? == enable {
            return Ok(());
        }
        self.api.set_modifier_enabled(modifier, enable)
    }

    fn get_int<T: std::str::FromStr>(&self, var: &str, dev: &str) -> Result<T, UcmError> {
        let raw = self
            .api
            .get_var(var, dev)
            .ok_or_else(|| UcmError::NotFound(var.into()))?;
        raw.trim()
            .parse()
            .map_err(|_| UcmError::Invalid(var.into()))
    }
}
