//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Scheduling of the audio callback threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum SchedPolicy {
    /// Inherit the default scheduler.
    None,
    /// Nice value under the default scheduler.
    Nice { level: i32 },
    /// Round-robin real-time priority.
    Rr { priority: u32 },
}

/// Speak-on-mute detector tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakOnMuteSettings {
    pub detection_window_size: u32,
    pub detection_threshold: u32,
    pub rate_limit_ms: u64,
}

impl Default for SpeakOnMuteSettings {
    fn default() -> Self {
        SpeakOnMuteSettings {
            detection_window_size: 30,
            detection_threshold: 28,
            rate_limit_ms: 1000,
        }
    }
}

/// Top-level server configuration, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Audio thread scheduling.
    pub audio_thread_sched: SchedPolicy,
    /// Enable wideband speech for HFP peers that support it.
    pub wbs_enabled: bool,
    /// Force the default L2CAP payload size for A2DP instead of the
    /// negotiated MTU.
    pub fix_a2dp_packet_size: bool,
    /// Speak-on-mute detector parameters.
    pub speak_on_mute: SpeakOnMuteSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            audio_thread_sched: SchedPolicy::Rr { priority: 12 },
            wbs_enabled: true,
            fix_a2dp_packet_size: false,
            speak_on_mute: SpeakOnMuteSettings::default(),
        }
    }
}

/// Configuration load errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file.
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse the TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ServerConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }
}
