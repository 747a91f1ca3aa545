//! Process-wide audio state.

use crate::text::{PLAYER_STRING_MAX, sanitize};

/// Player playback statuses the control surface accepts.
pub const PLAYBACK_STATUSES: [&str; 6] = [
    "stopped",
    "playing",
    "paused",
    "forward-seek",
    "reverse-seek",
    "error",
];

/// Media player state forwarded to BT peers.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub playback_status: String,
    pub identity: String,
    /// Playback position in microseconds.
    pub position: i64,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Track length in microseconds.
    pub length: i64,
}

impl Default for PlayerState {
    fn default() -> Self {
        PlayerState {
            playback_status: "playing".to_string(),
            identity: "DefaultPlayer".to_string(),
            position: 0,
            title: String::new(),
            artist: String::new(),
            album: String::new(),
            length: 0,
        }
    }
}

/// System-wide volumes, mutes, flags, and capabilities.
#[derive(Debug, Clone)]
pub struct SystemState {
    pub volume: i32,
    pub system_mute: bool,
    pub user_mute: bool,
    pub capture_mute: bool,
    pub suspended: bool,

    pub aec_supported: bool,
    pub aec_group_id: i32,
    pub ns_supported: bool,
    pub agc_supported: bool,
    pub deprioritize_bt_wbs_mic: bool,
    pub internal_card_detected: bool,

    pub floss_enabled: bool,
    pub wbs_enabled: bool,
    pub noise_cancellation_enabled: bool,
    pub bypass_block_noise_cancellation: bool,
    pub force_sr_bt_enabled: bool,
    pub fix_a2dp_packet_size: bool,
    pub force_respect_ui_gains: bool,

    pub default_output_buffer_size: u32,
    pub non_empty_audio: bool,

    pub player: PlayerState,
}

impl Default for SystemState {
    fn default() -> Self {
        SystemState {
            volume: 100,
            system_mute: false,
            user_mute: false,
            capture_mute: false,
            suspended: false,
            aec_supported: false,
            aec_group_id: -1,
            ns_supported: false,
            agc_supported: false,
            deprioritize_bt_wbs_mic: false,
            internal_card_detected: false,
            floss_enabled: false,
            wbs_enabled: true,
            noise_cancellation_enabled: false,
            bypass_block_noise_cancellation: false,
            force_sr_bt_enabled: false,
            fix_a2dp_packet_size: false,
            force_respect_ui_gains: false,
            default_output_buffer_size: 512,
            non_empty_audio: false,
            player: PlayerState::default(),
        }
    }
}

impl SystemState {
    /// Whether output is effectively muted (system or user).
    pub fn output_muted(&self) -> bool {
        self.system_mute || self.user_mute
    }

    /// Validate and store a player playback status.
    pub fn set_playback_status(&mut self, status: &str) -> bool {
        if !PLAYBACK_STATUSES.contains(&status) {
            return false;
        }
        self.player.playback_status = status.to_string();
        true
    }

    /// Validate and store the player identity.
    pub fn set_player_identity(&mut self, identity: &str) -> bool {
        if identity.len() > PLAYER_STRING_MAX {
            return false;
        }
        self.player.identity = sanitize(identity).to_string();
        true
    }

    /// Validate and store the playback position.
    pub fn set_player_position(&mut self, position: i64) -> bool {
        if position < 0 {
            return false;
        }
        self.player.position = position;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_status_validation() {
        let mut state = SystemState::default();
        assert!(state.set_playback_status("paused"));
        assert_eq!(state.player.playback_status, "paused");
        assert!(!state.set_playback_status("grooving"));
        assert_eq!(state.player.playback_status, "paused");
    }

    #[test]
    fn player_identity_is_length_capped() {
        let mut state = SystemState::default();
        assert!(state.set_player_identity("Spotify"));
        assert!(!state.set_player_identity(&"x".repeat(PLAYER_STRING_MAX + 1)));
    }

    #[test]
    fn player_position_rejects_negative() {
        let mut state = SystemState::default();
        assert!(state.set_player_position(1_000_000));
        assert!(!state.set_player_position(-1));
        assert_eq!(state.player.position, 1_000_000);
    }

    #[test]
    fn output_mute_composition() {
        let mut state = SystemState::default();
        assert!(!state.output_muted());
        state.user_mute = true;
        assert!(state.output_muted());
        state.user_mute = false;
        state.system_mute = true;
        assert!(state.output_muted());
    }
}
