//! String discipline for the control surface.

use tracing::warn;

/// Longest accepted player identity or metadata field, in bytes.
pub const PLAYER_STRING_MAX: usize = 128;

/// Replace non-UTF-8-safe strings with the empty string.
///
/// Every human-readable string leaving the server goes through here first;
/// bus libraries may abort the process on invalid UTF-8. Rust strings are
/// always valid UTF-8, so the check guards interior NULs, which several bus
/// implementations also reject.
pub fn sanitize(s: &str) -> &str {
    if s.contains('\0') {
        warn!("string with interior NUL cannot cross the control surface");
        return "";
    }
    s
}

/// Sanitize raw bytes into a string, empty on invalid UTF-8.
pub fn sanitize_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => sanitize(s).to_string(),
        Err(_) => {
            warn!("non-utf8 string cannot cross the control surface");
            String::new()
        }
    }
}

/// Whether a player string fits the accepted bound.
pub fn player_string_ok(s: &str) -> bool {
    s.len() <= PLAYER_STRING_MAX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_strings_pass_through() {
        assert_eq!(sanitize("Headset"), "Headset");
        assert_eq!(sanitize_bytes(b"Headset"), "Headset");
    }

    #[test]
    fn invalid_bytes_become_empty() {
        assert_eq!(sanitize_bytes(&[0xff, 0xfe]), "");
        assert_eq!(sanitize("with\0nul"), "");
    }

    #[test]
    fn player_bound() {
        assert!(player_string_ok(&"x".repeat(PLAYER_STRING_MAX)));
        assert!(!player_string_ok(&"x".repeat(PLAYER_STRING_MAX + 1)));
    }
}
