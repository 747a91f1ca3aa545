//! Stable hashing for node identifiers.
//!
//! Stable ids must survive reboots (they key user preferences), so they use
//! FNV-1a over persistent attributes. Before a stable id leaves the process
//! on the control surface it is pseudonymised with a per-process salt so raw
//! MAC/serial bytes never leak; the mapping is deterministic within a boot.

use std::hash::{BuildHasher, Hasher};
use std::sync::OnceLock;

const FNV_OFFSET: u32 = 0x811c9dc5;
const FNV_PRIME: u32 = 0x01000193;

/// FNV-1a over `bytes`.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    fnv1a32_seeded(FNV_OFFSET, bytes)
}

/// Continue an FNV-1a hash from a previous value, for composite keys.
pub fn fnv1a32_seeded(seed: u32, bytes: &[u8]) -> u32 {
    let mut hash = seed;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn process_salt() -> u32 {
    static SALT: OnceLock<u32> = OnceLock::new();
    *SALT.get_or_init(|| {
        let state = std::collections::hash_map::RandomState::new();
        let mut hasher = state.build_hasher();
        hasher.write_u64(0x6175_7261_6c21);
        hasher.finish() as u32
    })
}

/// Pseudonymise a stable id for external emission.
///
/// Deterministic within one server run, unrelated to the raw id across runs.
pub fn pseudonymize(stable_id: u32) -> u32 {
    fnv1a32_seeded(process_salt() ^ FNV_OFFSET, &stable_id.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_is_deterministic() {
        assert_eq!(fnv1a32(b"Headphone Jack"), fnv1a32(b"Headphone Jack"));
        assert_ne!(fnv1a32(b"Headphone Jack"), fnv1a32(b"Mic Jack"));
    }

    #[test]
    fn seeded_hash_chains() {
        let h1 = fnv1a32(b"card0");
        assert_ne!(fnv1a32_seeded(h1, b"node"), fnv1a32(b"node"));
    }

    #[test]
    fn pseudonym_is_stable_within_process() {
        assert_eq!(pseudonymize(1234), pseudonymize(1234));
        assert_ne!(pseudonymize(1234), pseudonymize(1235));
    }

    #[test]
    fn pseudonym_hides_raw_id() {
        // Not a proof, but the trivial identity mapping must not happen.
        assert_ne!(pseudonymize(0xdeadbeef), 0xdeadbeef);
    }
}
