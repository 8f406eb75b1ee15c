//! Key and coin derivation
//!
//! Two permutation tables drive everything the transforms do:
//!
//! - **CoinTable** — derived once per session from the password (plus an
//!   optional zone label) through PBKDF2-HMAC-SHA256, then a SHA-256-driven
//!   Fisher–Yates walk. Immutable for the session lifetime.
//! - **CBox** — derived per message from `SHA-256(plaintext ‖ CoinTable)`,
//!   rebuilt at decrypt from the hash carried in the packet header.
//!
//! Both are bijective permutations of `{0..255}` stored with their inverses.
//! The same Fisher–Yates rule also produces the per-message **coins** table
//! from `SHA-256(hash ‖ salt)`.
//!
//! The dual-factor shape matters: the zone label is run through its own
//! PBKDF2 block and concatenated after the password block, so a session with
//! a zone can never collide with a zone-free session that happens to share a
//! password digest.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha2::{Digest, Sha256};

/// Required salt length in bytes.
pub const SALT_LEN: usize = 12;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Errors surfaced while deriving key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyingError {
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("iteration count must be positive")]
    ZeroIterations,
    #[error("PBKDF2 derivation failed")]
    Derivation,
}

/// Which permutation the transforms currently consult.
///
/// `Message` is the per-message CBox (payload work); `CoinTable` is the
/// session table (header work only). Selection is scoped by the session so
/// header failures can never leak CoinTable-active state into payload work.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ActiveSlot {
    Message,
    CoinTable,
}

/// Identity table `T[i] = i`.
#[inline]
pub fn identity_table() -> [u8; 256] {
    let mut t = [0u8; 256];
    for (i, b) in t.iter_mut().enumerate() {
        *b = i as u8;
    }
    t
}

/// Hash-driven Fisher–Yates: walk `digest` cyclically, swapping
/// `T[i]` with `T[(digest[hi] + i) mod (i + 1)]` for `i = 255..1`.
///
/// This exact rule is shared by CoinTable, CBox and coins derivation; any
/// change here is a wire-format change.
pub fn permutation_from_digest(digest: &[u8; 32]) -> [u8; 256] {
    let mut t = identity_table();
    let mut hi = 0usize;
    for i in (1..=255usize).rev() {
        let j = digest[hi % 32] as usize;
        hi += 1;
        t.swap(i, (j + i) % (i + 1));
    }
    t
}

/// Invert a 256-byte permutation.
pub fn invert_permutation(t: &[u8; 256]) -> [u8; 256] {
    let mut inv = [0u8; 256];
    for (i, &v) in t.iter().enumerate() {
        inv[v as usize] = i as u8;
    }
    inv
}

/// Session-level permutation derived from password (+ zone) and salt.
#[derive(Clone, Debug)]
pub struct CoinTable {
    pub forward: [u8; 256],
    pub inverse: [u8; 256],
}

impl CoinTable {
    /// Derive the table.
    ///
    /// With `rfc2898` enabled the password (and, when present, the zone
    /// label) each contribute a 32-byte PBKDF2-HMAC-SHA256 block; the
    /// iteration budget is split evenly across the two factors (rounded up
    /// to even first). With it disabled the raw bytes feed the hash walk
    /// directly.
    pub fn derive(
        password: &[u8],
        zone: &[u8],
        salt: &[u8; SALT_LEN],
        iterations: u32,
        rfc2898: bool,
    ) -> Result<Self, KeyingError> {
        if password.is_empty() {
            return Err(KeyingError::EmptyPassword);
        }

        let combined: Vec<u8> = if rfc2898 {
            if iterations == 0 {
                return Err(KeyingError::ZeroIterations);
            }
            let mut iters = iterations;
            let factors = if zone.is_empty() { 1 } else { 2 };
            if factors == 2 {
                iters += iters & 1;
            }

            let mut derived = vec![0u8; 32 * factors as usize];
            pbkdf2::<Hmac<Sha256>>(password, salt, iters / factors, &mut derived[..32])
                .map_err(|_| KeyingError::Derivation)?;
            if factors == 2 {
                pbkdf2::<Hmac<Sha256>>(zone, salt, iters / 2, &mut derived[32..])
                    .map_err(|_| KeyingError::Derivation)?;
            }
            derived
        } else {
            let mut raw = Vec::with_capacity(password.len() + zone.len());
            raw.extend_from_slice(password);
            raw.extend_from_slice(zone);
            raw
        };

        let digest: [u8; 32] = Sha256::digest(&combined).into();
        let forward = permutation_from_digest(&digest);
        let inverse = invert_permutation(&forward);
        Ok(Self { forward, inverse })
    }
}

/// Per-message permutation, rebuilt from the header hash at decrypt.
#[derive(Clone, Debug)]
pub struct CBox {
    pub forward: [u8; 256],
    pub inverse: [u8; 256],
}

impl CBox {
    /// Build from a message hash.
    pub fn from_hash(hash: &[u8; 32]) -> Self {
        let forward = permutation_from_digest(hash);
        let inverse = invert_permutation(&forward);
        Self { forward, inverse }
    }
}

/// The message hash stored in the packet header:
/// `SHA-256(plaintext ‖ CoinTable)`.
pub fn message_hash(plaintext: &[u8], coin_table: &CoinTable) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(plaintext);
    h.update(coin_table.forward);
    h.finalize().into()
}

/// The per-message coins permutation: the Fisher–Yates walk over
/// `SHA-256(hash ‖ salt)`.
pub fn coins_for(hash: &[u8; 32], salt: &[u8; SALT_LEN]) -> [u8; 256] {
    let mut h = Sha256::new();
    h.update(hash);
    h.update(salt);
    let digest: [u8; 32] = h.finalize().into();
    permutation_from_digest(&digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: [u8; SALT_LEN] = [0u8; SALT_LEN];

    fn is_permutation(t: &[u8; 256]) -> bool {
        let mut seen = [false; 256];
        for &v in t.iter() {
            if seen[v as usize] {
                return false;
            }
            seen[v as usize] = true;
        }
        true
    }

    #[test]
    fn coin_table_is_deterministic() {
        let a = CoinTable::derive(b"sample-password", b"", &SALT, 1000, true).unwrap();
        let b = CoinTable::derive(b"sample-password", b"", &SALT, 1000, true).unwrap();
        assert_eq!(a.forward, b.forward);
        assert_eq!(a.inverse, b.inverse);
    }

    #[test]
    fn coin_table_is_bijective_with_inverse() {
        let t = CoinTable::derive(b"pw", b"zone-7", &SALT, 1000, true).unwrap();
        assert!(is_permutation(&t.forward));
        for i in 0..256 {
            assert_eq!(t.inverse[t.forward[i] as usize] as usize, i);
        }
    }

    #[test]
    fn zone_label_changes_the_table() {
        let plain = CoinTable::derive(b"pw", b"", &SALT, 1000, true).unwrap();
        let zoned = CoinTable::derive(b"pw", b"zone-7", &SALT, 1000, true).unwrap();
        assert_ne!(plain.forward, zoned.forward);
    }

    #[test]
    fn rfc2898_toggle_changes_the_table() {
        let kdf = CoinTable::derive(b"pw", b"", &SALT, 1000, true).unwrap();
        let raw = CoinTable::derive(b"pw", b"", &SALT, 1000, false).unwrap();
        assert_ne!(kdf.forward, raw.forward);
    }

    #[test]
    fn empty_password_is_rejected() {
        assert!(matches!(
            CoinTable::derive(b"", b"", &SALT, 1000, true),
            Err(KeyingError::EmptyPassword)
        ));
    }

    #[test]
    fn cbox_is_deterministic_in_hash() {
        let ct = CoinTable::derive(b"pw", b"", &SALT, 1000, true).unwrap();
        let h = message_hash(b"hello", &ct);
        let a = CBox::from_hash(&h);
        let b = CBox::from_hash(&h);
        assert_eq!(a.forward, b.forward);
        assert!(is_permutation(&a.forward));
    }

    #[test]
    fn coins_are_a_permutation_and_salt_sensitive() {
        let ct = CoinTable::derive(b"pw", b"", &SALT, 1000, true).unwrap();
        let h = message_hash(b"payload", &ct);
        let a = coins_for(&h, &SALT);
        assert!(is_permutation(&a));
        let b = coins_for(&h, &[1u8; SALT_LEN]);
        assert_ne!(a, b);
    }
}
