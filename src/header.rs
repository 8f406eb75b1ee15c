//! Packet header codec
//!
//! Every packet starts with an encrypted, self-describing header. The
//! cleartext layout is:
//!
//! ```text
//! offset 0   version_major (1)
//! offset 1   version_minor (1)
//! offset 2   hash          (32)  SHA-256(plaintext ‖ CoinTable)
//! offset 34  salt          (12)
//! offset 46  global_rounds (1)
//! offset 47  seq_len       (1)
//! offset 48  (id, tr) pairs (2·seq_len)
//! ```
//!
//! On the wire the header travels in two independently encrypted parts split
//! after `seq_len`: the 48-byte fixed portion (16-aligned by construction, so
//! it rides the engine's aligned path and occupies exactly [`FIXED_LEN`]
//! bytes), and the id/tr tail through the standard padded path
//! (`round_up_16(2·seq_len) + 1` bytes). The fixed length is tightly coupled
//! to the field layout above; changing either means recomputing the other.
//!
//! Header encryption never touches the per-message CBox: it runs under the
//! session CoinTable with a profile derived purely from the CoinTable bytes,
//! which makes the header profile session-stable and lets a fresh session
//! recover the header before any payload state exists.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use sha2::{Digest, Sha256};
use tracing::trace;

use crate::engine::{
    self, apply_forward, apply_forward_aligned, apply_reverse, apply_reverse_aligned,
    pad_for, EngineError,
};
use crate::keying::{permutation_from_digest, CoinTable, SALT_LEN};
use crate::registry::{RegistryError, TransformRegistry};
use crate::transforms::TransformCtx;

/// Length of the fixed (part-1) portion of the cleartext header, which is
/// also its exact encrypted size.
pub const FIXED_LEN: usize = 48;

/// Global rounds used for header encryption.
const HEADER_GLOBAL_ROUNDS: u8 = 6;

/// Per-transform rounds for every header profile entry.
const HEADER_TR: u8 = 3;

/// Entries in the derived header profile.
const HEADER_SEQ_LEN: usize = 6;

/// The fixed lead transform of every header profile: the feedback cascade,
/// so every header byte depends on all earlier ones.
const HEADER_LEAD_ID: u8 = 35;

/// Candidate ids are drawn from the base catalog range only.
const HEADER_CANDIDATE_SPAN: u16 = 40;

/// Header codec failures.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("encrypted input too short for a header ({0} bytes)")]
    TooShort(usize),
    #[error("header part 2 truncated: expected {expected} bytes, got {got}")]
    TruncatedPart2 { expected: usize, got: usize },
    #[error("header part 2 decrypted to {got} bytes, expected {expected}")]
    PartLengthMismatch { expected: usize, got: usize },
    #[error("cleartext header malformed ({0} bytes)")]
    Malformed(usize),
    #[error("could not derive a header profile from the session table")]
    ProfileDerivation,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Parsed cleartext header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderFields {
    pub version_major: u8,
    pub version_minor: u8,
    pub hash: [u8; 32],
    pub salt: [u8; SALT_LEN],
    pub global_rounds: u8,
    pub sequence: Vec<(u8, u8)>,
}

/// Pack a cleartext header.
pub fn pack(
    version: (u8, u8),
    hash: &[u8; 32],
    salt: &[u8; SALT_LEN],
    global_rounds: u8,
    sequence: &[(u8, u8)],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(FIXED_LEN + 2 * sequence.len());
    out.push(version.0);
    out.push(version.1);
    out.extend_from_slice(hash);
    out.extend_from_slice(salt);
    out.push(global_rounds);
    out.push(sequence.len() as u8);
    for &(id, tr) in sequence {
        out.push(id);
        out.push(tr);
    }
    out
}

/// Parse a cleartext header.
pub fn parse(bytes: &[u8]) -> Result<HeaderFields, HeaderError> {
    if bytes.len() < FIXED_LEN {
        return Err(HeaderError::Malformed(bytes.len()));
    }
    let seq_len = bytes[47] as usize;
    if bytes.len() != FIXED_LEN + 2 * seq_len {
        return Err(HeaderError::Malformed(bytes.len()));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes[2..34]);
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&bytes[34..46]);
    let sequence = bytes[FIXED_LEN..]
        .chunks_exact(2)
        .map(|p| (p[0], p[1]))
        .collect();
    Ok(HeaderFields {
        version_major: bytes[0],
        version_minor: bytes[1],
        hash,
        salt,
        global_rounds: bytes[46],
        sequence,
    })
}

/// Encrypted size of a header whose sequence has `seq_len` entries.
#[inline]
pub fn encrypted_len(seq_len: usize) -> usize {
    let tail = 2 * seq_len;
    FIXED_LEN + tail + pad_for(tail) + 1
}

/// Derive the session-stable header profile from the CoinTable bytes.
///
/// The first entry is pinned to the feedback cascade; the remaining five are
/// chosen by walking `SHA-256(CoinTable)` pairwise, skipping excluded,
/// unknown and duplicate candidates.
pub fn derive_header_profile(
    registry: &TransformRegistry,
    coin_table: &CoinTable,
) -> Result<(Vec<(u8, u8)>, u8), HeaderError> {
    let digest: [u8; 32] = Sha256::digest(coin_table.forward).into();
    let mut sequence: Vec<(u8, u8)> = vec![(HEADER_LEAD_ID, HEADER_TR)];

    let mut k = 0usize;
    while sequence.len() < HEADER_SEQ_LEN && k < 512 {
        let candidate = ((digest[k % 32] as u16 + digest[(k + 1) % 32] as u16)
            % HEADER_CANDIDATE_SPAN
            + 1) as u8;
        k += 1;
        if !registry.contains(candidate) {
            continue;
        }
        if registry.get(candidate)?.exclude_from_permutations {
            continue;
        }
        if sequence.iter().any(|&(id, _)| id == candidate) {
            continue;
        }
        sequence.push((candidate, HEADER_TR));
    }
    if sequence.len() < HEADER_SEQ_LEN {
        return Err(HeaderError::ProfileDerivation);
    }
    trace!(?sequence, "header profile derived");
    Ok((sequence, HEADER_GLOBAL_ROUNDS))
}

/// Coins for header work, a pure function of the CoinTable:
/// `fisher_yates(SHA-256(SHA-256(CoinTable) ‖ CoinTable[0..12]))`.
pub fn header_coins(coin_table: &CoinTable) -> [u8; 256] {
    let digest: [u8; 32] = Sha256::digest(coin_table.forward).into();
    let mut h = Sha256::new();
    h.update(digest);
    h.update(&coin_table.forward[..SALT_LEN]);
    let combined: [u8; 32] = h.finalize().into();
    permutation_from_digest(&combined)
}

/// Encrypt a cleartext header. `ctx` must have the CoinTable active.
pub fn encrypt(
    registry: &TransformRegistry,
    ctx: &TransformCtx<'_>,
    coin_table: &CoinTable,
    clear: &[u8],
) -> Result<Vec<u8>, HeaderError> {
    if clear.len() < FIXED_LEN {
        return Err(HeaderError::Malformed(clear.len()));
    }
    let (sequence, rounds) = derive_header_profile(registry, coin_table)?;
    let coins = header_coins(coin_table);

    let mut part1 = clear[..FIXED_LEN].to_vec();
    apply_forward_aligned(registry, ctx, &sequence, rounds, &mut part1, &coins)?;

    let part2 = apply_forward(registry, ctx, &sequence, rounds, &clear[FIXED_LEN..], &coins)?;

    let mut out = part1;
    out.extend_from_slice(&part2);
    Ok(out)
}

/// Decrypt the header at the front of `encrypted`. Returns the cleartext
/// header and the number of encrypted bytes it consumed.
pub fn decrypt(
    registry: &TransformRegistry,
    ctx: &TransformCtx<'_>,
    coin_table: &CoinTable,
    encrypted: &[u8],
) -> Result<(Vec<u8>, usize), HeaderError> {
    if encrypted.len() < FIXED_LEN {
        return Err(HeaderError::TooShort(encrypted.len()));
    }
    let (sequence, rounds) = derive_header_profile(registry, coin_table)?;
    let reversed = engine::reverse_sequence(registry, &sequence)?;
    let coins = header_coins(coin_table);

    let mut part1 = encrypted[..FIXED_LEN].to_vec();
    apply_reverse_aligned(registry, ctx, &reversed, rounds, &mut part1, &coins)?;

    let seq_len = part1[47] as usize;
    let tail = 2 * seq_len;
    let part2_enc_len = tail + pad_for(tail) + 1;
    let available = encrypted.len() - FIXED_LEN;
    if available < part2_enc_len {
        return Err(HeaderError::TruncatedPart2 { expected: part2_enc_len, got: available });
    }

    let part2 = apply_reverse(
        registry,
        ctx,
        &reversed,
        rounds,
        &encrypted[FIXED_LEN..FIXED_LEN + part2_enc_len],
        &coins,
    )?;
    if part2.len() != tail {
        return Err(HeaderError::PartLengthMismatch { expected: tail, got: part2.len() });
    }

    let mut clear = part1;
    clear.extend_from_slice(&part2);
    Ok((clear, FIXED_LEN + part2_enc_len))
}
