//! Transform engine
//!
//! Applies an ordered transform sequence across global rounds, with the
//! block-alignment padding discipline that makes AES-style transforms safe
//! anywhere in a sequence:
//!
//! - **Forward**: pad the input to a 16-byte boundary with bytes copied from
//!   the active CBox prefix, run the sequence, then append a single trailing
//!   byte holding the pad count. Output length is `round_up_16(len) + 1`.
//! - **Reverse**: strip the trailing pad-count byte, run the (already
//!   reversed and inverse-mapped) sequence, then drop the pad bytes.
//!
//! Coin selection: each transform invocation at per-transform round `r` uses
//! `coins[(coin_preference + r) mod 256]`; on the reverse path the round
//! index runs backward so the same coins are replayed in mirror order.
//!
//! The aligned entry points skip the padding bookkeeping entirely; the header
//! codec uses them for its fixed 48-byte part, which is 16-aligned by
//! construction.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use tracing::trace;

use crate::registry::{RegistryError, TransformRegistry};
use crate::scratch;
use crate::transforms::{TransformCtx, TransformError};

/// Engine failures. All are fatal to the operation in flight.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("cannot reverse an empty buffer")]
    EmptyInput,
    #[error("invalid padding byte {padding} for buffer of {len} bytes")]
    InvalidPadding { padding: u8, len: usize },
    #[error("aligned path requires a multiple of 16 bytes (got {0})")]
    UnalignedInput(usize),
}

/// Pad count needed to reach the next 16-byte boundary.
#[inline]
pub fn pad_for(len: usize) -> usize {
    (16 - (len % 16)) % 16
}

/// Size of the engine's forward output for a `len`-byte input.
#[inline]
pub fn padded_output_len(len: usize) -> usize {
    len + pad_for(len) + 1
}

/// Run `sequence` over `buf` in place for `global_rounds` rounds.
///
/// `buf` must already satisfy every alignment the sequence demands; the
/// padded entry points below guarantee that by construction.
pub fn run_rounds(
    registry: &TransformRegistry,
    ctx: &TransformCtx<'_>,
    sequence: &[(u8, u8)],
    global_rounds: u8,
    buf: &mut [u8],
    coins: &[u8; 256],
    reverse: bool,
) -> Result<(), EngineError> {
    for _ in 0..global_rounds {
        for &(id, tr) in sequence {
            let info = registry.get(id)?;
            for round in 0..tr {
                let selected = if reverse { tr - round - 1 } else { round };
                let coin_index = (info.coin_preference as usize + selected as usize) % 256;
                (info.apply)(ctx, buf, coins[coin_index])?;
            }
        }
    }
    Ok(())
}

/// Forward pass with padding: returns `round_up_16(len) + 1` bytes.
pub fn apply_forward(
    registry: &TransformRegistry,
    ctx: &TransformCtx<'_>,
    sequence: &[(u8, u8)],
    global_rounds: u8,
    input: &[u8],
    coins: &[u8; 256],
) -> Result<Vec<u8>, EngineError> {
    let pad = pad_for(input.len());
    let mut working = scratch::rent(input.len() + pad);
    working[..input.len()].copy_from_slice(input);
    working[input.len()..].copy_from_slice(&ctx.cbox[..pad]);

    trace!(len = input.len(), pad, rounds = global_rounds, "engine forward");
    run_rounds(registry, ctx, sequence, global_rounds, &mut working, coins, false)?;

    working.push(pad as u8);
    Ok(working)
}

/// Reverse pass: strips the trailing pad-count byte, unwinds the sequence
/// (which the caller has already reversed and inverse-mapped), and drops the
/// pad bytes.
pub fn apply_reverse(
    registry: &TransformRegistry,
    ctx: &TransformCtx<'_>,
    sequence: &[(u8, u8)],
    global_rounds: u8,
    input: &[u8],
    coins: &[u8; 256],
) -> Result<Vec<u8>, EngineError> {
    let (&pad_byte, body) = input.split_last().ok_or(EngineError::EmptyInput)?;
    let pad = pad_byte as usize;
    if pad > body.len() {
        return Err(EngineError::InvalidPadding { padding: pad_byte, len: input.len() });
    }

    let mut working = scratch::rent(body.len());
    working.copy_from_slice(body);

    trace!(len = body.len(), pad, rounds = global_rounds, "engine reverse");
    run_rounds(registry, ctx, sequence, global_rounds, &mut working, coins, true)?;

    let out = working[..working.len() - pad].to_vec();
    scratch::recycle(working);
    Ok(out)
}

/// Forward pass over an already 16-aligned buffer, in place: no pad bytes,
/// no trailing count.
pub fn apply_forward_aligned(
    registry: &TransformRegistry,
    ctx: &TransformCtx<'_>,
    sequence: &[(u8, u8)],
    global_rounds: u8,
    buf: &mut [u8],
    coins: &[u8; 256],
) -> Result<(), EngineError> {
    if buf.len() % 16 != 0 {
        return Err(EngineError::UnalignedInput(buf.len()));
    }
    run_rounds(registry, ctx, sequence, global_rounds, buf, coins, false)
}

/// Reverse counterpart of [`apply_forward_aligned`].
pub fn apply_reverse_aligned(
    registry: &TransformRegistry,
    ctx: &TransformCtx<'_>,
    sequence: &[(u8, u8)],
    global_rounds: u8,
    buf: &mut [u8],
    coins: &[u8; 256],
) -> Result<(), EngineError> {
    if buf.len() % 16 != 0 {
        return Err(EngineError::UnalignedInput(buf.len()));
    }
    run_rounds(registry, ctx, sequence, global_rounds, buf, coins, true)
}

/// Build the decrypt-side sequence: reverse the forward order and replace
/// every id with its inverse, keeping per-transform round counts.
pub fn reverse_sequence(
    registry: &TransformRegistry,
    sequence: &[(u8, u8)],
) -> Result<Vec<(u8, u8)>, EngineError> {
    let mut out = Vec::with_capacity(sequence.len());
    for &(id, tr) in sequence.iter().rev() {
        out.push((registry.get(id)?.inverse_id, tr));
    }
    Ok(out)
}
