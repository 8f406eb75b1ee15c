//! Reversible byte transforms
//!
//! Every transform mutates a buffer in place, driven by a single coin byte
//! that seeds a fresh [`TomRandom`] over the active CBox. Forward/inverse
//! pairs rely on that determinism: the inverse replays the exact mask stream
//! of the forward pass, so both must be invoked with the same coin and the
//! same active tables.
//!
//! Shapes that recur below:
//! - **Mask XOR** — XOR against the stream (self-inverse by replay).
//! - **Substitution** — S-box / CBox / CoinTable layers with mirrored
//!   inverse layering.
//! - **Permutation** — seeded Fisher–Yates over bits, nibbles, bytes or
//!   blocks; the inverse records the swap indices and replays them backward.
//! - **Arithmetic** — modular add with a subtracting inverse.
//! - **AES steps** — ShiftRows/SubBytes/MixColumns over 16-byte column-major
//!   states; these demand 16-aligned input and fail loudly otherwise.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use crate::prng::TomRandom;
use crate::tables::{gmul, INV_SBOX, SBOX};

/// Tables a transform may consult. `cbox`/`cbox_inv` are the *active*
/// permutation (per-message CBox for payload work, CoinTable for header
/// work); the CoinTable pair is always the session table.
pub struct TransformCtx<'a> {
    pub cbox: &'a [u8; 256],
    pub cbox_inv: &'a [u8; 256],
    pub coin_table: &'a [u8; 256],
    pub coin_table_inv: &'a [u8; 256],
}

/// Precondition failures raised by individual transforms.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("input length {len} is not a multiple of {required}")]
    BlockAlignment { required: usize, len: usize },
}

/// The uniform implementation signature stored in the registry.
pub type TransformFn = fn(&TransformCtx<'_>, &mut [u8], u8) -> Result<(), TransformError>;

#[inline]
fn rng<'a>(ctx: &'a TransformCtx<'_>, coin: u8) -> TomRandom<'a> {
    TomRandom::new(ctx.cbox, coin as i32)
}

#[inline]
fn swap_nibbles(b: u8) -> u8 {
    (b << 4) | (b >> 4)
}

#[inline]
fn require_multiple(len: usize, required: usize) -> Result<(), TransformError> {
    if len % required != 0 {
        return Err(TransformError::BlockAlignment { required, len });
    }
    Ok(())
}

// ============================================================================
// Mask XOR family
// ============================================================================

/// XOR the mask stream into every byte.
pub fn xor_tx(ctx: &TransformCtx<'_>, buf: &mut [u8], coin: u8) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b ^= r.next_mask();
    }
    Ok(())
}

/// Flip 1..=4 stream-chosen bit positions in each byte.
pub fn bit_rand_flip_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        let flips = r.next_range(1, 5);
        let mut mask = 0u8;
        for _ in 0..flips {
            mask ^= 1 << r.next(8);
        }
        *b ^= mask;
    }
    Ok(())
}

/// No-op. Excluded from generated permutations.
pub fn passthrough_tx(
    _ctx: &TransformCtx<'_>,
    _buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    Ok(())
}

/// XOR with `S[mask]`. Registered as a forward/inverse pair, but the bodies
/// are identical: the stream replays, so the XOR self-cancels.
pub fn mask_based_sbox_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b ^= SBOX[r.next_mask() as usize];
    }
    Ok(())
}

/// Mix the upper nibble with an S-box-derived nibble.
pub fn apply_mask_based_mixing_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b ^= SBOX[r.next_mask() as usize] & 0xF0;
    }
    Ok(())
}

/// XOR a position-selected bit, gated by the stream.
pub fn bit_flip_cascade_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for (i, b) in buf.iter_mut().enumerate() {
        *b ^= r.next_mask() & (1 << (i & 7));
    }
    Ok(())
}

/// Rolling XOR: one stream draw, rotated one bit per byte.
pub fn sliding_mask_overlay_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    let mut mask = r.next_mask();
    for b in buf.iter_mut() {
        *b ^= mask;
        mask = mask.rotate_left(1);
    }
    Ok(())
}

/// Overlapping 8-byte windows at stride 4, each XORing one fresh stream
/// byte into its span. Stream-driven only, so a second pass cancels the
/// first exactly.
pub fn pattern_equalizer_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    let mut start = 0usize;
    while start < buf.len() {
        let mask = r.next_mask();
        let end = (start + 8).min(buf.len());
        for b in &mut buf[start..end] {
            *b ^= mask;
        }
        start += 4;
    }
    Ok(())
}

/// Per-256-byte chunk, a fresh stream seeded by `coin + chunk_index`.
pub fn chunked_fb_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    for (chunk_index, chunk) in buf.chunks_mut(256).enumerate() {
        let mut r = TomRandom::new(ctx.cbox, coin as i32 + chunk_index as i32);
        for b in chunk.iter_mut() {
            *b ^= r.next_mask();
        }
    }
    Ok(())
}

// ============================================================================
// Substitution family
// ============================================================================

/// `S[S[b] ^ mask]`
pub fn masked_double_sub_fwd_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b = SBOX[(SBOX[*b as usize] ^ r.next_mask()) as usize];
    }
    Ok(())
}

pub fn masked_double_sub_inv_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b = INV_SBOX[(INV_SBOX[*b as usize] ^ r.next_mask()) as usize];
    }
    Ok(())
}

/// `S[b] ^ mask`
pub fn sub_bytes_xor_mask_fwd_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b = SBOX[*b as usize] ^ r.next_mask();
    }
    Ok(())
}

pub fn sub_bytes_xor_mask_inv_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b = INV_SBOX[(*b ^ r.next_mask()) as usize];
    }
    Ok(())
}

/// Pure S-box substitution.
pub fn sub_bytes_fwd_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    for b in buf.iter_mut() {
        *b = SBOX[*b as usize];
    }
    Ok(())
}

pub fn sub_bytes_inv_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    for b in buf.iter_mut() {
        *b = INV_SBOX[*b as usize];
    }
    Ok(())
}

/// Feedback cascade: `y = S[cbox[x ^ mask ^ prev]]`, `prev = y`.
///
/// The chain makes every output byte depend on all earlier input bytes,
/// which is why the header codec leads with this one.
pub fn masked_cascade_sub_fb_fwd_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    let mut prev = 0u8;
    for b in buf.iter_mut() {
        let mask = r.next_mask();
        let y = SBOX[ctx.cbox[(*b ^ mask ^ prev) as usize] as usize];
        *b = y;
        prev = y;
    }
    Ok(())
}

/// Unwinds the cascade using the ciphertext as the feedback source.
pub fn masked_cascade_sub_fb_inv_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    let mut prev = 0u8;
    for b in buf.iter_mut() {
        let mask = r.next_mask();
        let y = *b;
        *b = ctx.cbox_inv[INV_SBOX[y as usize] as usize] ^ mask ^ prev;
        prev = y;
    }
    Ok(())
}

/// Three substitution layers: CoinTable, then the active CBox, then S.
pub fn cascade_sub_3x_fwd_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    for b in buf.iter_mut() {
        *b = SBOX[ctx.cbox[ctx.coin_table[*b as usize] as usize] as usize];
    }
    Ok(())
}

pub fn cascade_sub_3x_inv_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    for b in buf.iter_mut() {
        *b = ctx.coin_table_inv[ctx.cbox_inv[INV_SBOX[*b as usize] as usize] as usize];
    }
    Ok(())
}

// ============================================================================
// Butterfly family
// ============================================================================

pub fn butterfly_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    for b in buf.iter_mut() {
        *b = swap_nibbles(*b);
    }
    Ok(())
}

/// Swap nibbles of odd-index bytes only.
pub fn nibble_interleaver_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    for b in buf.iter_mut().skip(1).step_by(2) {
        *b = swap_nibbles(*b);
    }
    Ok(())
}

/// Stream-gated nibble swap per byte. Shared by both directions.
pub fn nibble_swap_shuffle_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        if r.next(2) == 1 {
            *b = swap_nibbles(*b);
        }
    }
    Ok(())
}

/// `swap(b) ^ mask`
pub fn butterfly_with_mask_fwd_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b = swap_nibbles(*b) ^ r.next_mask();
    }
    Ok(())
}

pub fn butterfly_with_mask_inv_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b = swap_nibbles(*b ^ r.next_mask());
    }
    Ok(())
}

/// `S[swap(b)]`
pub fn butterfly_with_sbox_fwd_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    for b in buf.iter_mut() {
        *b = SBOX[swap_nibbles(*b) as usize];
    }
    Ok(())
}

pub fn butterfly_with_sbox_inv_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    for b in buf.iter_mut() {
        *b = swap_nibbles(INV_SBOX[*b as usize]);
    }
    Ok(())
}

/// Rotate each byte left by a stream-drawn 1..=7.
pub fn butterfly_with_rotation_fwd_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b = b.rotate_left(r.next_range(1, 8) as u32);
    }
    Ok(())
}

pub fn butterfly_with_rotation_inv_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b = b.rotate_right(r.next_range(1, 8) as u32);
    }
    Ok(())
}

// ============================================================================
// Permutation family
// ============================================================================

#[inline]
fn get_bit(buf: &[u8], i: usize) -> u8 {
    (buf[i / 8] >> (i % 8)) & 1
}

#[inline]
fn set_bit(buf: &mut [u8], i: usize, v: u8) {
    let mask = 1u8 << (i % 8);
    if v != 0 {
        buf[i / 8] |= mask;
    } else {
        buf[i / 8] &= !mask;
    }
}

#[inline]
fn swap_bits(buf: &mut [u8], a: usize, b: usize) {
    let (va, vb) = (get_bit(buf, a), get_bit(buf, b));
    set_bit(buf, a, vb);
    set_bit(buf, b, va);
}

/// Seeded Fisher–Yates over all bits of the buffer.
pub fn shuffle_bits_fwd_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    let total = buf.len() * 8;
    for i in (1..total).rev() {
        let j = r.next(i as i32 + 1) as usize;
        swap_bits(buf, i, j);
    }
    Ok(())
}

/// Replays the forward swap schedule in reverse.
pub fn shuffle_bits_inv_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    let total = buf.len() * 8;
    let mut swaps = Vec::with_capacity(total.saturating_sub(1));
    for i in (1..total).rev() {
        swaps.push((i, r.next(i as i32 + 1) as usize));
    }
    for &(i, j) in swaps.iter().rev() {
        swap_bits(buf, i, j);
    }
    Ok(())
}

#[inline]
fn get_nibble(buf: &[u8], i: usize) -> u8 {
    let b = buf[i / 2];
    if i % 2 == 0 {
        b >> 4
    } else {
        b & 0x0F
    }
}

#[inline]
fn set_nibble(buf: &mut [u8], i: usize, v: u8) {
    let b = &mut buf[i / 2];
    if i % 2 == 0 {
        *b = (*b & 0x0F) | (v << 4);
    } else {
        *b = (*b & 0xF0) | (v & 0x0F);
    }
}

#[inline]
fn swap_nibble_positions(buf: &mut [u8], a: usize, b: usize) {
    let (va, vb) = (get_nibble(buf, a), get_nibble(buf, b));
    set_nibble(buf, a, vb);
    set_nibble(buf, b, va);
}

/// Seeded Fisher–Yates over all nibbles.
pub fn shuffle_nibbles_fwd_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    let total = buf.len() * 2;
    for i in (1..total).rev() {
        let j = r.next(i as i32 + 1) as usize;
        swap_nibble_positions(buf, i, j);
    }
    Ok(())
}

pub fn shuffle_nibbles_inv_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    let total = buf.len() * 2;
    let mut swaps = Vec::with_capacity(total.saturating_sub(1));
    for i in (1..total).rev() {
        swaps.push((i, r.next(i as i32 + 1) as usize));
    }
    for &(i, j) in swaps.iter().rev() {
        swap_nibble_positions(buf, i, j);
    }
    Ok(())
}

/// Seeded Fisher–Yates over bytes.
pub fn shuffle_bytes_fwd_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for i in (1..buf.len()).rev() {
        let j = r.next(i as i32 + 1) as usize;
        buf.swap(i, j);
    }
    Ok(())
}

pub fn shuffle_bytes_inv_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    let mut swaps = Vec::with_capacity(buf.len().saturating_sub(1));
    for i in (1..buf.len()).rev() {
        swaps.push((i, r.next(i as i32 + 1) as usize));
    }
    for &(i, j) in swaps.iter().rev() {
        buf.swap(i, j);
    }
    Ok(())
}

/// Seeded Fisher–Yates over whole 4-byte blocks. A trailing partial block
/// stays put.
pub fn micro_block_shuffler_fwd_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    let blocks = buf.len() / 4;
    for i in (1..blocks).rev() {
        let j = r.next(i as i32 + 1) as usize;
        for k in 0..4 {
            buf.swap(i * 4 + k, j * 4 + k);
        }
    }
    Ok(())
}

pub fn micro_block_shuffler_inv_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    let blocks = buf.len() / 4;
    let mut swaps = Vec::with_capacity(blocks.saturating_sub(1));
    for i in (1..blocks).rev() {
        swaps.push((i, r.next(i as i32 + 1) as usize));
    }
    for &(i, j) in swaps.iter().rev() {
        for k in 0..4 {
            buf.swap(i * 4 + k, j * 4 + k);
        }
    }
    Ok(())
}

/// Rotate every 4-byte block left one byte. Length must divide by 4.
pub fn micro_block_swap_fwd_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    require_multiple(buf.len(), 4)?;
    for block in buf.chunks_exact_mut(4) {
        block.rotate_left(1);
    }
    Ok(())
}

pub fn micro_block_swap_inv_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    require_multiple(buf.len(), 4)?;
    for block in buf.chunks_exact_mut(4) {
        block.rotate_right(1);
    }
    Ok(())
}

// ============================================================================
// Arithmetic family
// ============================================================================

/// Modular add of a bounded draw per byte.
pub fn frequency_equalizer_fwd_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b = b.wrapping_add(r.next(256) as u8);
    }
    Ok(())
}

pub fn frequency_equalizer_inv_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b = b.wrapping_sub(r.next(256) as u8);
    }
    Ok(())
}

/// Modular add of the mask stream.
pub fn additive_scatter_fwd_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b = b.wrapping_add(r.next_mask());
    }
    Ok(())
}

pub fn additive_scatter_inv_tx(
    ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    coin: u8,
) -> Result<(), TransformError> {
    let mut r = rng(ctx, coin);
    for b in buf.iter_mut() {
        *b = b.wrapping_sub(r.next_mask());
    }
    Ok(())
}

// ============================================================================
// AES steps (16-byte column-major states)
// ============================================================================

/// AES ShiftRows over 16-byte column-major states.
pub fn aes_shift_rows_fwd_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    require_multiple(buf.len(), 16)?;
    for block in buf.chunks_exact_mut(16) {
        let mut tmp = [0u8; 16];
        tmp.copy_from_slice(block);
        for r in 0..4 {
            for c in 0..4 {
                block[r + 4 * c] = tmp[r + 4 * ((c + r) % 4)];
            }
        }
    }
    Ok(())
}

pub fn aes_shift_rows_inv_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    require_multiple(buf.len(), 16)?;
    for block in buf.chunks_exact_mut(16) {
        let mut tmp = [0u8; 16];
        tmp.copy_from_slice(block);
        for r in 0..4 {
            for c in 0..4 {
                block[r + 4 * c] = tmp[r + 4 * ((c + 4 - r) % 4)];
            }
        }
    }
    Ok(())
}

/// AES SubBytes. Unlike the plain pair, this one is alignment-checked.
pub fn aes_sub_bytes_fwd_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    require_multiple(buf.len(), 16)?;
    for b in buf.iter_mut() {
        *b = SBOX[*b as usize];
    }
    Ok(())
}

pub fn aes_sub_bytes_inv_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    require_multiple(buf.len(), 16)?;
    for b in buf.iter_mut() {
        *b = INV_SBOX[*b as usize];
    }
    Ok(())
}

/// AES MixColumns per 4-byte column.
pub fn aes_mix_columns_fwd_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    require_multiple(buf.len(), 16)?;
    for col in buf.chunks_exact_mut(4) {
        let (a0, a1, a2, a3) = (col[0], col[1], col[2], col[3]);
        col[0] = gmul(a0, 2) ^ gmul(a1, 3) ^ a2 ^ a3;
        col[1] = a0 ^ gmul(a1, 2) ^ gmul(a2, 3) ^ a3;
        col[2] = a0 ^ a1 ^ gmul(a2, 2) ^ gmul(a3, 3);
        col[3] = gmul(a0, 3) ^ a1 ^ a2 ^ gmul(a3, 2);
    }
    Ok(())
}

pub fn aes_mix_columns_inv_tx(
    _ctx: &TransformCtx<'_>,
    buf: &mut [u8],
    _coin: u8,
) -> Result<(), TransformError> {
    require_multiple(buf.len(), 16)?;
    for col in buf.chunks_exact_mut(4) {
        let (a0, a1, a2, a3) = (col[0], col[1], col[2], col[3]);
        col[0] = gmul(a0, 14) ^ gmul(a1, 11) ^ gmul(a2, 13) ^ gmul(a3, 9);
        col[1] = gmul(a0, 9) ^ gmul(a1, 14) ^ gmul(a2, 11) ^ gmul(a3, 13);
        col[2] = gmul(a0, 13) ^ gmul(a1, 9) ^ gmul(a2, 14) ^ gmul(a3, 11);
        col[3] = gmul(a0, 11) ^ gmul(a1, 13) ^ gmul(a2, 9) ^ gmul(a3, 14);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keying::{identity_table, invert_permutation, permutation_from_digest};

    fn test_ctx() -> TransformCtx<'static> {
        // Leaked fixed tables keep the ctx 'static for test convenience.
        let cbox = Box::leak(Box::new(permutation_from_digest(&[7u8; 32])));
        let cbox_inv = Box::leak(Box::new(invert_permutation(cbox)));
        let ct = Box::leak(Box::new(permutation_from_digest(&[42u8; 32])));
        let ct_inv = Box::leak(Box::new(invert_permutation(ct)));
        TransformCtx { cbox, cbox_inv, coin_table: ct, coin_table_inv: ct_inv }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(37).wrapping_add(11)).collect()
    }

    #[test]
    fn feedback_cascade_round_trips() {
        let ctx = test_ctx();
        let original = sample(129);
        let mut buf = original.clone();
        masked_cascade_sub_fb_fwd_tx(&ctx, &mut buf, 0x2f).unwrap();
        assert_ne!(buf, original);
        masked_cascade_sub_fb_inv_tx(&ctx, &mut buf, 0x2f).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn bit_shuffle_round_trips_and_permutes() {
        let ctx = test_ctx();
        let original = sample(64);
        let mut buf = original.clone();
        shuffle_bits_fwd_tx(&ctx, &mut buf, 9).unwrap();
        assert_ne!(buf, original);
        // Bit population is preserved by a pure permutation.
        let ones = |v: &[u8]| v.iter().map(|b| b.count_ones()).sum::<u32>();
        assert_eq!(ones(&buf), ones(&original));
        shuffle_bits_inv_tx(&ctx, &mut buf, 9).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn aes_steps_round_trip_on_aligned_input() {
        let ctx = test_ctx();
        let original = sample(48);
        let mut buf = original.clone();
        aes_shift_rows_fwd_tx(&ctx, &mut buf, 0).unwrap();
        aes_mix_columns_fwd_tx(&ctx, &mut buf, 0).unwrap();
        aes_sub_bytes_fwd_tx(&ctx, &mut buf, 0).unwrap();
        aes_sub_bytes_inv_tx(&ctx, &mut buf, 0).unwrap();
        aes_mix_columns_inv_tx(&ctx, &mut buf, 0).unwrap();
        aes_shift_rows_inv_tx(&ctx, &mut buf, 0).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn aes_steps_reject_unaligned_input() {
        let ctx = test_ctx();
        let mut buf = sample(15);
        assert!(matches!(
            aes_shift_rows_fwd_tx(&ctx, &mut buf, 0),
            Err(TransformError::BlockAlignment { required: 16, len: 15 })
        ));
    }

    #[test]
    fn micro_block_swap_rejects_unaligned_input() {
        let ctx = test_ctx();
        let mut buf = sample(6);
        assert!(matches!(
            micro_block_swap_fwd_tx(&ctx, &mut buf, 0),
            Err(TransformError::BlockAlignment { required: 4, len: 6 })
        ));
    }

    #[test]
    fn chunked_fb_is_an_involution_across_chunk_boundaries() {
        let ctx = test_ctx();
        let original = sample(600); // spans three 256-byte chunks
        let mut buf = original.clone();
        chunked_fb_tx(&ctx, &mut buf, 200).unwrap();
        assert_ne!(buf, original);
        chunked_fb_tx(&ctx, &mut buf, 200).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn identity_cbox_still_masks() {
        // A degenerate identity table must not neutralize the stream.
        let id = Box::leak(Box::new(identity_table()));
        let ctx = TransformCtx { cbox: id, cbox_inv: id, coin_table: id, coin_table_inv: id };
        let original = sample(32);
        let mut buf = original.clone();
        xor_tx(&ctx, &mut buf, 5).unwrap();
        assert_ne!(buf, original);
    }
}
