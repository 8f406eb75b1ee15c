//! Transform registry
//!
//! The catalog of all 50 transforms: dense ids starting at 1, explicit
//! inverse pairing, and a coin preference per transform. Coin preferences are
//! assigned by insertion order (0, 1, 2, …) with forward+inverse sharing one
//! preference, so the engine's coin selection lines up between encrypt and
//! decrypt no matter which direction a sequence is walked.
//!
//! The registry is represented as a flat array indexed by `id − 1` and is
//! validated at construction: a broken id sequence, a dangling inverse or a
//! coin-preference mismatch refuses to build rather than producing packets
//! that cannot be decrypted.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use crate::transforms::{self, TransformFn};

/// One catalog entry.
#[derive(Debug)]
pub struct TransformInfo {
    pub id: u8,
    pub name: &'static str,
    pub inverse_id: u8,
    pub coin_preference: u8,
    pub exclude_from_permutations: bool,
    pub apply: TransformFn,
}

/// Registry construction/lookup failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("transform id sequence broken at position {position}: expected {expected}, got {got}")]
    BrokenIdSequence { position: usize, expected: u8, got: u8 },
    #[error("transform {id} names inverse {inverse_id}, which is not registered")]
    MissingInverse { id: u8, inverse_id: u8 },
    #[error("transform {id} and its inverse {inverse_id} do not reference each other")]
    InverseMismatch { id: u8, inverse_id: u8 },
    #[error("transform {id} and inverse {inverse_id} disagree on coin preference")]
    CoinPreferenceMismatch { id: u8, inverse_id: u8 },
    #[error("unknown transform id {0}")]
    UnknownId(u8),
}

/// The dense transform catalog.
#[derive(Debug)]
pub struct TransformRegistry {
    entries: Vec<TransformInfo>,
}

struct Builder {
    entries: Vec<TransformInfo>,
    next_preference: u8,
}

impl Builder {
    fn new() -> Self {
        Self { entries: Vec::with_capacity(50), next_preference: 0 }
    }

    fn take_preference(&mut self) -> u8 {
        let p = self.next_preference;
        self.next_preference += 1;
        p
    }

    /// Register a transform that is its own inverse.
    fn self_inverse(&mut self, name: &'static str, apply: TransformFn, exclude: bool) {
        let id = self.entries.len() as u8 + 1;
        let coin_preference = self.take_preference();
        self.entries.push(TransformInfo {
            id,
            name,
            inverse_id: id,
            coin_preference,
            exclude_from_permutations: exclude,
            apply,
        });
    }

    /// Register a forward/inverse pair under one shared coin preference.
    fn pair(
        &mut self,
        fwd_name: &'static str,
        fwd: TransformFn,
        inv_name: &'static str,
        inv: TransformFn,
    ) {
        let fwd_id = self.entries.len() as u8 + 1;
        let inv_id = fwd_id + 1;
        let coin_preference = self.take_preference();
        self.entries.push(TransformInfo {
            id: fwd_id,
            name: fwd_name,
            inverse_id: inv_id,
            coin_preference,
            exclude_from_permutations: false,
            apply: fwd,
        });
        self.entries.push(TransformInfo {
            id: inv_id,
            name: inv_name,
            inverse_id: fwd_id,
            coin_preference,
            exclude_from_permutations: false,
            apply: inv,
        });
    }
}

impl TransformRegistry {
    /// Build and validate the standard 50-entry catalog.
    pub fn standard() -> Result<Self, RegistryError> {
        let mut b = Builder::new();

        b.self_inverse("XorTx", transforms::xor_tx, false); // 1
        b.self_inverse("BitRandFlipTx", transforms::bit_rand_flip_tx, false); // 2
        b.self_inverse("PassthroughTx", transforms::passthrough_tx, true); // 3
        b.pair(
            "ShuffleBitsFwdTx",
            transforms::shuffle_bits_fwd_tx,
            "ShuffleBitsInvTx",
            transforms::shuffle_bits_inv_tx,
        ); // 4/5
        b.pair(
            "MaskedDoubleSubFwdTx",
            transforms::masked_double_sub_fwd_tx,
            "MaskedDoubleSubInvTx",
            transforms::masked_double_sub_inv_tx,
        ); // 6/7
        b.self_inverse("ButterflyTx", transforms::butterfly_tx, false); // 8
        b.pair(
            "SubBytesXorMaskFwdTx",
            transforms::sub_bytes_xor_mask_fwd_tx,
            "SubBytesXorMaskInvTx",
            transforms::sub_bytes_xor_mask_inv_tx,
        ); // 9/10
        b.pair(
            "SubBytesFwdTx",
            transforms::sub_bytes_fwd_tx,
            "SubBytesInvTx",
            transforms::sub_bytes_inv_tx,
        ); // 11/12
        b.pair(
            "NibbleSwapShuffleFwdTx",
            transforms::nibble_swap_shuffle_tx,
            "NibbleSwapShuffleInvTx",
            transforms::nibble_swap_shuffle_tx,
        ); // 13/14 — stream-gated involution, identical bodies
        b.self_inverse("ApplyMaskBasedMixingTx", transforms::apply_mask_based_mixing_tx, false); // 15
        b.pair(
            "MaskBasedSBoxFwdTx",
            transforms::mask_based_sbox_tx,
            "MaskBasedSBoxInvTx",
            transforms::mask_based_sbox_tx,
        ); // 16/17 — identical bodies, XOR self-cancels
        b.pair(
            "ShuffleNibblesFwdTx",
            transforms::shuffle_nibbles_fwd_tx,
            "ShuffleNibblesInvTx",
            transforms::shuffle_nibbles_inv_tx,
        ); // 18/19
        b.pair(
            "ShuffleBytesFwdTx",
            transforms::shuffle_bytes_fwd_tx,
            "ShuffleBytesInvTx",
            transforms::shuffle_bytes_inv_tx,
        ); // 20/21
        b.self_inverse("BitFlipCascadeTx", transforms::bit_flip_cascade_tx, false); // 22
        b.self_inverse("SlidingMaskOverlayTx", transforms::sliding_mask_overlay_tx, false); // 23
        b.pair(
            "FrequencyEqualizerFwdTx",
            transforms::frequency_equalizer_fwd_tx,
            "FrequencyEqualizerInvTx",
            transforms::frequency_equalizer_inv_tx,
        ); // 24/25
        b.pair(
            "MicroBlockShufflerFwdTx",
            transforms::micro_block_shuffler_fwd_tx,
            "MicroBlockShufflerInvTx",
            transforms::micro_block_shuffler_inv_tx,
        ); // 26/27
        b.self_inverse("PatternEqualizerTx", transforms::pattern_equalizer_tx, false); // 28
        b.pair(
            "ButterflyWithMaskFwdTx",
            transforms::butterfly_with_mask_fwd_tx,
            "ButterflyWithMaskInvTx",
            transforms::butterfly_with_mask_inv_tx,
        ); // 29/30
        b.pair(
            "ButterflyWithSboxFwdTx",
            transforms::butterfly_with_sbox_fwd_tx,
            "ButterflyWithSboxInvTx",
            transforms::butterfly_with_sbox_inv_tx,
        ); // 31/32
        b.pair(
            "ButterflyWithRotationFwdTx",
            transforms::butterfly_with_rotation_fwd_tx,
            "ButterflyWithRotationInvTx",
            transforms::butterfly_with_rotation_inv_tx,
        ); // 33/34
        b.pair(
            "MaskedCascadeSubFbFwdTx",
            transforms::masked_cascade_sub_fb_fwd_tx,
            "MaskedCascadeSubFbInvTx",
            transforms::masked_cascade_sub_fb_inv_tx,
        ); // 35/36
        b.pair(
            "MicroBlockSwapFwdTx",
            transforms::micro_block_swap_fwd_tx,
            "MicroBlockSwapInvTx",
            transforms::micro_block_swap_inv_tx,
        ); // 37/38
        b.self_inverse("NibbleInterleaverTx", transforms::nibble_interleaver_tx, false); // 39
        b.self_inverse("ChunkedFbTx", transforms::chunked_fb_tx, false); // 40
        b.pair(
            "AesShiftRowsFwdTx",
            transforms::aes_shift_rows_fwd_tx,
            "AesShiftRowsInvTx",
            transforms::aes_shift_rows_inv_tx,
        ); // 41/42
        b.pair(
            "AesSubBytesFwdTx",
            transforms::aes_sub_bytes_fwd_tx,
            "AesSubBytesInvTx",
            transforms::aes_sub_bytes_inv_tx,
        ); // 43/44
        b.pair(
            "AesMixColumnsFwdTx",
            transforms::aes_mix_columns_fwd_tx,
            "AesMixColumnsInvTx",
            transforms::aes_mix_columns_inv_tx,
        ); // 45/46
        b.pair(
            "CascadeSub3xFwdTx",
            transforms::cascade_sub_3x_fwd_tx,
            "CascadeSub3xInvTx",
            transforms::cascade_sub_3x_inv_tx,
        ); // 47/48
        b.pair(
            "AdditiveScatterFwdTx",
            transforms::additive_scatter_fwd_tx,
            "AdditiveScatterInvTx",
            transforms::additive_scatter_inv_tx,
        ); // 49/50

        let registry = Self { entries: b.entries };
        registry.validate()?;
        Ok(registry)
    }

    /// Number of registered transforms (also the maximum valid id).
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a transform by id.
    pub fn get(&self, id: u8) -> Result<&TransformInfo, RegistryError> {
        if id == 0 {
            return Err(RegistryError::UnknownId(id));
        }
        self.entries.get(id as usize - 1).ok_or(RegistryError::UnknownId(id))
    }

    /// True when `id` exists in the catalog.
    #[inline]
    pub fn contains(&self, id: u8) -> bool {
        id >= 1 && (id as usize) <= self.entries.len()
    }

    /// Iterate the catalog in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TransformInfo> {
        self.entries.iter()
    }

    /// Check density, inverse pairing and coin-preference sharing.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for (position, info) in self.entries.iter().enumerate() {
            let expected = position as u8 + 1;
            if info.id != expected {
                return Err(RegistryError::BrokenIdSequence {
                    position,
                    expected,
                    got: info.id,
                });
            }
        }
        for info in &self.entries {
            let inverse = self
                .entries
                .get(info.inverse_id as usize - 1)
                .ok_or(RegistryError::MissingInverse { id: info.id, inverse_id: info.inverse_id })?;
            if inverse.inverse_id != info.id {
                return Err(RegistryError::InverseMismatch {
                    id: info.id,
                    inverse_id: info.inverse_id,
                });
            }
            if inverse.coin_preference != info.coin_preference {
                return Err(RegistryError::CoinPreferenceMismatch {
                    id: info.id,
                    inverse_id: info.inverse_id,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keying::{invert_permutation, permutation_from_digest};
    use crate::transforms::TransformCtx;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn standard_registry_validates() {
        let reg = TransformRegistry::standard().unwrap();
        assert_eq!(reg.len(), 50);
        assert!(reg.get(0).is_err());
        assert!(reg.get(51).is_err());
        assert_eq!(reg.get(35).unwrap().name, "MaskedCascadeSubFbFwdTx");
    }

    #[test]
    fn coin_preferences_follow_insertion_order() {
        let reg = TransformRegistry::standard().unwrap();
        assert_eq!(reg.get(1).unwrap().coin_preference, 0);
        assert_eq!(reg.get(2).unwrap().coin_preference, 1);
        assert_eq!(reg.get(3).unwrap().coin_preference, 2);
        // Pairs share one preference and the counter keeps climbing.
        assert_eq!(reg.get(4).unwrap().coin_preference, 3);
        assert_eq!(reg.get(5).unwrap().coin_preference, 3);
        assert_eq!(reg.get(49).unwrap().coin_preference, 29);
        assert_eq!(reg.get(50).unwrap().coin_preference, 29);
    }

    #[test]
    fn only_passthrough_is_excluded() {
        let reg = TransformRegistry::standard().unwrap();
        let excluded: Vec<u8> =
            reg.iter().filter(|t| t.exclude_from_permutations).map(|t| t.id).collect();
        assert_eq!(excluded, vec![3]);
    }

    /// The inverse law over the whole catalog: forward then inverse (or a
    /// self-inverse applied twice) restores any buffer, given the same coin
    /// and the same active tables.
    #[test]
    fn every_transform_round_trips() {
        let reg = TransformRegistry::standard().unwrap();
        let cbox = permutation_from_digest(&[0x11u8; 32]);
        let cbox_inv = invert_permutation(&cbox);
        let ct = permutation_from_digest(&[0x77u8; 32]);
        let ct_inv = invert_permutation(&ct);
        let ctx = TransformCtx {
            cbox: &cbox,
            cbox_inv: &cbox_inv,
            coin_table: &ct,
            coin_table_inv: &ct_inv,
        };

        let mut rng = StdRng::seed_from_u64(0xB0B0);
        // 16-aligned so alignment-demanding transforms are exercised too.
        for len in [16usize, 48, 256] {
            let original: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            for info in reg.iter() {
                let inverse = reg.get(info.inverse_id).unwrap();
                for coin in [0u8, 1, 77, 255] {
                    let mut buf = original.clone();
                    (info.apply)(&ctx, &mut buf, coin).unwrap();
                    (inverse.apply)(&ctx, &mut buf, coin).unwrap();
                    assert_eq!(
                        buf, original,
                        "transform {} (inverse {}) failed round trip at len {len} coin {coin}",
                        info.name, inverse.name
                    );
                }
            }
        }
    }
}
