//! Public cipher surface
//!
//! A [`MangoSession`] owns one CoinTable (immutable for its lifetime), a
//! mutable slot for the per-message CBox, and the raw bytes of the last
//! packed header. Encrypt and Decrypt are whole-message operations producing
//! self-describing packets:
//!
//! ```text
//! [ encrypted header part 1 | encrypted header part 2 | encrypted body ]
//! ```
//!
//! The block-mode entry points reuse the cached header metadata without
//! emitting or consuming a header, which is what lets a caller continue a
//! stream of equally keyed blocks after one whole-message operation.
//!
//! Sessions are single-threaded by design: the active-CBox slot, the
//! per-message CBox and the cached header are shared mutable state, so
//! concurrent use of one session is not supported — run one session per
//! thread instead.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use tracing::debug;

use crate::engine::{self, EngineError};
use crate::header::{self, HeaderError, HeaderFields};
use crate::keying::{
    coins_for, message_hash, ActiveSlot, CBox, CoinTable, KeyingError, SALT_LEN,
};
use crate::profiles::InputProfile;
use crate::registry::{RegistryError, TransformRegistry};
use crate::transforms::TransformCtx;
use crate::{VERSION_MAJOR, VERSION_MINOR};

/// Unified error surface of the cipher API. Every failure is fatal to the
/// operation in flight; nothing partial is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum MangoError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("packet requires library version {required} or later")]
    Version { required: u8 },
    #[error("state error: {0}")]
    State(&'static str),
    #[error("format error: {0}")]
    Format(String),
    #[error(transparent)]
    Keying(#[from] KeyingError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Header(#[from] HeaderError),
}

/// Session construction inputs.
#[derive(Clone)]
pub struct MangoOptions {
    pub password: Vec<u8>,
    pub zone: Vec<u8>,
    pub salt: Vec<u8>,
    pub iterations: u32,
    pub rfc2898: bool,
}

impl MangoOptions {
    /// Options with the default iteration count and PBKDF2 enabled.
    pub fn new(password: impl Into<Vec<u8>>, salt: impl Into<Vec<u8>>) -> Self {
        Self {
            password: password.into(),
            zone: Vec::new(),
            salt: salt.into(),
            iterations: crate::keying::DEFAULT_ITERATIONS,
            rfc2898: true,
        }
    }

    /// Attach a zone label as the second derivation factor.
    pub fn zone(mut self, zone: impl Into<Vec<u8>>) -> Self {
        self.zone = zone.into();
        self
    }

    /// Override the PBKDF2 iteration count.
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Toggle PBKDF2 derivation (raw password ‖ zone when disabled).
    pub fn rfc2898(mut self, enabled: bool) -> Self {
        self.rfc2898 = enabled;
        self
    }
}

/// One cipher session: CoinTable, active-CBox slot, cached header metadata.
#[derive(Debug)]
pub struct MangoSession {
    registry: TransformRegistry,
    coin_table: CoinTable,
    salt: [u8; SALT_LEN],
    message_box: Option<CBox>,
    active: ActiveSlot,
    last_header: Option<Vec<u8>>,
}

impl MangoSession {
    /// Build a session. Validates the salt length and derives the CoinTable.
    pub fn new(options: MangoOptions) -> Result<Self, MangoError> {
        if options.salt.len() != SALT_LEN {
            return Err(MangoError::Config(format!(
                "salt must be {SALT_LEN} bytes (got {})",
                options.salt.len()
            )));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&options.salt);

        let registry = TransformRegistry::standard()?;
        let coin_table = CoinTable::derive(
            &options.password,
            &options.zone,
            &salt,
            options.iterations,
            options.rfc2898,
        )?;
        Ok(Self {
            registry,
            coin_table,
            salt,
            message_box: None,
            active: ActiveSlot::Message,
            last_header: None,
        })
    }

    /// Transform tables for the current active slot.
    fn ctx(&self) -> Result<TransformCtx<'_>, MangoError> {
        let (cbox, cbox_inv) = match self.active {
            ActiveSlot::CoinTable => (&self.coin_table.forward, &self.coin_table.inverse),
            ActiveSlot::Message => {
                let mb = self
                    .message_box
                    .as_ref()
                    .ok_or(MangoError::State("no per-message CBox has been derived"))?;
                (&mb.forward, &mb.inverse)
            }
        };
        Ok(TransformCtx {
            cbox,
            cbox_inv,
            coin_table: &self.coin_table.forward,
            coin_table_inv: &self.coin_table.inverse,
        })
    }

    /// Run `f` with the given slot active, restoring the previous selection
    /// on every exit path.
    fn with_active<T>(
        &mut self,
        slot: ActiveSlot,
        f: impl FnOnce(&mut Self) -> Result<T, MangoError>,
    ) -> Result<T, MangoError> {
        let saved = self.active;
        self.active = slot;
        let out = f(self);
        self.active = saved;
        out
    }

    /// The version gate: every id a packet references must exist in this
    /// registry, otherwise report the library version that would carry it.
    fn check_sequence(&self, sequence: &[(u8, u8)]) -> Result<(), MangoError> {
        if sequence.is_empty() {
            return Err(MangoError::Config("transform sequence is empty".into()));
        }
        let max_id = sequence.iter().map(|&(id, _)| id).max().unwrap_or(0);
        if max_id as usize > self.registry.len() {
            return Err(MangoError::Version { required: max_id - 40 + 1 });
        }
        Ok(())
    }

    /// Encrypt a whole message under `profile`.
    pub fn encrypt(
        &mut self,
        profile: &InputProfile,
        input: &[u8],
    ) -> Result<Vec<u8>, MangoError> {
        self.check_sequence(&profile.sequence)?;

        let hash = message_hash(input, &self.coin_table);
        self.message_box = Some(CBox::from_hash(&hash));
        let coins = coins_for(&hash, &self.salt);

        let body = self.with_active(ActiveSlot::Message, |s| {
            let ctx = s.ctx()?;
            engine::apply_forward(
                &s.registry,
                &ctx,
                &profile.sequence,
                profile.global_rounds,
                input,
                &coins,
            )
            .map_err(MangoError::from)
        })?;

        let clear = header::pack(
            (VERSION_MAJOR, VERSION_MINOR),
            &hash,
            &self.salt,
            profile.global_rounds,
            &profile.sequence,
        );
        self.last_header = Some(clear.clone());

        let encrypted_header = self.with_active(ActiveSlot::CoinTable, |s| {
            let ctx = s.ctx()?;
            header::encrypt(&s.registry, &ctx, &s.coin_table, &clear).map_err(MangoError::from)
        })?;

        debug!(
            plaintext = input.len(),
            header = encrypted_header.len(),
            body = body.len(),
            profile = %profile.name,
            "encrypted"
        );
        let mut out = encrypted_header;
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decrypt a whole packet using only the metadata in its header.
    pub fn decrypt(&mut self, input: &[u8]) -> Result<Vec<u8>, MangoError> {
        let (clear, _) = self.decrypt_header(input)?;
        let fields = header::parse(&clear)?;
        self.check_sequence(&fields.sequence)?;

        let reversed = engine::reverse_sequence(&self.registry, &fields.sequence)?;
        let profile = InputProfile {
            name: "packet".to_string(),
            sequence: reversed,
            global_rounds: fields.global_rounds,
            aggregate_score: 0.0,
        };
        self.decrypt_with_profile(&profile, input)
    }

    /// Decrypt with an explicit profile whose sequence is already the
    /// reversed, inverse-mapped form (as produced by [`Self::decrypt`] from
    /// the packet header).
    pub fn decrypt_with_profile(
        &mut self,
        profile: &InputProfile,
        input: &[u8],
    ) -> Result<Vec<u8>, MangoError> {
        self.check_sequence(&profile.sequence)?;

        let (clear, consumed) = self.decrypt_header(input)?;
        let fields = header::parse(&clear)?;
        self.check_sequence(&fields.sequence)?;
        self.last_header = Some(clear);

        let body = &input[consumed..];
        if body.is_empty() {
            return Err(MangoError::Format("packet has no encrypted body".into()));
        }

        self.message_box = Some(CBox::from_hash(&fields.hash));
        let coins = coins_for(&fields.hash, &fields.salt);

        let out = self.with_active(ActiveSlot::Message, |s| {
            let ctx = s.ctx()?;
            engine::apply_reverse(
                &s.registry,
                &ctx,
                &profile.sequence,
                profile.global_rounds,
                body,
                &coins,
            )
            .map_err(MangoError::from)
        })?;
        debug!(packet = input.len(), plaintext = out.len(), "decrypted");
        Ok(out)
    }

    /// Encrypt a standalone block under the cached header metadata. No
    /// header is emitted; a whole-message Encrypt or Decrypt must have run
    /// first.
    pub fn encrypt_block(&mut self, block: &[u8]) -> Result<Vec<u8>, MangoError> {
        let fields = self.cached_fields()?;
        self.message_box = Some(CBox::from_hash(&fields.hash));
        let coins = coins_for(&fields.hash, &fields.salt);

        self.with_active(ActiveSlot::Message, |s| {
            let ctx = s.ctx()?;
            engine::apply_forward(
                &s.registry,
                &ctx,
                &fields.sequence,
                fields.global_rounds,
                block,
                &coins,
            )
            .map_err(MangoError::from)
        })
    }

    /// Decrypt a standalone block under the cached header metadata.
    pub fn decrypt_block(&mut self, block: &[u8]) -> Result<Vec<u8>, MangoError> {
        let fields = self.cached_fields()?;
        let reversed = engine::reverse_sequence(&self.registry, &fields.sequence)?;
        self.message_box = Some(CBox::from_hash(&fields.hash));
        let coins = coins_for(&fields.hash, &fields.salt);

        self.with_active(ActiveSlot::Message, |s| {
            let ctx = s.ctx()?;
            engine::apply_reverse(
                &s.registry,
                &ctx,
                &reversed,
                fields.global_rounds,
                block,
                &coins,
            )
            .map_err(MangoError::from)
        })
    }

    /// Decrypt only the header and return the raw, unpadded ciphertext body
    /// without reversing any transforms.
    pub fn get_payload_only(&mut self, input: &[u8]) -> Result<Vec<u8>, MangoError> {
        let (_, consumed) = self.decrypt_header(input)?;
        let body = &input[consumed..];
        let (&pad_byte, rest) = body
            .split_last()
            .ok_or_else(|| MangoError::Format("payload empty after extraction".into()))?;
        let pad = pad_byte as usize;
        if pad > rest.len() {
            return Err(MangoError::Format(format!(
                "invalid payload padding byte {pad_byte} for {} body bytes",
                body.len()
            )));
        }
        Ok(rest[..rest.len() - pad].to_vec())
    }

    /// Cleartext header bytes cached by the last whole-message operation.
    pub fn last_header(&self) -> Option<&[u8]> {
        self.last_header.as_deref()
    }

    fn cached_fields(&self) -> Result<HeaderFields, MangoError> {
        let clear = self
            .last_header
            .as_ref()
            .ok_or(MangoError::State("block mode requires a prior Encrypt or Decrypt"))?;
        Ok(header::parse(clear)?)
    }

    /// Decrypt the packet header under the CoinTable slot, restoring the
    /// active selection afterwards even on failure.
    fn decrypt_header(&mut self, input: &[u8]) -> Result<(Vec<u8>, usize), MangoError> {
        self.with_active(ActiveSlot::CoinTable, |s| {
            let ctx = s.ctx()?;
            header::decrypt(&s.registry, &ctx, &s.coin_table, input).map_err(MangoError::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keying::SALT_LEN;
    use crate::profiles::{builtin_profiles, perturb_key};

    const ZERO_SALT: [u8; SALT_LEN] = [0u8; SALT_LEN];

    fn session(password: &[u8]) -> MangoSession {
        MangoSession::new(MangoOptions::new(password, &ZERO_SALT).iterations(100_000)).unwrap()
    }

    fn combined_profile() -> InputProfile {
        InputProfile {
            name: "Combined".to_string(),
            sequence: vec![(8, 3), (10, 1), (31, 1), (9, 1), (31, 1)],
            global_rounds: 6,
            aggregate_score: 0.0,
        }
    }

    #[test]
    fn sixteen_byte_message_round_trips_at_exact_packet_size() {
        let mut s = session(b"sample-password");
        let plaintext: Vec<u8> = (0x00..0x10).collect();
        let packet = s.encrypt(&combined_profile(), &plaintext).unwrap();
        // header part 1 (48) + part 2 (17 for five entries) + body (17)
        assert_eq!(packet.len(), 82);
        assert_eq!(s.decrypt(&packet).unwrap(), plaintext);
    }

    #[test]
    fn empty_message_round_trips() {
        let mut s = session(b"sample-password");
        let packet = s.encrypt(&combined_profile(), b"").unwrap();
        assert_eq!(s.decrypt(&packet).unwrap(), b"");
    }

    #[test]
    fn fresh_session_recovers_from_packet_alone() {
        let plaintext = b"header self-containment means no shared state beyond the key";
        let packet = session(b"pw-one").encrypt(&combined_profile(), plaintext).unwrap();

        let mut fresh = session(b"pw-one");
        assert_eq!(fresh.decrypt(&packet).unwrap(), plaintext);
    }

    #[test]
    fn every_builtin_profile_round_trips() {
        let mut s = session(b"sample-password");
        let plaintext: Vec<u8> = (0..300u16).map(|i| (i * 7 % 256) as u8).collect();
        for profile in builtin_profiles() {
            let packet = s.encrypt(&profile, &plaintext).unwrap();
            assert_eq!(
                s.decrypt(&packet).unwrap(),
                plaintext,
                "profile {} failed round trip",
                profile.name
            );
        }
    }

    #[test]
    fn explicit_reversed_profile_matches_header_decrypt() {
        let mut s = session(b"sample-password");
        let plaintext = b"profile equivalence";
        let fwd = combined_profile();
        let packet = s.encrypt(&fwd, plaintext).unwrap();

        let via_header = s.decrypt(&packet).unwrap();

        let reversed = InputProfile {
            name: "reversed".to_string(),
            sequence: engine::reverse_sequence(&s.registry, &fwd.sequence).unwrap(),
            global_rounds: fwd.global_rounds,
            aggregate_score: 0.0,
        };
        let via_profile = s.decrypt_with_profile(&reversed, &packet).unwrap();
        assert_eq!(via_header, via_profile);
        assert_eq!(via_header, plaintext);
    }

    #[test]
    fn version_gate_reports_required_version() {
        let mut s = session(b"sample-password");
        let mut profile = combined_profile();
        profile.sequence.push((51, 1));
        match s.encrypt(&profile, b"x") {
            Err(MangoError::Version { required }) => assert_eq!(required, 12),
            other => panic!("expected version error, got {other:?}"),
        }

        // The gate also guards decrypt of a packet carrying a future id.
        let clear = header::pack(
            (VERSION_MAJOR, VERSION_MINOR),
            &[9u8; 32],
            &ZERO_SALT,
            6,
            &[(53, 1)],
        );
        let encrypted_header = s
            .with_active(ActiveSlot::CoinTable, |sess| {
                let ctx = sess.ctx()?;
                header::encrypt(&sess.registry, &ctx, &sess.coin_table, &clear)
                    .map_err(MangoError::from)
            })
            .unwrap();
        let mut packet = encrypted_header;
        packet.extend_from_slice(&[0u8; 17]);
        match s.decrypt(&packet) {
            Err(MangoError::Version { required }) => assert_eq!(required, 14),
            other => panic!("expected version error, got {other:?}"),
        }
    }

    #[test]
    fn block_mode_requires_cached_metadata_then_round_trips() {
        let mut s = session(b"sample-password");
        assert!(matches!(s.encrypt_block(b"block"), Err(MangoError::State(_))));
        assert!(matches!(s.decrypt_block(b"block"), Err(MangoError::State(_))));

        let packet = s.encrypt(&combined_profile(), b"prime the header cache").unwrap();
        let block = b"standalone block payload";
        let enc = s.encrypt_block(block).unwrap();
        assert_ne!(&enc[..block.len().min(enc.len())], block.as_slice());
        assert_eq!(s.decrypt_block(&enc).unwrap(), block);

        // Whole-message decrypt still works afterwards.
        assert_eq!(s.decrypt(&packet).unwrap(), b"prime the header cache");
    }

    #[test]
    fn payload_extraction_skips_transform_reversal() {
        let mut s = session(b"sample-password");
        let plaintext = [0x42u8; 40];
        let packet = s.encrypt(&combined_profile(), &plaintext).unwrap();
        let payload = s.get_payload_only(&packet).unwrap();
        // Pad bytes and the trailing count are stripped; the transforms are not reversed.
        assert_eq!(payload.len(), 40);
        assert_ne!(payload, plaintext);
    }

    #[test]
    fn one_bit_password_change_flips_about_half_the_payload_bits() {
        let plaintext: Vec<u8> = (0..=255).collect();
        let profile = InputProfile {
            name: "KeyDep".to_string(),
            sequence: vec![(35, 3), (4, 1), (9, 2), (23, 1), (47, 1)],
            global_rounds: 6,
            aggregate_score: 0.0,
        };

        let mut a = session(b"sample-password");
        let mut b = session(&perturb_key(b"sample-password"));
        let pa = a.encrypt(&profile, &plaintext).unwrap();
        let pb = b.encrypt(&profile, &plaintext).unwrap();
        let payload_a = a.get_payload_only(&pa).unwrap();
        let payload_b = b.get_payload_only(&pb).unwrap();
        assert_eq!(payload_a.len(), payload_b.len());

        let diff: u32 = payload_a
            .iter()
            .zip(&payload_b)
            .map(|(x, y)| (x ^ y).count_ones())
            .sum();
        let percent = diff as f64 / (payload_a.len() as f64 * 8.0) * 100.0;
        assert!(
            (45.0..=55.0).contains(&percent),
            "key dependency out of band: {percent:.2}%"
        );
    }

    #[test]
    fn short_or_corrupt_packets_fail_loudly() {
        let mut s = session(b"sample-password");
        assert!(matches!(
            s.decrypt(&[0u8; 30]),
            Err(MangoError::Header(HeaderError::TooShort(30)))
        ));

        let packet = s.encrypt(&combined_profile(), b"corruptible").unwrap();
        // Drop the body entirely: the header parses but nothing follows.
        let header_len = packet.len() - engine::padded_output_len(11);
        assert!(matches!(
            s.decrypt(&packet[..header_len]),
            Err(MangoError::Format(_))
        ));
    }

    #[test]
    fn wrong_salt_length_is_a_configuration_error() {
        let err = MangoSession::new(MangoOptions::new(b"pw".as_slice(), vec![0u8; 8]))
            .unwrap_err();
        assert!(matches!(err, MangoError::Config(_)));
    }

    #[test]
    fn zone_sessions_are_isolated() {
        let opts = MangoOptions::new(b"sample-password".as_slice(), &ZERO_SALT)
            .iterations(10_000)
            .zone(b"zone-a".as_slice());
        let mut zoned = MangoSession::new(opts).unwrap();
        let packet = zoned.encrypt(&combined_profile(), b"zoned payload").unwrap();
        assert_eq!(zoned.decrypt(&packet).unwrap(), b"zoned payload");

        // A zone-free session with the same password cannot read the packet.
        let mut plain = MangoSession::new(
            MangoOptions::new(b"sample-password".as_slice(), &ZERO_SALT).iterations(10_000),
        )
        .unwrap();
        match plain.decrypt(&packet) {
            Ok(out) => assert_ne!(out, b"zoned payload"),
            Err(_) => {}
        }
    }
}
