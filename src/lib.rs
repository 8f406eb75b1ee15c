//! Crate root: public surface and protocol-wide invariants
//!
//! Mango is an experimental, adaptive symmetric cipher. Encryption is
//! composed from a registry of 50 small reversible byte transforms, applied
//! as an ordered sequence over multiple global rounds and driven by
//! deterministic per-round coin bytes. Three derivation layers feed the
//! engine:
//!
//! - the session **CoinTable** (password + optional zone → PBKDF2-HMAC-SHA256
//!   → SHA-256-driven Fisher–Yates), immutable per session;
//! - the per-message **CBox** (`SHA-256(plaintext ‖ CoinTable)` → the same
//!   walk), rebuilt at decrypt from the packet header;
//! - the **coins** permutation (`SHA-256(hash ‖ salt)`), one byte of which
//!   seeds a fresh [`prng::TomRandom`] inside every transform invocation.
//!
//! Packets are self-describing: an independently encrypted header carries the
//! plaintext hash, salt and the exact transform sequence, so a fresh session
//! holding only the key material can decrypt any packet.
//!
//! ## Invariants
//!
//! - **Determinism.** Identical key material and plaintext produce
//!   byte-identical packets on every platform. Anything that feeds the wire
//!   format (PRNG wrap semantics, the Fisher–Yates walk, header geometry) is
//!   pinned and covered by tests; none of it may drift without a version
//!   bump.
//! - **Reversibility.** Every registered transform has an inverse in the
//!   registry (possibly itself) and the registry refuses to build when the
//!   pairing or the id sequence is broken.
//! - **Scoped table selection.** Header work runs with the CoinTable active;
//!   payload work runs with the per-message CBox active. The selection is
//!   save/restored around every header operation, error paths included.
//! - **Single-threaded sessions.** A [`MangoSession`] is mutable shared
//!   state; run one per thread. Scratch buffers are thread-local.
//!
//! ## Versioning
//!
//! A library at version `v` understands transform ids `1..=39 + v`. Packets
//! referencing newer ids fail the version gate with the required version in
//! the error.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Static AES substitution tables and GF(2⁸) arithmetic.
pub mod tables;

/// TomRandom, the deterministic mask/coin stream.
pub mod prng;

/// Per-thread size-keyed scratch buffers.
pub mod scratch;

/// CoinTable/CBox/coins derivation and the active-slot type.
pub mod keying;

/// The 50 reversible transform implementations.
pub mod transforms;

/// Transform catalog: ids, inverses, coin preferences, validation.
pub mod registry;

/// Padding discipline and round application.
pub mod engine;

/// Packet header pack/parse and the two-part header codec.
pub mod header;

/// `MangoSession` — the public Encrypt/Decrypt surface.
pub mod cipher;

/// 32-byte structural input signatures.
pub mod tsv;

/// Input profiles, the built-in set and the adaptive selector.
pub mod profiles;

/// The cryptanalysis metric battery.
pub mod analysis;

/// Library major version; also the newest supported transform generation
/// (`ids 1..=39 + VERSION_MAJOR`).
pub const VERSION_MAJOR: u8 = 11;

/// Library minor version.
pub const VERSION_MINOR: u8 = 0;

pub use crate::analysis::{
    AnalysisReport, CryptoAnalyzer, MetricResult, OperatingMode, ScoringMode,
};
pub use crate::cipher::{MangoError, MangoOptions, MangoSession};
pub use crate::keying::{DEFAULT_ITERATIONS, SALT_LEN};
pub use crate::profiles::{
    builtin_profiles, profiles_from_json, profiles_to_json, InputProfile, Performance,
    ProfileSelector,
};
pub use crate::registry::TransformRegistry;
pub use crate::tsv::Tsv;
