//! Input profiles and the adaptive selector
//!
//! An [`InputProfile`] names an ordered transform sequence (with
//! per-transform round counts) and a global round count. The library ships a
//! built-in set covering the five input types across two performance tiers;
//! on disk a profile set is a JSON object keyed by profile name:
//!
//! ```json
//! { "Combined.Best": { "Sequence": [[35, 3], [5, 1]], "GlobalRounds": 6,
//!                      "AggregateScore": 90.2 } }
//! ```
//!
//! Selection is signature-first: the input's TSV (base64) plus the requested
//! tier keys a table of recorded pairings from prior benchmarking runs. On a
//! miss, every tier-compatible profile is trial-encrypted under the canonical
//! dev password and scored by the cryptanalysis battery; the winner must
//! clear 98% of its stored score or the best-scoring candidate is taken
//! as-is. Either way the pairing lands in a small LRU so repeated inputs of
//! the same shape skip the trials.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::{BTreeMap, HashMap, VecDeque};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::{CryptoAnalyzer, OperatingMode, ScoringMode};
use crate::cipher::{MangoError, MangoOptions, MangoSession};
use crate::keying::SALT_LEN;
use crate::tsv::Tsv;

/// Canonical password used for trial encryption.
pub const DEV_PASSWORD: &[u8] = b"sample-password";

/// Default all-zero salt used for trial encryption.
pub const DEFAULT_SALT: [u8; SALT_LEN] = [0u8; SALT_LEN];

/// Iteration count for throwaway trial sessions.
const TRIAL_ITERATIONS: u32 = 10_000;

/// LRU capacity for signature → profile pairings.
const CACHE_CAPACITY: usize = 16;

/// Performance tier requested by the caller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Performance {
    Fast,
    Best,
}

impl Performance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Performance::Fast => "Fast",
            Performance::Best => "Best",
        }
    }
}

/// A named transform sequence with round counts.
#[derive(Clone, Debug, PartialEq)]
pub struct InputProfile {
    pub name: String,
    pub sequence: Vec<(u8, u8)>,
    pub global_rounds: u8,
    /// Stored aggregate score from the benchmarking run that produced this
    /// profile. Informational; used only for the selection tolerance check.
    pub aggregate_score: f64,
}

impl InputProfile {
    /// True when this profile may serve the requested tier. Untagged names
    /// serve both tiers.
    pub fn serves(&self, tier: Performance) -> bool {
        match tier {
            Performance::Fast => !self.name.ends_with(".Best"),
            Performance::Best => !self.name.ends_with(".Fast"),
        }
    }
}

/// On-disk record shape (one JSON object value).
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProfileRecord {
    pub sequence: Vec<(u8, u8)>,
    pub global_rounds: u8,
    pub aggregate_score: f64,
}

/// Parse a profile set from its JSON object form.
pub fn profiles_from_json(json: &str) -> Result<Vec<InputProfile>, serde_json::Error> {
    let map: BTreeMap<String, ProfileRecord> = serde_json::from_str(json)?;
    Ok(map
        .into_iter()
        .map(|(name, r)| InputProfile {
            name,
            sequence: r.sequence,
            global_rounds: r.global_rounds,
            aggregate_score: r.aggregate_score,
        })
        .collect())
}

/// Serialize a profile set to its JSON object form.
pub fn profiles_to_json(profiles: &[InputProfile]) -> Result<String, serde_json::Error> {
    let map: BTreeMap<&str, ProfileRecord> = profiles
        .iter()
        .map(|p| {
            (
                p.name.as_str(),
                ProfileRecord {
                    sequence: p.sequence.clone(),
                    global_rounds: p.global_rounds,
                    aggregate_score: p.aggregate_score,
                },
            )
        })
        .collect();
    serde_json::to_string_pretty(&map)
}

/// The built-in profile set.
pub fn builtin_profiles() -> Vec<InputProfile> {
    fn p(name: &str, sequence: &[(u8, u8)], global_rounds: u8, score: f64) -> InputProfile {
        InputProfile {
            name: name.to_string(),
            sequence: sequence.to_vec(),
            global_rounds,
            aggregate_score: score,
        }
    }
    vec![
        p("Combined.Fast", &[(8, 3), (10, 1), (31, 1), (9, 1), (31, 1)], 6, 83.6),
        p("Combined.Best", &[(35, 3), (5, 1), (43, 1), (45, 1), (20, 2), (49, 1)], 6, 90.2),
        p("Natural.Fast", &[(35, 2), (1, 1), (8, 1)], 3, 78.4),
        p("Natural.Best", &[(35, 3), (4, 1), (9, 2), (23, 1), (47, 1)], 6, 88.9),
        p("Random.Fast", &[(1, 1), (49, 1)], 2, 74.2),
        p("Random.Best", &[(16, 2), (20, 1), (49, 2), (2, 1)], 5, 85.1),
        p("Sequence.Fast", &[(24, 2), (37, 1), (1, 1)], 3, 72.8),
        p("Sequence.Best", &[(26, 1), (18, 2), (35, 2), (41, 1), (46, 1)], 6, 86.4),
        p("UserData.Fast", &[(13, 1), (22, 1), (1, 2)], 4, 75.9),
        p("UserData.Best", &[(35, 2), (29, 1), (40, 1), (47, 2), (21, 1)], 6, 87.7),
    ]
}

// Recorded signature → profile pairings from benchmarking runs. Flags in the
// low bytes, scalar features at 16..19 (see tsv.rs for the layout).
const SIG_NATURAL_TEXT: [u8; 32] = [
    0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    140, 18, 10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];
const SIG_HIGH_ENTROPY: [u8; 32] = [
    0, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    255, 255, 15, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

const RECORDED_SIGNATURES: &[(&[u8; 32], Performance, &str)] = &[
    (&SIG_NATURAL_TEXT, Performance::Fast, "Natural.Fast"),
    (&SIG_NATURAL_TEXT, Performance::Best, "Natural.Best"),
    (&SIG_HIGH_ENTROPY, Performance::Fast, "Random.Fast"),
    (&SIG_HIGH_ENTROPY, Performance::Best, "Random.Best"),
];

/// Flip one bit of the input (bit 0 of the middle byte) for avalanche
/// scoring. Empty input passes through unchanged.
pub fn avalanche_input(input: &[u8]) -> Vec<u8> {
    let mut out = input.to_vec();
    if !out.is_empty() {
        let mid = out.len() / 2;
        out[mid] ^= 0x01;
    }
    out
}

/// Perturb one byte of key material for key-dependency scoring.
pub fn perturb_key(password: &[u8]) -> Vec<u8> {
    let mut out = password.to_vec();
    if !out.is_empty() {
        out[0] ^= 0x01;
    }
    out
}

/// Small move-to-front LRU for signature pairings.
struct LruCache {
    capacity: usize,
    entries: VecDeque<(String, String)>,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self { capacity, entries: VecDeque::new() }
    }

    fn get(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        let entry = self.entries.remove(pos).unwrap();
        let value = entry.1.clone();
        self.entries.push_front(entry);
        Some(value)
    }

    fn put(&mut self, key: String, value: String) {
        if let Some(pos) = self.entries.iter().position(|(k, _)| k == &key) {
            self.entries.remove(pos);
        }
        self.entries.push_front((key, value));
        self.entries.truncate(self.capacity);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Signature-first profile selection with trial-encryption fallback.
pub struct ProfileSelector {
    profiles: Vec<InputProfile>,
    signatures: HashMap<String, &'static str>,
    cache: LruCache,
}

impl Default for ProfileSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileSelector {
    /// Selector over the built-in profile set.
    pub fn new() -> Self {
        let mut signatures = HashMap::new();
        for (sig, tier, name) in RECORDED_SIGNATURES {
            signatures.insert(format!("{}:{}", BASE64.encode(*sig), tier.as_str()), *name);
        }
        Self { profiles: builtin_profiles(), signatures, cache: LruCache::new(CACHE_CAPACITY) }
    }

    /// All profiles known to this selector.
    pub fn profiles(&self) -> &[InputProfile] {
        &self.profiles
    }

    /// Look up a profile by exact name.
    pub fn by_name(&self, name: &str) -> Option<&InputProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    #[cfg(test)]
    fn cached_pairings(&self) -> usize {
        self.cache.len()
    }

    /// Select a profile for `input`.
    ///
    /// Signature table first, then the LRU of previous trials, then a full
    /// trial-encryption pass scored by the metric battery.
    pub fn get_input_profile(
        &mut self,
        input: &[u8],
        weighting: OperatingMode,
        scoring: ScoringMode,
        performance: Performance,
    ) -> Result<InputProfile, MangoError> {
        let tsv = Tsv::compute(input);
        let key = format!("{}:{}", BASE64.encode(tsv.as_bytes()), performance.as_str());

        if let Some(name) = self.signatures.get(&key) {
            debug!(profile = name, "signature table hit");
            let name = name.to_string();
            return self
                .by_name(&name)
                .cloned()
                .ok_or_else(|| MangoError::Config(format!("recorded profile {name} missing")));
        }
        if let Some(name) = self.cache.get(&key) {
            debug!(profile = %name, "selection cache hit");
            return self
                .by_name(&name)
                .cloned()
                .ok_or_else(|| MangoError::Config(format!("cached profile {name} missing")));
        }

        let chosen = self.run_trials(input, weighting, scoring, performance)?;
        self.cache.put(key, chosen.name.clone());
        Ok(chosen)
    }

    fn run_trials(
        &self,
        input: &[u8],
        weighting: OperatingMode,
        scoring: ScoringMode,
        performance: Performance,
    ) -> Result<InputProfile, MangoError> {
        let mut dev = MangoSession::new(
            MangoOptions::new(DEV_PASSWORD, &DEFAULT_SALT).iterations(TRIAL_ITERATIONS),
        )?;
        let mut perturbed = MangoSession::new(
            MangoOptions::new(perturb_key(DEV_PASSWORD), &DEFAULT_SALT)
                .iterations(TRIAL_ITERATIONS),
        )?;
        let flipped = avalanche_input(input);
        let analyzer = CryptoAnalyzer::new(weighting, scoring);

        let mut best: Option<(f64, &InputProfile)> = None;
        let mut tolerated: Option<(f64, &InputProfile)> = None;
        for profile in self.profiles.iter().filter(|p| p.serves(performance)) {
            let payload = {
                let enc = dev.encrypt(profile, input)?;
                dev.get_payload_only(&enc)?
            };
            let payload_flipped = {
                let enc = dev.encrypt(profile, &flipped)?;
                dev.get_payload_only(&enc)?
            };
            let payload_keyed = {
                let enc = perturbed.encrypt(profile, input)?;
                perturbed.get_payload_only(&enc)?
            };

            let report = analyzer.run(&payload, &payload_flipped, &payload_keyed, input);
            let score = report.aggregate;
            debug!(profile = %profile.name, score, pass = report.pass_count, "trial scored");

            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, profile));
            }
            if score >= profile.aggregate_score * 0.98
                && tolerated.as_ref().map_or(true, |(s, _)| score > *s)
            {
                tolerated = Some((score, profile));
            }
        }

        let (score, profile) = tolerated.or(best).ok_or_else(|| {
            MangoError::Config(format!("no profile serves tier {}", performance.as_str()))
        })?;
        debug!(profile = %profile.name, score, "trial selection");
        Ok(profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TransformRegistry;

    #[test]
    fn builtin_profiles_reference_registered_transforms() {
        let reg = TransformRegistry::standard().unwrap();
        for p in builtin_profiles() {
            assert!(!p.sequence.is_empty(), "{} has an empty sequence", p.name);
            assert!(p.global_rounds >= 1);
            for (id, tr) in &p.sequence {
                assert!(reg.contains(*id), "{} references unknown id {id}", p.name);
                assert!(*tr >= 1);
            }
        }
    }

    #[test]
    fn json_round_trip_preserves_shape_and_names() {
        let profiles = builtin_profiles();
        let json = profiles_to_json(&profiles).unwrap();
        assert!(json.contains("\"Sequence\""));
        assert!(json.contains("\"GlobalRounds\""));
        assert!(json.contains("\"AggregateScore\""));
        let mut parsed = profiles_from_json(&json).unwrap();
        parsed.sort_by(|a, b| a.name.cmp(&b.name));
        let mut original = profiles;
        original.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(parsed, original);
    }

    #[test]
    fn tier_filtering_follows_name_suffix() {
        let fast = InputProfile {
            name: "X.Fast".into(),
            sequence: vec![(1, 1)],
            global_rounds: 1,
            aggregate_score: 0.0,
        };
        assert!(fast.serves(Performance::Fast));
        assert!(!fast.serves(Performance::Best));
        let untagged = InputProfile { name: "X".into(), ..fast.clone() };
        assert!(untagged.serves(Performance::Fast));
        assert!(untagged.serves(Performance::Best));
    }

    #[test]
    fn recorded_signature_short_circuits_selection() {
        let sel = ProfileSelector::new();
        let key_tsv = Tsv(SIG_NATURAL_TEXT);
        // Feed the recorded signature through the public path by looking the
        // key up directly: the table must answer without trials.
        let key = format!("{}:{}", BASE64.encode(key_tsv.as_bytes()), "Best");
        assert_eq!(sel.signatures.get(&key), Some(&"Natural.Best"));
        assert_eq!(sel.cached_pairings(), 0);
    }

    #[test]
    fn trial_selection_returns_tier_compatible_profile_and_caches() {
        let mut sel = ProfileSelector::new();
        let input: Vec<u8> = (0..256u16).map(|i| (i as u8).wrapping_mul(7)).collect();
        let chosen = sel
            .get_input_profile(
                &input,
                OperatingMode::Cryptographic,
                ScoringMode::Practical,
                Performance::Fast,
            )
            .unwrap();
        assert!(chosen.serves(Performance::Fast));
        assert_eq!(sel.cached_pairings(), 1);

        // Second call with identical input hits the cache and agrees.
        let again = sel
            .get_input_profile(
                &input,
                OperatingMode::Cryptographic,
                ScoringMode::Practical,
                Performance::Fast,
            )
            .unwrap();
        assert_eq!(again.name, chosen.name);
        assert_eq!(sel.cached_pairings(), 1);
    }

    #[test]
    fn lru_evicts_beyond_capacity() {
        let mut lru = LruCache::new(3);
        for i in 0..5 {
            lru.put(format!("k{i}"), format!("v{i}"));
        }
        assert_eq!(lru.len(), 3);
        assert!(lru.get("k0").is_none());
        assert!(lru.get("k1").is_none());
        assert_eq!(lru.get("k4").as_deref(), Some("v4"));
        // Touching k2 protects it from the next eviction.
        assert_eq!(lru.get("k2").as_deref(), Some("v2"));
        lru.put("k5".into(), "v5".into());
        assert!(lru.get("k2").is_some());
        assert!(lru.get("k3").is_none());
    }
}
