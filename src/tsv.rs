//! Structural input signatures
//!
//! A TSV is a 32-byte fingerprint of the *shape* of an input: format flags in
//! the low bytes, scalar features (entropy, token variance, repetition) in
//! bytes 16–18, and zeroed reserved space above. The profile selector keys
//! its lookup table on the base64 of this vector, so every threshold and bit
//! position here is load-bearing: moving one changes which profile a given
//! input selects.
//!
//! All features are computed over bounded prefixes (1–8 KiB depending on the
//! feature) so classification stays O(1) for large inputs.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

/// Signature length in bytes.
pub const TSV_LEN: usize = 32;

const FLAG_WINDOW_PRINTABLE: usize = 2 * 1024;
const FLAG_WINDOW_MARKUP: usize = 4 * 1024;
const FLAG_WINDOW_BINARY: usize = 1024;
const ENTROPY_WINDOW: usize = 8 * 1024;

/// 32-byte structural signature.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Tsv(pub [u8; TSV_LEN]);

impl Tsv {
    /// Classify `input`.
    pub fn compute(input: &[u8]) -> Self {
        let mut v = [0u8; TSV_LEN];

        let printable_window = &input[..input.len().min(FLAG_WINDOW_PRINTABLE)];
        let printable_ratio = printable_ratio(printable_window);
        let repetition_count = repetition_count(printable_window);
        let token_variance = token_variance(printable_window);

        let entropy_norm = shannon_entropy(&input[..input.len().min(ENTROPY_WINDOW)]) / 8.0;

        if printable_ratio > 0.85 {
            v[0] |= 1 << 0; // ASCII text
        }
        let markup = String::from_utf8_lossy(&input[..input.len().min(FLAG_WINDOW_MARKUP)]);
        if ["<html", "<div", "<!DOCTYPE html"].iter().any(|m| markup.contains(m)) {
            v[0] |= 1 << 1; // HTML
        }
        if ["public", "class", "#include", "def "].iter().any(|m| markup.contains(m)) {
            v[0] |= 1 << 2; // code-like
        }

        let zeros = input[..input.len().min(FLAG_WINDOW_BINARY)]
            .iter()
            .filter(|&&b| b == 0)
            .count();
        if zeros > 10 {
            v[1] |= 1 << 0; // binary
        }
        if entropy_norm > 0.85 {
            v[1] |= 1 << 1; // high entropy
        }
        if input.len() >= 2 && input[0] == 0x4D && input[1] == 0x5A {
            v[3] |= 1 << 0; // executable (MZ)
        }
        if printable_ratio > 0.95 && entropy_norm > 0.30 && entropy_norm < 0.65 && repetition_count > 50
        {
            v[5] |= 1 << 0; // structured telemetry
        }

        v[16] = (entropy_norm * 255.0).round().clamp(0.0, 255.0) as u8;
        v[17] = ((token_variance.sqrt() * 10.0).min(255.0)) as u8;
        v[18] = (((repetition_count as f64).sqrt() * 10.0).min(255.0)) as u8;

        Self(v)
    }

    /// Raw signature bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; TSV_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for Tsv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tsv({})", hex::encode(self.0))
    }
}

/// Fraction of bytes in `0x20..=0x7E` plus tab/CR/LF. Zero for empty input.
fn printable_ratio(window: &[u8]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let printable = window
        .iter()
        .filter(|&&b| (0x20..=0x7E).contains(&b) || b == b'\t' || b == b'\r' || b == b'\n')
        .count();
    printable as f64 / window.len() as f64
}

/// Consecutive-equal byte pairs.
fn repetition_count(window: &[u8]) -> usize {
    window.windows(2).filter(|p| p[0] == p[1]).count()
}

/// `10 · |avg_word_length − 5|` over ASCII-whitespace-split tokens.
fn token_variance(window: &[u8]) -> f64 {
    let mut words = 0usize;
    let mut total = 0usize;
    for tok in window.split(|b| b.is_ascii_whitespace()) {
        if !tok.is_empty() {
            words += 1;
            total += tok.len();
        }
    }
    let avg = if words == 0 { 0.0 } else { total as f64 / words as f64 };
    10.0 * (avg - 5.0).abs()
}

/// Shannon entropy in bits per byte over the window's byte histogram.
pub(crate) fn shannon_entropy(window: &[u8]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let mut counts = [0usize; 256];
    for &b in window {
        counts[b as usize] += 1;
    }
    let n = window.len() as f64;
    let mut h = 0.0;
    for &c in counts.iter() {
        if c > 0 {
            let p = c as f64 / n;
            h -= p * p.log2();
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_text_signature() {
        let tsv = Tsv::compute(b"The quick brown fox jumps over the lazy dog");
        let v = tsv.as_bytes();
        assert_eq!(v[0] & 0b001, 0b001, "ASCII bit set");
        assert_eq!(v[0] & 0b110, 0, "HTML/code bits clear");
        assert_eq!(v[1], 0, "binary and high-entropy bits clear");
        assert!((100..=200).contains(&v[16]), "entropy byte {} out of band", v[16]);
        assert!(v[18] < 20, "no byte-level repetition in the pangram");
    }

    #[test]
    fn constant_buffer_signature() {
        let tsv = Tsv::compute(&[0xAA; 1024]);
        let v = tsv.as_bytes();
        assert_eq!(v[16], 0, "constant data has zero entropy");
        assert_eq!(v[18], 255, "repetition feature saturates");
        assert_eq!(v[0] & 1, 0, "0xAA is not printable text");
    }

    #[test]
    fn html_and_code_markers() {
        let html = Tsv::compute(b"<!DOCTYPE html><html><body>hi</body></html>");
        assert_eq!(html.as_bytes()[0] & 0b010, 0b010);

        let code = Tsv::compute(b"#include <stdio.h>\nint main(void) { return 0; }\n");
        assert_eq!(code.as_bytes()[0] & 0b100, 0b100);
    }

    #[test]
    fn executable_marker() {
        let mut exe = vec![0x4D, 0x5A];
        exe.extend_from_slice(&[0x90; 64]);
        assert_eq!(Tsv::compute(&exe).as_bytes()[3] & 1, 1);
        assert_eq!(Tsv::compute(b"MZ-less").as_bytes()[3] & 1, 1); // starts with "MZ" too
        assert_eq!(Tsv::compute(b"plain").as_bytes()[3] & 1, 0);
    }

    #[test]
    fn identical_inputs_identical_signatures() {
        let a = Tsv::compute(b"some deterministic input");
        let b = Tsv::compute(b"some deterministic input");
        assert_eq!(a, b);
    }

    #[test]
    fn scalar_region_reacts_to_single_byte_change() {
        let base = vec![b'a'; 64];
        let mut tweaked = base.clone();
        tweaked[32] = b'b';
        let ta = Tsv::compute(&base);
        let tb = Tsv::compute(&tweaked);
        assert_ne!(
            &ta.as_bytes()[16..19],
            &tb.as_bytes()[16..19],
            "scalar features must notice the change"
        );
    }
}
