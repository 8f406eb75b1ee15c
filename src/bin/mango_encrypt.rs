//! Minimal CLI encryptor
//!
//! Reads a file, selects (or accepts) an input profile, and writes the
//! self-describing packet:
//!
//!   mango_encrypt --in plain.bin --out packet.mango --password secret \
//!                 [--zone LABEL] [--salt-hex 24-hex-chars] \
//!                 [--iterations N] [--no-kdf] \
//!                 [--profile NAME | --tier Fast|Best]
//!
//! With no explicit profile the adaptive selector classifies the input and
//! picks one (signature table first, trial scoring on a miss).

use std::{env, fs};

use anyhow::{anyhow, Context};
use mango::{
    MangoOptions, MangoSession, OperatingMode, Performance, ProfileSelector, ScoringMode,
    SALT_LEN,
};

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let input_path = parse_flag(&args, "--in").ok_or_else(|| anyhow!("--in is required"))?;
    let output_path = parse_flag(&args, "--out").ok_or_else(|| anyhow!("--out is required"))?;
    let password =
        parse_flag(&args, "--password").ok_or_else(|| anyhow!("--password is required"))?;

    let salt = match parse_flag(&args, "--salt-hex") {
        Some(h) => hex::decode(&h).context("--salt-hex is not valid hex")?,
        None => vec![0u8; SALT_LEN],
    };

    let mut options = MangoOptions::new(password.as_bytes(), salt);
    if let Some(zone) = parse_flag(&args, "--zone") {
        options = options.zone(zone.as_bytes());
    }
    if let Some(iters) = parse_flag(&args, "--iterations") {
        options = options.iterations(iters.parse().context("--iterations must be a number")?);
    }
    if has_flag(&args, "--no-kdf") {
        options = options.rfc2898(false);
    }

    let plaintext = fs::read(&input_path).with_context(|| format!("read {input_path}"))?;

    let mut selector = ProfileSelector::new();
    let profile = match parse_flag(&args, "--profile") {
        Some(name) => selector
            .by_name(&name)
            .cloned()
            .ok_or_else(|| anyhow!("unknown profile {name}"))?,
        None => {
            let tier = match parse_flag(&args, "--tier").as_deref() {
                Some("Best") => Performance::Best,
                Some("Fast") | None => Performance::Fast,
                Some(other) => return Err(anyhow!("unknown tier {other}")),
            };
            selector.get_input_profile(
                &plaintext,
                OperatingMode::Cryptographic,
                ScoringMode::Practical,
                tier,
            )?
        }
    };

    let mut session = MangoSession::new(options)?;
    let packet = session.encrypt(&profile, &plaintext)?;
    fs::write(&output_path, &packet).with_context(|| format!("write {output_path}"))?;

    eprintln!(
        "encrypted {} bytes -> {} bytes with profile {} (GR={}, {} transforms)",
        plaintext.len(),
        packet.len(),
        profile.name,
        profile.global_rounds,
        profile.sequence.len(),
    );
    Ok(())
}
