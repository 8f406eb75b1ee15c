//! Minimal CLI decryptor
//!
//! The packet header is self-describing, so only the key material is needed:
//!
//!   mango_decrypt --in packet.mango --out plain.bin --password secret \
//!                 [--zone LABEL] [--salt-hex 24-hex-chars] \
//!                 [--iterations N] [--no-kdf]

use std::{env, fs};

use anyhow::{anyhow, Context};
use mango::{MangoOptions, MangoSession, SALT_LEN};

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

    let packet = fs::read(&input_path).with_context(|| format!("read {input_path}"))?;
    let mut session = MangoSession::new(options)?;
    let plaintext = session.decrypt(&packet)?;
    fs::write(&output_path, &plaintext).with_context(|| format!("write {output_path}"))?;

    eprintln!("decrypted {} bytes -> {} bytes", packet.len(), plaintext.len());
    Ok(())
}
