//! Credential verification.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;

/// Verifies presented credentials against configured keys.
///
/// Hashed keys are parsed once at construction; malformed entries are
/// dropped with a warning so one bad line does not disable auth.
#[derive(Debug, Clone)]
pub struct KeyVerifier {
    plaintext: Vec<String>,
    sha256: Vec<[u8; 32]>,
}

impl KeyVerifier {
    pub fn from_config(config: &AuthConfig) -> Self {
        let mut sha256 = Vec::new();
        for entry in &config.hashed_keys {
            match parse_hashed_entry(entry) {
                Some(digest) => sha256.push(digest),
                None => {
                    tracing::warn!(entry = %redact(entry), "Ignoring malformed hashed key entry");
                }
            }
        }
        Self {
            plaintext: config.api_keys.clone(),
            sha256,
        }
    }

    /// Constant-time match of a presented credential against every
    /// configured key.
    pub fn verify(&self, credential: &str) -> bool {
        let mut matched = false;
        for key in &self.plaintext {
            matched |= bool::from(key.as_bytes().ct_eq(credential.as_bytes()));
        }
        if !self.sha256.is_empty() {
            let digest: [u8; 32] = Sha256::digest(credential.as_bytes()).into();
            for stored in &self.sha256 {
                matched |= bool::from(stored.ct_eq(&digest));
            }
        }
        matched
    }

    pub fn has_keys(&self) -> bool {
        !self.plaintext.is_empty() || !self.sha256.is_empty()
    }
}

fn parse_hashed_entry(entry: &str) -> Option<[u8; 32]> {
    let hex = entry.strip_prefix("sha256:")?;
    if hex.len() != 64 {
        return None;
    }
    let mut digest = [0u8; 32];
    for (i, byte) in digest.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(digest)
}

/// Stable, non-reversible identity for a credential: the first 12 hex
/// characters of its SHA-256 digest. Used as the rate-limit identity so
/// raw keys never appear in limiter state or logs.
pub fn credential_fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    let mut out = String::with_capacity(12);
    for byte in digest.iter().take(6) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn redact(entry: &str) -> String {
    let tail: String = entry.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("***{tail}")
}
