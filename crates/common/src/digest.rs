//! `Content-Digest` validation (RFC 9530).
//!
//! The header is a structured-field dictionary of algorithm to byte sequence,
//! for example `sha-256=:X48E9qOokqqrvdts8nOJRJN3OWDUoyWxBf7kbu9DBPE=:`.

use base64::{engine::general_purpose, Engine};
use error_stack::Report;
use sha2::{Digest, Sha256, Sha512};

use crate::error::AuthError;

/// Digest algorithms accepted in `Content-Digest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Sha256 => "sha-256",
            Self::Sha512 => "sha-512",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "sha-256" => Some(Self::Sha256),
            "sha-512" => Some(Self::Sha512),
            _ => None,
        }
    }

    fn digest(self, body: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(body).to_vec(),
            Self::Sha512 => Sha512::digest(body).to_vec(),
        }
    }
}

/// How to treat requests that carry neither a body nor a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestPolicy {
    /// When `true`, a request with no body and no `Content-Digest` skips the
    /// digest check. A digest that is present is always checked.
    pub allow_bodyless_without_digest: bool,
}

impl Default for DigestPolicy {
    fn default() -> Self {
        Self {
            allow_bodyless_without_digest: true,
        }
    }
}

/// Result of [`check_digest`] when the request is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestCheck {
    Verified,
    /// No body and no header, and the policy allows it.
    Skipped,
}

/// Computes a `Content-Digest` header value for `body`.
#[must_use]
pub fn content_digest(body: &[u8], algorithm: DigestAlgorithm) -> String {
    format!(
        "{}=:{}:",
        algorithm.key(),
        general_purpose::STANDARD.encode(algorithm.digest(body))
    )
}

/// Checks `body` against a declared `Content-Digest` header.
///
/// Returns `false` when the header is absent, unparsable, names no supported
/// algorithm, or any supported entry does not match. Never errors.
#[must_use]
pub fn is_valid_digest(header: Option<&str>, body: &[u8]) -> bool {
    let Some(header) = header else {
        return false;
    };

    let Some(entries) = parse_entries(header) else {
        log::debug!("Content-Digest header could not be parsed");
        return false;
    };

    let mut matched = false;
    for (algorithm, declared) in entries {
        if algorithm.digest(body) != declared {
            log::debug!("Content-Digest {} entry does not match body", algorithm.key());
            return false;
        }
        matched = true;
    }
    matched
}

/// Classifies the digest state of a request for the authenticator.
///
/// | body    | header  | result                                      |
/// |---------|---------|---------------------------------------------|
/// | absent  | absent  | `Skipped` if the policy allows, else `DigestMissing` |
/// | present | absent  | `DigestMissing`                             |
/// | any     | present | `Verified` or `DigestMismatch` (absent body hashes as empty) |
///
/// # Errors
///
/// Returns [`AuthError::DigestMissing`] or [`AuthError::DigestMismatch`].
pub fn check_digest(
    header: Option<&str>,
    body: Option<&[u8]>,
    policy: DigestPolicy,
) -> Result<DigestCheck, Report<AuthError>> {
    match (header, body) {
        (None, None) if policy.allow_bodyless_without_digest => Ok(DigestCheck::Skipped),
        (None, _) => Err(Report::new(AuthError::DigestMissing)),
        (Some(_), body) => {
            if is_valid_digest(header, body.unwrap_or_default()) {
                Ok(DigestCheck::Verified)
            } else {
                Err(Report::new(AuthError::DigestMismatch))
            }
        }
    }
}

/// Parses supported `alg=:b64:` entries. Unknown algorithms are skipped;
/// `None` means the header is malformed.
fn parse_entries(header: &str) -> Option<Vec<(DigestAlgorithm, Vec<u8>)>> {
    let mut entries = Vec::new();
    for member in header.split(',') {
        let (key, value) = member.trim().split_once('=')?;
        let encoded = value
            .trim()
            .strip_prefix(':')
            .and_then(|v| v.strip_suffix(':'))?;
        let Some(algorithm) = DigestAlgorithm::from_key(key.trim()) else {
            continue;
        };
        let declared = general_purpose::STANDARD.decode(encoded).ok()?;
        entries.push((algorithm, declared));
    }
    Some(entries)
}
