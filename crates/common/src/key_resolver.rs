//! Key reference parsing and verifier binding.
//!
//! A key reference names a public key indirectly as
//! `{algorithm}-{thumbprint}`, for example `sha256-kPrK_qmxVWaYVA9wwBF6Iuo3vVzz7TxHCTwXBygrS4k`.
//! The thumbprint is the base64url RFC 7638 thumbprint of the key computed with
//! `algorithm`. Thumbprints may themselves contain `-`, so references are
//! parsed by known prefix rather than by splitting.

use core::fmt;
use core::str::FromStr;

use base64::{engine::general_purpose, Engine};
use error_stack::Report;

use crate::error::AuthError;
use crate::keys::{PublicKey, ThumbprintAlgorithm};

const SEPARATOR: char = '-';

/// A parsed `{algorithm}-{thumbprint}` key reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyReference {
    algorithm: ThumbprintAlgorithm,
    thumbprint: String,
}

impl KeyReference {
    #[must_use]
    pub fn new(algorithm: ThumbprintAlgorithm, thumbprint: impl Into<String>) -> Self {
        Self {
            algorithm,
            thumbprint: thumbprint.into(),
        }
    }

    /// Builds the reference that names `public_key`.
    #[must_use]
    pub fn for_key(public_key: &PublicKey, algorithm: ThumbprintAlgorithm) -> Self {
        Self::new(algorithm, public_key.thumbprint(algorithm))
    }

    #[must_use]
    pub fn algorithm(&self) -> ThumbprintAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }
}

impl fmt::Display for KeyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.algorithm.tag(), SEPARATOR, self.thumbprint)
    }
}

impl FromStr for KeyReference {
    type Err = Report<AuthError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, thumbprint) = resolve(s)?;
        Ok(Self::new(algorithm, thumbprint))
    }
}

/// Splits a key reference into its thumbprint algorithm and thumbprint.
///
/// Performs string work only; no hashing or signature verification happens
/// before a reference is accepted.
///
/// # Errors
///
/// Returns [`AuthError::MalformedReference`] if the reference does not start
/// with a known algorithm tag and the separator, or if the thumbprint is not
/// unpadded base64url of the algorithm's digest length.
pub fn resolve(reference: &str) -> Result<(ThumbprintAlgorithm, String), Report<AuthError>> {
    let (algorithm, thumbprint) = ThumbprintAlgorithm::ALL
        .into_iter()
        .find_map(|alg| {
            reference
                .strip_prefix(alg.tag())
                .and_then(|rest| rest.strip_prefix(SEPARATOR))
                .map(|thumbprint| (alg, thumbprint))
        })
        .ok_or_else(|| {
            log::warn!("Rejecting key reference without a known algorithm prefix");
            Report::new(AuthError::MalformedReference {
                message: "reference must start with one of sha256-, sha384-, sha512-".into(),
            })
        })?;

    if thumbprint.is_empty() {
        return Err(Report::new(AuthError::MalformedReference {
            message: "thumbprint is empty".into(),
        }));
    }

    let decoded = general_purpose::URL_SAFE_NO_PAD
        .decode(thumbprint)
        .map_err(|e| {
            Report::new(AuthError::MalformedReference {
                message: format!("thumbprint is not base64url: {e}"),
            })
        })?;

    if decoded.len() != algorithm.digest_len() {
        return Err(Report::new(AuthError::MalformedReference {
            message: format!(
                "{} thumbprint must be {} bytes, got {}",
                algorithm,
                algorithm.digest_len(),
                decoded.len()
            ),
        }));
    }

    Ok((algorithm, thumbprint.to_string()))
}

/// A public key bound to the thumbprint it was looked up by.
///
/// Consumed by [`crate::signature::verify_request_signature`].
#[derive(Debug, Clone)]
pub struct VerifierHandle {
    thumbprint: String,
    algorithm: ThumbprintAlgorithm,
    public_key: PublicKey,
}

impl VerifierHandle {
    #[must_use]
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    #[must_use]
    pub fn algorithm(&self) -> ThumbprintAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Whether the bound key actually hashes to the bound thumbprint.
    #[must_use]
    pub fn key_matches_thumbprint(&self) -> bool {
        self.public_key.thumbprint(self.algorithm) == self.thumbprint
    }
}

/// Binds a caller-supplied public key to a thumbprint for verification.
///
/// No I/O takes place. Equality between `thumbprint` and the key's own
/// thumbprint is not checked here; see
/// [`VerifierHandle::key_matches_thumbprint`].
#[must_use]
pub fn bind_verifier(
    thumbprint: &str,
    public_key: PublicKey,
    algorithm: ThumbprintAlgorithm,
) -> VerifierHandle {
    VerifierHandle {
        thumbprint: thumbprint.to_string(),
        algorithm,
        public_key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tests::generate_private_key;

    const ED25519_THUMBPRINT: &str = "kPrK_qmxVWaYVA9wwBF6Iuo3vVzz7TxHCTwXBygrS4k";

    #[test]
    fn test_resolve_sha256_reference() {
        let (alg, thumbprint) =
            resolve(&format!("sha256-{ED25519_THUMBPRINT}")).expect("should resolve");
        assert_eq!(alg, ThumbprintAlgorithm::Sha256);
        assert_eq!(thumbprint, ED25519_THUMBPRINT);
    }

    #[test]
    fn test_resolve_keeps_thumbprint_verbatim() {
        let public_key = generate_private_key().public_key();
        for alg in ThumbprintAlgorithm::ALL {
            let reference = KeyReference::for_key(&public_key, alg).to_string();
            let (resolved_alg, thumbprint) = resolve(&reference).expect("should resolve");
            assert_eq!(resolved_alg, alg);
            assert_eq!(thumbprint, public_key.thumbprint(alg));
            assert_eq!(reference, format!("{}-{}", alg.tag(), thumbprint));
        }
    }

    #[test]
    fn test_thumbprint_may_contain_separator() {
        // 32 bytes whose base64url encoding contains '-'
        let thumbprint = general_purpose::URL_SAFE_NO_PAD.encode([0xfb; 32]);
        assert!(thumbprint.contains('-'));
        let reference: KeyReference = format!("sha256-{thumbprint}")
            .parse()
            .expect("should parse");
        assert_eq!(reference.thumbprint(), thumbprint);
    }

    #[test]
    fn test_malformed_references() {
        for reference in [
            "",
            "sha256",
            "sha256-",
            "md5-abc",
            "SHA256-kPrK_qmxVWaYVA9wwBF6Iuo3vVzz7TxHCTwXBygrS4k",
            "sha256:kPrK_qmxVWaYVA9wwBF6Iuo3vVzz7TxHCTwXBygrS4k",
            "kPrK_qmxVWaYVA9wwBF6Iuo3vVzz7TxHCTwXBygrS4k",
            "sha256-not*base64",
            // right encoding, wrong digest length for the algorithm
            "sha512-kPrK_qmxVWaYVA9wwBF6Iuo3vVzz7TxHCTwXBygrS4k",
        ] {
            let err = resolve(reference).expect_err("should reject malformed reference");
            assert!(
                matches!(err.current_context(), AuthError::MalformedReference { .. }),
                "unexpected error for {reference:?}: {err:?}"
            );
        }
    }

    #[test]
    fn test_bind_verifier_does_not_enforce_thumbprint() {
        let public_key = generate_private_key().public_key();
        let handle = bind_verifier(
            ED25519_THUMBPRINT,
            public_key.clone(),
            ThumbprintAlgorithm::Sha256,
        );
        assert_eq!(handle.thumbprint(), ED25519_THUMBPRINT);
        assert!(!handle.key_matches_thumbprint());

        let thumbprint = public_key.thumbprint(ThumbprintAlgorithm::Sha384);
        let handle = bind_verifier(&thumbprint, public_key, ThumbprintAlgorithm::Sha384);
        assert!(handle.key_matches_thumbprint());
    }
}
