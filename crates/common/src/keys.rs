//! JWK-shaped key material.
//!
//! Public keys arrive as JWK JSON supplied by the caller (request signatures)
//! or are derived from the server's own private keys (session tokens). Key
//! pairs are never generated or stored here.

use core::fmt;
use core::str::FromStr;

use base64::{engine::general_purpose, Engine};
use error_stack::{Report, ResultExt};
use jose_jwk::{EcCurves, Jwk, Key, OkpCurves};
use jsonwebtoken::{DecodingKey, EncodingKey};
use p256::pkcs8::EncodePrivateKey as _;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::AuthError;

/// Hash algorithm used to compute a key thumbprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThumbprintAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl ThumbprintAlgorithm {
    /// Every supported algorithm, in the order references are matched.
    pub const ALL: [Self; 3] = [Self::Sha256, Self::Sha384, Self::Sha512];

    /// Tag used as the key reference prefix.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Length in bytes of the digest this algorithm produces.
    #[must_use]
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    #[must_use]
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl fmt::Display for ThumbprintAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ThumbprintAlgorithm {
    type Err = Report<AuthError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.tag() == s)
            .ok_or_else(|| {
                Report::new(AuthError::MalformedReference {
                    message: format!("unknown thumbprint algorithm '{s}'"),
                })
            })
    }
}

/// A caller's or the server's public key.
#[derive(Clone)]
pub enum PublicKey {
    /// ECDSA over NIST P-256. Coordinates are kept for thumbprints and JWKs.
    EcP256 {
        key: p256::ecdsa::VerifyingKey,
        x: [u8; 32],
        y: [u8; 32],
    },
    /// Ed25519 (OKP).
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    /// Parses a public key from its JWK JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedKey`] if the JSON is not a JWK, carries
    /// private material, or names a key type other than EC P-256 or OKP Ed25519.
    pub fn from_jwk(jwk_json: &str) -> Result<Self, Report<AuthError>> {
        let jwk: Jwk =
            serde_json::from_str(jwk_json).change_context(AuthError::UnsupportedKey {
                message: "public key is not a valid JWK".into(),
            })?;
        Self::from_jose_jwk(&jwk)
    }

    /// Converts a parsed [`Jwk`] into a public key.
    ///
    /// # Errors
    ///
    /// See [`PublicKey::from_jwk`].
    pub fn from_jose_jwk(jwk: &Jwk) -> Result<Self, Report<AuthError>> {
        match &jwk.key {
            Key::Ec(ec) if matches!(ec.crv, EcCurves::P256) => {
                if ec.d.is_some() {
                    return Err(Report::new(AuthError::UnsupportedKey {
                        message: "public JWK must not carry a private component".into(),
                    }));
                }
                let x: [u8; 32] = ec.x[..].try_into().map_err(|_| {
                    Report::new(AuthError::UnsupportedKey {
                        message: "P-256 'x' coordinate must be 32 bytes".into(),
                    })
                })?;
                let y: [u8; 32] = ec.y[..].try_into().map_err(|_| {
                    Report::new(AuthError::UnsupportedKey {
                        message: "P-256 'y' coordinate must be 32 bytes".into(),
                    })
                })?;

                let mut sec1 = Vec::with_capacity(65);
                sec1.push(0x04);
                sec1.extend_from_slice(&x);
                sec1.extend_from_slice(&y);
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1).change_context(
                    AuthError::UnsupportedKey {
                        message: "P-256 coordinates are not a point on the curve".into(),
                    },
                )?;

                Ok(Self::EcP256 { key, x, y })
            }
            Key::Okp(okp) if matches!(okp.crv, OkpCurves::Ed25519) => {
                if okp.d.is_some() {
                    return Err(Report::new(AuthError::UnsupportedKey {
                        message: "public JWK must not carry a private component".into(),
                    }));
                }
                let x: [u8; 32] = okp.x[..].try_into().map_err(|_| {
                    Report::new(AuthError::UnsupportedKey {
                        message: "Ed25519 public key must be 32 bytes".into(),
                    })
                })?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&x).change_context(
                    AuthError::UnsupportedKey {
                        message: "invalid Ed25519 public key".into(),
                    },
                )?;
                Ok(Self::Ed25519(key))
            }
            _ => Err(Report::new(AuthError::UnsupportedKey {
                message: "only EC P-256 and OKP Ed25519 keys are supported".into(),
            })),
        }
    }

    /// Wraps a P-256 verifying key.
    #[must_use]
    pub fn from_p256(key: p256::ecdsa::VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let bytes = point.as_bytes();
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        // Uncompressed SEC1: 0x04 || x || y
        x.copy_from_slice(&bytes[1..33]);
        y.copy_from_slice(&bytes[33..65]);
        Self::EcP256 { key, x, y }
    }

    /// Returns the RFC 7638 canonical JSON the thumbprint is computed over.
    #[must_use]
    pub fn thumbprint_input(&self) -> String {
        let b64 = general_purpose::URL_SAFE_NO_PAD;
        match self {
            Self::EcP256 { x, y, .. } => format!(
                r#"{{"crv":"P-256","kty":"EC","x":"{}","y":"{}"}}"#,
                b64.encode(x),
                b64.encode(y)
            ),
            Self::Ed25519(key) => format!(
                r#"{{"crv":"Ed25519","kty":"OKP","x":"{}"}}"#,
                b64.encode(key.as_bytes())
            ),
        }
    }

    /// Computes the base64url RFC 7638 thumbprint of this key.
    #[must_use]
    pub fn thumbprint(&self, algorithm: ThumbprintAlgorithm) -> String {
        let digest = algorithm.digest(self.thumbprint_input().as_bytes());
        general_purpose::URL_SAFE_NO_PAD.encode(digest)
    }

    pub(crate) fn decoding_key(&self) -> Result<DecodingKey, Report<AuthError>> {
        match self {
            Self::EcP256 { x, y, .. } => {
                let b64 = general_purpose::URL_SAFE_NO_PAD;
                DecodingKey::from_ec_components(&b64.encode(x), &b64.encode(y)).change_context(
                    AuthError::InternalCryptoError {
                        message: "failed to build token decoding key".into(),
                    },
                )
            }
            Self::Ed25519(_) => Err(Report::new(AuthError::UnsupportedKey {
                message: "session tokens require a P-256 key".into(),
            })),
        }
    }

    /// RFC 9421 `alg` parameter value for signatures made with this key.
    #[must_use]
    pub fn http_signature_algorithm(&self) -> &'static str {
        match self {
            Self::EcP256 { .. } => "ecdsa-p256-sha256",
            Self::Ed25519(_) => "ed25519",
        }
    }

    /// Short name of the key type, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EcP256 { .. } => "EC P-256",
            Self::Ed25519(_) => "OKP Ed25519",
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("kind", &self.kind())
            .field("thumbprint", &self.thumbprint(ThumbprintAlgorithm::Sha256))
            .finish()
    }
}

/// The server's P-256 token signing key.
#[derive(Clone)]
pub struct PrivateKey {
    key: p256::ecdsa::SigningKey,
}

impl PrivateKey {
    /// Parses a private key from a JWK carrying the `d` parameter.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedKey`] if the JWK is not an EC P-256
    /// private key.
    pub fn from_jwk(jwk_json: &str) -> Result<Self, Report<AuthError>> {
        let secret =
            p256::SecretKey::from_jwk_str(jwk_json).change_context(AuthError::UnsupportedKey {
                message: "private key is not an EC P-256 JWK".into(),
            })?;
        Ok(Self {
            key: p256::ecdsa::SigningKey::from(secret),
        })
    }

    #[must_use]
    pub fn from_signing_key(key: p256::ecdsa::SigningKey) -> Self {
        Self { key }
    }

    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_p256(p256::ecdsa::VerifyingKey::from(&self.key))
    }

    #[cfg(test)]
    pub(crate) fn signing_key(&self) -> &p256::ecdsa::SigningKey {
        &self.key
    }

    pub(crate) fn encoding_key(&self) -> Result<EncodingKey, Report<AuthError>> {
        let der = self
            .key
            .to_pkcs8_der()
            .change_context(AuthError::InternalCryptoError {
                message: "failed to encode signing key as PKCS#8".into(),
            })?;
        Ok(EncodingKey::from_ec_der(der.as_bytes()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey").finish_non_exhaustive()
    }
}

/// A server signing key and its public half, identified by `kid`.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub kid: String,
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    #[must_use]
    pub fn new(kid: impl Into<String>, private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        Self {
            kid: kid.into(),
            private_key,
            public_key,
        }
    }

    /// Builds a key pair from a private JWK.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedKey`] if the JWK cannot be parsed.
    pub fn from_jwk(kid: impl Into<String>, private_jwk: &str) -> Result<Self, Report<AuthError>> {
        Ok(Self::new(kid, PrivateKey::from_jwk(private_jwk)?))
    }
}

/// The primary key pair plus, during a rotation window, the secondary one.
///
/// Both pairs sign for the same issuer. At most two public keys are ever
/// considered when validating a token.
#[derive(Debug, Clone)]
pub struct KeyPairSet {
    pub issuer: String,
    pub primary: KeyPair,
    pub secondary: Option<KeyPair>,
}

impl KeyPairSet {
    #[must_use]
    pub fn new(issuer: impl Into<String>, primary: KeyPair) -> Self {
        Self {
            issuer: issuer.into(),
            primary,
            secondary: None,
        }
    }

    #[must_use]
    pub fn with_secondary(mut self, secondary: KeyPair) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Iterates the active key pairs, primary first.
    pub fn active(&self) -> impl Iterator<Item = &KeyPair> {
        core::iter::once(&self.primary).chain(self.secondary.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tests::{generate_ed25519_key, generate_private_key};

    #[test]
    fn test_thumbprint_algorithm_from_str() {
        assert_eq!(
            "sha384".parse::<ThumbprintAlgorithm>().expect("should parse"),
            ThumbprintAlgorithm::Sha384
        );
        let err = "md5".parse::<ThumbprintAlgorithm>().expect_err("should reject md5");
        assert!(matches!(
            err.current_context(),
            AuthError::MalformedReference { .. }
        ));
    }

    #[test]
    fn test_rfc7638_example_thumbprint() {
        // RFC 8037 appendix A.3
        let jwk = r#"{"kty":"OKP","crv":"Ed25519","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}"#;
        let key = PublicKey::from_jwk(jwk).expect("should parse Ed25519 JWK");
        assert_eq!(
            key.thumbprint(ThumbprintAlgorithm::Sha256),
            "kPrK_qmxVWaYVA9wwBF6Iuo3vVzz7TxHCTwXBygrS4k"
        );
    }

    #[test]
    fn test_ec_jwk_round_trips_through_thumbprint() {
        let private_key = generate_private_key();
        let public_key = private_key.public_key();
        let jwk = crate::test_support::tests::public_jwk_json(&public_key);

        let parsed = PublicKey::from_jwk(&jwk).expect("should parse EC JWK");
        for alg in ThumbprintAlgorithm::ALL {
            let thumbprint = parsed.thumbprint(alg);
            assert_eq!(thumbprint, public_key.thumbprint(alg));
            let decoded = general_purpose::URL_SAFE_NO_PAD
                .decode(&thumbprint)
                .expect("should be base64url");
            assert_eq!(decoded.len(), alg.digest_len());
        }
    }

    #[test]
    fn test_ed25519_key_parses() {
        let signing_key = generate_ed25519_key();
        let public_key = PublicKey::Ed25519(signing_key.verifying_key());
        let jwk = crate::test_support::tests::public_jwk_json(&public_key);

        let parsed = PublicKey::from_jwk(&jwk).expect("should parse OKP JWK");
        assert_eq!(parsed.kind(), "OKP Ed25519");
        assert!(parsed.decoding_key().is_err(), "tokens are P-256 only");
    }

    #[test]
    fn test_rejects_private_material_in_public_jwk() {
        let jwk = r#"{"kty":"OKP","crv":"Ed25519","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo","d":"nWGxne_9WmC6hEr0kuwsxERJxWl7MmkZcDusAxyuf2A"}"#;
        let err = PublicKey::from_jwk(jwk).expect_err("should reject private JWK");
        assert!(matches!(
            err.current_context(),
            AuthError::UnsupportedKey { .. }
        ));
    }

    #[test]
    fn test_rejects_unsupported_key_types() {
        let rsa = r#"{"kty":"RSA","n":"AQAB","e":"AQAB"}"#;
        assert!(PublicKey::from_jwk(rsa).is_err());
        assert!(PublicKey::from_jwk("not json").is_err());
    }

    #[test]
    fn test_private_key_from_jwk() {
        let jwk = r#"{"kty":"EC","crv":"P-256","x":"f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU","y":"x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0","d":"jpsQnnGQmL-YBIffH1136cspYG6-0iY7X1fCE9-E9LI"}"#;
        let pair = KeyPair::from_jwk("k1", jwk).expect("should parse private JWK");
        assert_eq!(pair.kid, "k1");
        let expected = PublicKey::from_jwk(
            r#"{"kty":"EC","crv":"P-256","x":"f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU","y":"x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0"}"#,
        )
        .expect("should parse public JWK");
        assert_eq!(
            pair.public_key.thumbprint(ThumbprintAlgorithm::Sha256),
            expected.thumbprint(ThumbprintAlgorithm::Sha256)
        );
        assert!(pair.private_key.encoding_key().is_ok());
    }

    #[test]
    fn test_key_pair_set_yields_at_most_two_keys() {
        let set = KeyPairSet::new("issuer", KeyPair::new("a", generate_private_key()));
        assert_eq!(set.active().count(), 1);

        let set = set.with_secondary(KeyPair::new("b", generate_private_key()));
        let kids: Vec<&str> = set.active().map(|pair| pair.kid.as_str()).collect();
        assert_eq!(kids, vec!["a", "b"]);
    }
}
