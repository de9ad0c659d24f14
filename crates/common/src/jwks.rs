//! JSON Web Key Set publication for the token signing keys.
//!
//! Relying parties fetch the set to validate tokens themselves. During a
//! rotation window it holds both the primary and the secondary key.

use error_stack::{Report, ResultExt};
use jose_jwk::{
    jose_jwa::{Algorithm, Signing},
    Ec, EcCurves, Jwk, JwkSet, Key, Okp, OkpCurves, Parameters,
};

use crate::error::AuthError;
use crate::keys::{KeyPair, KeyPairSet, PublicKey};

impl PublicKey {
    /// Public JWK for this key, without private material.
    #[must_use]
    pub fn to_jwk(&self, kid: Option<String>) -> Jwk {
        let (key, alg) = match self {
            Self::EcP256 { x, y, .. } => (
                Key::Ec(Ec {
                    crv: EcCurves::P256,
                    x: x.to_vec().into(),
                    y: y.to_vec().into(),
                    d: None,
                }),
                Signing::Es256,
            ),
            Self::Ed25519(key) => (
                Key::Okp(Okp {
                    crv: OkpCurves::Ed25519,
                    x: key.as_bytes().to_vec().into(),
                    d: None,
                }),
                Signing::EdDsa,
            ),
        };

        Jwk {
            key,
            prm: Parameters {
                kid,
                alg: Some(Algorithm::Signing(alg)),
                ..Default::default()
            },
        }
    }
}

impl KeyPair {
    #[must_use]
    pub fn jwk(&self) -> Jwk {
        self.public_key.to_jwk(Some(self.kid.clone()))
    }
}

impl KeyPairSet {
    /// Active public keys, primary first.
    #[must_use]
    pub fn jwks(&self) -> JwkSet {
        JwkSet {
            keys: self.active().map(KeyPair::jwk).collect(),
        }
    }

    /// Serializes [`KeyPairSet::jwks`] as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InternalCryptoError`] if serialization fails.
    pub fn jwks_json(&self) -> Result<String, Report<AuthError>> {
        serde_json::to_string(&self.jwks()).change_context(AuthError::InternalCryptoError {
            message: "Failed to serialize JWKS".into(),
        })
    }
}
