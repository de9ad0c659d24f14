//! Short-lived session tokens.
//!
//! Tokens are compact ES256 JWS strings whose claims are the caller's payload
//! plus `iss`, `iat`, `exp` and `jti`. Validation accepts the primary key and,
//! during a rotation window, falls back to the secondary key only when the
//! primary key rejected the signature itself.

pub mod issuer;
pub mod validator;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use issuer::{issue, issue_at};
pub use validator::{transition, validate, KeySlot, RotationState, Transition, ValidatedToken};

/// Custom claims carried by a token.
pub type Payload = Map<String, Value>;

/// Claim names set by the issuer. Payload entries with these names are dropped.
pub const RESERVED_CLAIMS: [&str; 4] = ["iss", "iat", "exp", "jti"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Empty when the token carries no `iss`; validation rejects it.
    #[serde(default)]
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(flatten)]
    pub payload: Payload,
}

impl TokenClaims {
    /// The payload with the standard claims merged in.
    #[must_use]
    pub fn merged(&self) -> Payload {
        let mut merged = self.payload.clone();
        merged.insert("iss".into(), Value::from(self.iss.as_str()));
        merged.insert("iat".into(), Value::from(self.iat));
        merged.insert("exp".into(), Value::from(self.exp));
        merged.insert("jti".into(), Value::from(self.jti.as_str()));
        merged
    }
}
