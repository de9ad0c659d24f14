use std::time::Duration;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use jsonwebtoken::{Algorithm, Header};
use uuid::Uuid;

use super::{Payload, TokenClaims, RESERVED_CLAIMS};
use crate::error::AuthError;
use crate::keys::KeyPair;

/// Issues a token signed with `key_pair`, valid for `ttl` from now.
///
/// # Errors
///
/// See [`issue_at`].
pub fn issue(
    issuer: &str,
    key_pair: &KeyPair,
    payload: &Payload,
    ttl: Duration,
) -> Result<String, Report<AuthError>> {
    issue_at(issuer, key_pair, payload, ttl, Utc::now())
}

/// Issues a token as of `now`.
///
/// `iat` is `now` in whole seconds and `exp` is `iat` plus the whole seconds
/// of `ttl`. The header carries the key pair's `kid`. Payload entries named
/// like a standard claim are dropped.
///
/// # Errors
///
/// - [`AuthError::Configuration`] if `ttl` does not fit a timestamp
/// - [`AuthError::InternalCryptoError`] if signing fails or produces
///   something other than a three-part compact JWS
pub fn issue_at(
    issuer: &str,
    key_pair: &KeyPair,
    payload: &Payload,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<String, Report<AuthError>> {
    let iat = now.timestamp();
    let exp = i64::try_from(ttl.as_secs())
        .ok()
        .and_then(|ttl| iat.checked_add(ttl))
        .ok_or_else(|| {
            Report::new(AuthError::Configuration {
                message: format!("token ttl of {}s is out of range", ttl.as_secs()),
            })
        })?;

    let payload: Payload = payload
        .iter()
        .filter(|(name, _)| {
            let reserved = RESERVED_CLAIMS.contains(&name.as_str());
            if reserved {
                log::debug!("Dropping reserved claim '{name}' from token payload");
            }
            !reserved
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let claims = TokenClaims {
        iss: issuer.to_string(),
        iat,
        exp,
        jti: Uuid::now_v7().to_string(),
        payload,
    };

    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(key_pair.kid.clone());

    let encoding_key = key_pair.private_key.encoding_key()?;
    let token = jsonwebtoken::encode(&header, &claims, &encoding_key).change_context(
        AuthError::InternalCryptoError {
            message: "failed to sign token".into(),
        },
    )?;

    if token.is_empty() || token.split('.').count() != 3 {
        return Err(Report::new(AuthError::InternalCryptoError {
            message: "signer produced a malformed token".into(),
        }));
    }

    log::debug!("Issued token {} with key '{}'", claims.jti, key_pair.kid);
    Ok(token)
}
