use chrono::Utc;
use error_stack::Report;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{Algorithm, Validation};

use super::{Payload, TokenClaims};
use crate::error::AuthError;
use crate::keys::PublicKey;

/// Which key verified a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySlot {
    Primary,
    Secondary,
}

/// States of a single validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    ValidatingPrimary,
    ValidatingSecondary,
}

/// What happens after a key attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Success,
    RetryWithSecondary,
    Fail,
}

/// Decides the next step after validating in `state`.
///
/// Only an invalid signature under the primary key, with a secondary key
/// available, moves on to the secondary key. Expiry, issuer, algorithm and
/// parse failures are terminal whichever key is in play.
#[must_use]
pub fn transition(
    state: RotationState,
    outcome: Result<(), &AuthError>,
    has_secondary: bool,
) -> Transition {
    match (state, outcome) {
        (_, Ok(())) => Transition::Success,
        (RotationState::ValidatingPrimary, Err(failure))
            if has_secondary && failure.is_invalid_signature() =>
        {
            Transition::RetryWithSecondary
        }
        (_, Err(_)) => Transition::Fail,
    }
}

/// A token that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedToken {
    pub claims: TokenClaims,
    pub verified_by: KeySlot,
    /// Number of keys tried, 1 or 2.
    pub attempts: u8,
}

impl ValidatedToken {
    /// The token payload with the standard claims merged in.
    #[must_use]
    pub fn payload(&self) -> Payload {
        self.claims.merged()
    }
}

/// Validates `token` against the primary key and, on an invalid signature,
/// the secondary key.
///
/// # Errors
///
/// - [`AuthError::InvalidSignature`] if no supplied key verifies the token
/// - [`AuthError::IssuerMismatch`] if `iss` is missing or differs from `issuer`
/// - [`AuthError::ExpiredToken`] if `exp` has passed (no leeway); checked after
///   the issuer
/// - [`AuthError::UnsupportedAlgorithm`] if the header does not name ES256
/// - [`AuthError::MalformedToken`] if the token cannot be decoded
/// - [`AuthError::UnsupportedKey`] or [`AuthError::InternalCryptoError`] for
///   unusable key material
pub fn validate(
    issuer: &str,
    primary: &PublicKey,
    secondary: Option<&PublicKey>,
    token: &str,
) -> Result<ValidatedToken, Report<AuthError>> {
    let primary_outcome = attempt(issuer, primary, token);
    let step = transition(
        RotationState::ValidatingPrimary,
        primary_outcome
            .as_ref()
            .map(|_| ())
            .map_err(|report| report.current_context()),
        secondary.is_some(),
    );

    match (step, secondary) {
        (Transition::RetryWithSecondary, Some(secondary)) => {
            log::debug!("Primary key rejected token signature, retrying with secondary key");
            let secondary_outcome = attempt(issuer, secondary, token);
            let step = transition(
                RotationState::ValidatingSecondary,
                secondary_outcome
                    .as_ref()
                    .map(|_| ())
                    .map_err(|report| report.current_context()),
                true,
            );
            if step == Transition::Success {
                log::info!("Token validated with secondary key");
            }
            secondary_outcome
                .map(|claims| ValidatedToken {
                    claims,
                    verified_by: KeySlot::Secondary,
                    attempts: 2,
                })
                .map_err(|report| report.attach("primary key: invalid signature"))
        }
        _ => primary_outcome.map(|claims| ValidatedToken {
            claims,
            verified_by: KeySlot::Primary,
            attempts: 1,
        }),
    }
}

fn attempt(
    issuer: &str,
    public_key: &PublicKey,
    token: &str,
) -> Result<TokenClaims, Report<AuthError>> {
    let decoding_key = public_key.decoding_key()?;

    // Signature and algorithm are checked here; issuer and expiry below.
    let mut validation = Validation::new(Algorithm::ES256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp"]);

    let claims = jsonwebtoken::decode::<TokenClaims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            let error = classify(&e, token);
            log::debug!("Token rejected: {error}");
            Report::new(error).attach(e.to_string())
        })?;

    if claims.iss.is_empty() || claims.iss != issuer {
        log::debug!("Token rejected: issuer '{}' is not '{issuer}'", claims.iss);
        return Err(Report::new(AuthError::IssuerMismatch)
            .attach(format!("expected '{issuer}', got '{}'", claims.iss)));
    }

    if claims.exp < Utc::now().timestamp() {
        log::debug!("Token rejected: expired at {}", claims.exp);
        return Err(Report::new(AuthError::ExpiredToken)
            .attach(format!("expired at {}", claims.exp)));
    }

    Ok(claims)
}

/// Maps a `jsonwebtoken` failure onto [`AuthError`].
fn classify(error: &JwtError, token: &str) -> AuthError {
    match error.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidAlgorithm
        | ErrorKind::MissingAlgorithm
        | ErrorKind::InvalidAlgorithmName => AuthError::UnsupportedAlgorithm {
            algorithm: jsonwebtoken::decode_header(token)
                .map(|header| format!("{:?}", header.alg))
                .unwrap_or_else(|_| "unknown".into()),
        },
        ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat | ErrorKind::Crypto(_) => {
            AuthError::InternalCryptoError {
                message: error.to_string(),
            }
        }
        _ => AuthError::MalformedToken {
            message: error.to_string(),
        },
    }
}
