//! Composition root for request authentication and session tokens.
//!
//! [`RequestAuthenticator`] wires settings and the server's key pairs into
//! the individual verification steps. A request is checked in a fixed order:
//!
//! 1. the key reference is resolved (string work only),
//! 2. the `Content-Digest` is checked against the body,
//! 3. the caller's JWK is parsed and bound to the referenced thumbprint,
//! 4. the thumbprint binding is enforced when configured,
//! 5. the HTTP message signature is verified.
//!
//! The first failing step ends the request.

use std::time::Duration;

use error_stack::Report;
use jose_jwk::JwkSet;

use crate::constants::COMPONENT_CONTENT_DIGEST;
use crate::digest::{check_digest, DigestCheck, DigestPolicy};
use crate::error::AuthError;
use crate::key_resolver::{bind_verifier, KeyReference};
use crate::keys::{KeyPairSet, PublicKey};
use crate::settings::Settings;
use crate::signature::{verify_request_signature, SignedRequest, VerifiedSignature};
use crate::token::{self, Payload, ValidatedToken};

/// A request whose signature verified.
#[derive(Debug, Clone)]
pub struct AuthenticatedRequest {
    pub key_reference: KeyReference,
    pub public_key: PublicKey,
    pub digest: DigestCheck,
    pub signature: VerifiedSignature,
}

/// Authenticates signed requests and issues or validates session tokens.
#[derive(Debug, Clone)]
pub struct RequestAuthenticator {
    keys: KeyPairSet,
    token_ttl: Duration,
    required_components: Vec<String>,
    enforce_thumbprint_binding: bool,
    digest_policy: DigestPolicy,
}

impl RequestAuthenticator {
    /// Creates an authenticator from settings and the server's key pairs.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the key pairs were loaded for a
    /// different issuer than the one configured.
    pub fn new(settings: &Settings, keys: KeyPairSet) -> Result<Self, Report<AuthError>> {
        if keys.issuer != settings.token.issuer {
            return Err(Report::new(AuthError::Configuration {
                message: format!(
                    "key pairs belong to issuer '{}' but settings name '{}'",
                    keys.issuer, settings.token.issuer
                ),
            }));
        }

        log::info!(
            "Request authenticator ready for issuer '{}' (primary key '{}', secondary key {})",
            keys.issuer,
            keys.primary.kid,
            keys.secondary
                .as_ref()
                .map_or_else(|| "none".to_string(), |pair| format!("'{}'", pair.kid))
        );

        Ok(Self {
            keys,
            token_ttl: settings.token_ttl(),
            required_components: settings.signature.required_components.clone(),
            enforce_thumbprint_binding: settings.signature.enforce_thumbprint_binding,
            digest_policy: DigestPolicy {
                allow_bodyless_without_digest: settings.signature.allow_bodyless_without_digest,
            },
        })
    }

    #[must_use]
    pub fn keys(&self) -> &KeyPairSet {
        &self.keys
    }

    /// Authenticates `request` as signed by the key named by `key_reference`.
    ///
    /// `public_jwk` is the caller's public key as JWK JSON.
    ///
    /// # Errors
    ///
    /// Returns the first failure among [`AuthError::MalformedReference`],
    /// [`AuthError::DigestMissing`], [`AuthError::DigestMismatch`],
    /// [`AuthError::UnsupportedKey`], [`AuthError::ThumbprintMismatch`] and the
    /// errors of [`verify_request_signature`].
    pub fn authenticate_request(
        &self,
        request: &SignedRequest,
        key_reference: &str,
        public_jwk: &str,
    ) -> Result<AuthenticatedRequest, Report<AuthError>> {
        let reference: KeyReference = key_reference.parse()?;

        let content_digest = request.content_digest();
        let digest = check_digest(content_digest.as_deref(), request.body(), self.digest_policy)?;

        let public_key = PublicKey::from_jwk(public_jwk)?;
        let handle = bind_verifier(reference.thumbprint(), public_key, reference.algorithm());

        if self.enforce_thumbprint_binding && !handle.key_matches_thumbprint() {
            log::warn!(
                "Public key ({}) does not match referenced thumbprint {}",
                handle.public_key().kind(),
                reference
            );
            return Err(Report::new(AuthError::ThumbprintMismatch));
        }

        let covered_fields = self.covered_fields(request);
        let signature = verify_request_signature(request, &handle, &covered_fields)?;

        log::debug!("Authenticated request signed by {reference}");

        Ok(AuthenticatedRequest {
            key_reference: reference,
            public_key: handle.public_key().clone(),
            digest,
            signature,
        })
    }

    /// Components the signature must cover for `request`. The digest is
    /// required whenever the request carries a body or declares one.
    fn covered_fields<'a>(&'a self, request: &SignedRequest) -> Vec<&'a str> {
        let mut fields: Vec<&str> = self
            .required_components
            .iter()
            .map(String::as_str)
            .collect();
        let has_digest = request.body().is_some() || request.content_digest().is_some();
        if has_digest && !fields.contains(&COMPONENT_CONTENT_DIGEST) {
            fields.push(COMPONENT_CONTENT_DIGEST);
        }
        fields
    }

    /// Issues a session token signed with the primary key.
    ///
    /// # Errors
    ///
    /// See [`token::issue`].
    pub fn issue_token(&self, payload: &Payload) -> Result<String, Report<AuthError>> {
        token::issue(
            &self.keys.issuer,
            &self.keys.primary,
            payload,
            self.token_ttl,
        )
    }

    /// Validates a session token, falling back to the secondary key during
    /// rotation.
    ///
    /// # Errors
    ///
    /// See [`token::validate`].
    pub fn validate_token(&self, token: &str) -> Result<ValidatedToken, Report<AuthError>> {
        token::validate(
            &self.keys.issuer,
            &self.keys.primary.public_key,
            self.keys.secondary.as_ref().map(|pair| &pair.public_key),
            token,
        )
    }

    /// Public keys for relying parties.
    #[must_use]
    pub fn jwks(&self) -> JwkSet {
        self.keys.jwks()
    }
}
