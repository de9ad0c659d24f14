//! Error types for request and token verification.
//!
//! Every fallible operation in this crate returns a
//! [`Report<AuthError>`](error_stack::Report). The current context of the
//! report is always one of the [`AuthError`] kinds below; callers branch on
//! `report.current_context()` and never on attachment text.

use core::error::Error;

use derive_more::Display;
use http::StatusCode;

/// Failure kinds reported by the verification engine.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The key reference does not parse into an algorithm and a thumbprint.
    #[display("Malformed key reference: {message}")]
    MalformedReference { message: String },

    /// A request body was sent without a `Content-Digest` header.
    #[display("Content-Digest header is missing")]
    DigestMissing,

    /// The `Content-Digest` header does not match the request body.
    #[display("Content-Digest does not match the request body")]
    DigestMismatch,

    /// `Signature-Input` or `Signature` could not be parsed.
    #[display("Malformed signature header: {message}")]
    MalformedSignatureHeader { message: String },

    /// A covered component cannot be resolved against the request.
    #[display("Unknown covered field: {field}")]
    UnknownCoveredField { field: String },

    /// A component required by policy is not covered by the signature.
    #[display("Required field is not covered by the signature: {field}")]
    MissingCoveredField { field: String },

    /// Cryptographic verification failed under every attempted encoding or key.
    #[display("Invalid signature")]
    InvalidSignature,

    /// The supplied public key does not hash to the referenced thumbprint.
    #[display("Public key does not match the referenced thumbprint")]
    ThumbprintMismatch,

    /// The token `exp` claim has elapsed.
    #[display("Token expired")]
    ExpiredToken,

    /// The token `iss` claim does not equal the expected issuer.
    #[display("Token issuer mismatch")]
    IssuerMismatch,

    /// The token cannot be parsed or decoded.
    #[display("Malformed token: {message}")]
    MalformedToken { message: String },

    /// The token or signature names an algorithm other than the expected one.
    #[display("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// The supplied key material is not a supported key type.
    #[display("Unsupported key: {message}")]
    UnsupportedKey { message: String },

    /// The underlying cryptographic primitive faulted.
    #[display("Internal crypto error: {message}")]
    InternalCryptoError { message: String },

    /// Settings could not be loaded or failed validation.
    #[display("Configuration error: {message}")]
    Configuration { message: String },
}

impl Error for AuthError {}

impl AuthError {
    /// Returns `true` for the only failure kind the retry policies act on.
    #[must_use]
    pub fn is_invalid_signature(&self) -> bool {
        matches!(self, Self::InvalidSignature)
    }
}

/// Trait for converting errors to HTTP responses.
///
/// The verification engine never writes responses itself; the surrounding
/// request layer uses this to pick a status and a safe message.
pub trait IntoHttpResponse {
    /// Get the HTTP status code for this error.
    fn status_code(&self) -> StatusCode;

    /// Get the user-facing error message.
    fn user_message(&self) -> String;
}

impl IntoHttpResponse for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedReference { .. }
            | Self::DigestMissing
            | Self::MalformedSignatureHeader { .. }
            | Self::UnknownCoveredField { .. }
            | Self::MissingCoveredField { .. }
            | Self::UnsupportedKey { .. } => StatusCode::BAD_REQUEST,
            Self::DigestMismatch
            | Self::InvalidSignature
            | Self::ThumbprintMismatch
            | Self::ExpiredToken
            | Self::IssuerMismatch
            | Self::MalformedToken { .. }
            | Self::UnsupportedAlgorithm { .. } => StatusCode::UNAUTHORIZED,
            Self::InternalCryptoError { .. } | Self::Configuration { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn user_message(&self) -> String {
        match self {
            // Server-side faults must not leak internals
            Self::InternalCryptoError { .. } | Self::Configuration { .. } => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}
