//! Proof-of-possession request authentication and session tokens.
//!
//! This crate verifies HTTP requests signed with a caller's registered key and
//! issues short-lived session tokens that keep validating across a rotation
//! of the server's own signing key.
//!
//! # Modules
//!
//! - [`authenticator`]: Composition root wiring settings and key pairs into the checks
//! - [`constants`]: Header names and signature component identifiers
//! - [`digest`]: `Content-Digest` validation
//! - [`error`]: Error types and HTTP status mapping
//! - [`jwks`]: JSON Web Key Set publication
//! - [`key_resolver`]: Key reference parsing and verifier binding
//! - [`keys`]: JWK-shaped key material and thumbprints
//! - [`logging`]: Logger initialization
//! - [`settings`]: Configuration management and validation
//! - [`signature`]: HTTP message signature verification
//! - [`test_support`]: Testing utilities
//! - [`token`]: Session token issuing and key-rotation-aware validation

pub mod authenticator;
pub mod constants;
pub mod digest;
pub mod error;
pub mod jwks;
pub mod key_resolver;
pub mod keys;
pub mod logging;
pub mod settings;
pub mod signature;
pub mod test_support;
pub mod token;

pub use authenticator::{AuthenticatedRequest, RequestAuthenticator};
pub use error::{AuthError, IntoHttpResponse};
