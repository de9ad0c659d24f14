//! HTTP message signature verification (RFC 9421 subset).
//!
//! A request carries
//!
//! ```text
//! Signature-Input: sig1=("@method" "@target-uri" "content-digest");created=1700000000;keyid="..."
//! Signature: sig1=:MEUCIQ...:
//! ```
//!
//! The verifier rebuilds the signature base from the covered components and
//! checks the signature with the key bound in a [`VerifierHandle`]. ECDSA
//! signers disagree on how to lay out `(r, s)`, so verification is attempted
//! with DER first and IEEE P1363 second. The retry changes parsing only; the
//! key, algorithm and signed bytes are the same for both attempts.

use core::fmt;

use base64::{engine::general_purpose, Engine};
use bytes::Bytes;
use ed25519_dalek::Verifier as _;
use error_stack::Report;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::constants::{
    COMPONENT_AUTHORITY, COMPONENT_METHOD, COMPONENT_PATH, COMPONENT_QUERY, COMPONENT_SCHEME,
    COMPONENT_SIGNATURE_PARAMS, COMPONENT_TARGET_URI, HEADER_CONTENT_DIGEST, HEADER_SIGNATURE,
    HEADER_SIGNATURE_INPUT,
};
use crate::error::AuthError;
use crate::key_resolver::VerifierHandle;
use crate::keys::PublicKey;

/// An inbound request as seen by the verifier.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl SignedRequest {
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// All field lines of `name` joined with `", "`, or `None` when the
    /// header is absent or any line is not visible ASCII.
    fn header_str(&self, name: &HeaderName) -> Option<String> {
        let values = self
            .headers
            .get_all(name)
            .iter()
            .map(|v| v.to_str().map(str::trim))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        (!values.is_empty()).then(|| values.join(", "))
    }

    #[must_use]
    pub fn signature_input(&self) -> Option<String> {
        self.header_str(&HEADER_SIGNATURE_INPUT)
    }

    #[must_use]
    pub fn signature(&self) -> Option<String> {
        self.header_str(&HEADER_SIGNATURE)
    }

    #[must_use]
    pub fn content_digest(&self) -> Option<String> {
        self.header_str(&HEADER_CONTENT_DIGEST)
    }

    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

/// Byte layout of an ECDSA `(r, s)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureEncoding {
    /// ASN.1 DER `SEQUENCE { r INTEGER, s INTEGER }`.
    Der,
    /// Fixed-width `r || s`. Ed25519 signatures always use this layout.
    IeeeP1363,
}

impl fmt::Display for SignatureEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Der => f.write_str("der"),
            Self::IeeeP1363 => f.write_str("ieee-p1363"),
        }
    }
}

/// One signature's parameters from `Signature-Input`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub label: String,
    pub components: Vec<String>,
    /// Raw `;name=value` parameter list as sent by the signer.
    pub parameters: String,
}

impl SignatureParams {
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        components: Vec<String>,
        parameters: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            components,
            parameters: parameters.into(),
        }
    }

    /// Serialized inner list, as it appears after `label=`.
    #[must_use]
    pub fn serialize(&self) -> String {
        let components: Vec<String> = self
            .components
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect();
        format!("({}){}", components.join(" "), self.parameters)
    }

    /// Looks up a parameter value, unquoting strings.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        split_outside_quotes(&self.parameters, ';')
            .into_iter()
            .filter_map(|p| p.split_once('='))
            .find(|(key, _)| key.trim() == name)
            .map(|(_, value)| value.trim().trim_matches('"'))
    }

    #[must_use]
    pub fn keyid(&self) -> Option<&str> {
        self.parameter("keyid")
    }

    #[must_use]
    pub fn alg(&self) -> Option<&str> {
        self.parameter("alg")
    }
}

/// A successfully verified request signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    pub params: SignatureParams,
    pub encoding: SignatureEncoding,
}

/// Verifies the request signature with the key bound in `handle`.
///
/// `covered_fields` lists components that must be covered by the signature;
/// the signer may cover more.
///
/// # Errors
///
/// - [`AuthError::MalformedSignatureHeader`] for missing or unparsable signature headers
/// - [`AuthError::MissingCoveredField`] if a required field is not covered
/// - [`AuthError::UnknownCoveredField`] if a covered component cannot be resolved
/// - [`AuthError::UnsupportedAlgorithm`] if `alg` does not match the key type
/// - [`AuthError::InvalidSignature`] if neither encoding verifies
pub fn verify_request_signature(
    request: &SignedRequest,
    handle: &VerifierHandle,
    covered_fields: &[&str],
) -> Result<VerifiedSignature, Report<AuthError>> {
    let signature_input = request.signature_input().ok_or_else(|| {
        Report::new(AuthError::MalformedSignatureHeader {
            message: "Signature-Input header is missing".into(),
        })
    })?;
    let signature_header = request.signature().ok_or_else(|| {
        Report::new(AuthError::MalformedSignatureHeader {
            message: "Signature header is missing".into(),
        })
    })?;

    let (params, signature) = select_signature(&signature_input, &signature_header)?;

    for field in covered_fields {
        if !params.components.iter().any(|c| c.as_str() == *field) {
            return Err(Report::new(AuthError::MissingCoveredField {
                field: (*field).to_string(),
            }));
        }
    }

    let expected_alg = handle.public_key().http_signature_algorithm();
    if let Some(alg) = params.alg() {
        if alg != expected_alg {
            return Err(Report::new(AuthError::UnsupportedAlgorithm {
                algorithm: alg.to_string(),
            })
            .attach(format!("key expects '{expected_alg}'")));
        }
    }

    let base = signature_base(request, &params)?;
    let encoding = verify_with_fallback(handle.public_key(), base.as_bytes(), &signature)?;

    log::debug!(
        "Verified signature '{}' ({} key, {} encoding)",
        params.label,
        handle.public_key().kind(),
        encoding
    );

    Ok(VerifiedSignature { params, encoding })
}

/// Builds the RFC 9421 signature base for `params` over `request`.
///
/// # Errors
///
/// Returns [`AuthError::UnknownCoveredField`] if a component cannot be
/// resolved against the request.
pub fn signature_base(
    request: &SignedRequest,
    params: &SignatureParams,
) -> Result<String, Report<AuthError>> {
    let mut lines = Vec::with_capacity(params.components.len() + 1);
    for component in &params.components {
        let value = component_value(request, component)?;
        lines.push(format!("\"{component}\": {value}"));
    }
    lines.push(format!(
        "\"{COMPONENT_SIGNATURE_PARAMS}\": {}",
        params.serialize()
    ));
    Ok(lines.join("\n"))
}

fn component_value(request: &SignedRequest, component: &str) -> Result<String, Report<AuthError>> {
    let url = &request.url;
    let value = match component {
        COMPONENT_METHOD => request.method.as_str().to_string(),
        COMPONENT_TARGET_URI => url.as_str().to_string(),
        COMPONENT_AUTHORITY => {
            let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
            match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            }
        }
        COMPONENT_SCHEME => url.scheme().to_string(),
        COMPONENT_PATH => url.path().to_string(),
        COMPONENT_QUERY => format!("?{}", url.query().unwrap_or_default()),
        derived if derived.starts_with('@') => {
            return Err(Report::new(AuthError::UnknownCoveredField {
                field: derived.to_string(),
            })
            .attach("derived component is not supported"));
        }
        header => {
            let values = request
                .headers
                .get_all(header)
                .iter()
                .map(|v| v.to_str().map(str::trim))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| {
                    Report::new(AuthError::UnknownCoveredField {
                        field: header.to_string(),
                    })
                    .attach("header value is not visible ASCII")
                })?;
            if values.is_empty() {
                return Err(Report::new(AuthError::UnknownCoveredField {
                    field: header.to_string(),
                })
                .attach("covered header is not present on the request"));
            }
            values.join(", ")
        }
    };
    Ok(value)
}

#[derive(Debug)]
enum AttemptFailure {
    NotApplicable,
    Decode(String),
    Rejected(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotApplicable => f.write_str("encoding does not apply to this key type"),
            Self::Decode(msg) => write!(f, "signature bytes do not decode: {msg}"),
            Self::Rejected(msg) => write!(f, "signature rejected: {msg}"),
        }
    }
}

fn attempt(
    public_key: &PublicKey,
    encoding: SignatureEncoding,
    message: &[u8],
    signature: &[u8],
) -> Result<(), AttemptFailure> {
    match (public_key, encoding) {
        (PublicKey::EcP256 { key, .. }, SignatureEncoding::Der) => {
            let sig = p256::ecdsa::Signature::from_der(signature)
                .map_err(|e| AttemptFailure::Decode(e.to_string()))?;
            key.verify(message, &sig)
                .map_err(|e| AttemptFailure::Rejected(e.to_string()))
        }
        (PublicKey::EcP256 { key, .. }, SignatureEncoding::IeeeP1363) => {
            let sig = p256::ecdsa::Signature::from_slice(signature)
                .map_err(|e| AttemptFailure::Decode(e.to_string()))?;
            key.verify(message, &sig)
                .map_err(|e| AttemptFailure::Rejected(e.to_string()))
        }
        (PublicKey::Ed25519(_), SignatureEncoding::Der) => Err(AttemptFailure::NotApplicable),
        (PublicKey::Ed25519(key), SignatureEncoding::IeeeP1363) => {
            let sig = ed25519_dalek::Signature::from_slice(signature)
                .map_err(|e| AttemptFailure::Decode(e.to_string()))?;
            key.verify(message, &sig)
                .map_err(|e| AttemptFailure::Rejected(e.to_string()))
        }
    }
}

/// Tries DER, then exactly once more with IEEE P1363.
fn verify_with_fallback(
    public_key: &PublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<SignatureEncoding, Report<AuthError>> {
    let first = match attempt(public_key, SignatureEncoding::Der, message, signature) {
        Ok(()) => return Ok(SignatureEncoding::Der),
        Err(failure) => failure,
    };
    log::debug!("DER verification failed ({first}), retrying with IEEE P1363");

    match attempt(public_key, SignatureEncoding::IeeeP1363, message, signature) {
        Ok(()) => Ok(SignatureEncoding::IeeeP1363),
        Err(last) => {
            log::warn!("Signature verification failed under both encodings: {last}");
            Err(Report::new(AuthError::InvalidSignature)
                .attach(format!("der: {first}"))
                .attach(format!("ieee-p1363: {last}")))
        }
    }
}

/// Picks the first signature label present in both headers.
fn select_signature(
    signature_input: &str,
    signature_header: &str,
) -> Result<(SignatureParams, Vec<u8>), Report<AuthError>> {
    let signatures = parse_dictionary(signature_header)?;

    for (label, value) in parse_dictionary(signature_input)? {
        let Some((_, signature_value)) = signatures.iter().find(|(l, _)| *l == label) else {
            continue;
        };
        let params = parse_inner_list(label, value)?;
        let signature = parse_byte_sequence(signature_value)?;
        return Ok((params, signature));
    }

    Err(Report::new(AuthError::MalformedSignatureHeader {
        message: "no signature label appears in both Signature-Input and Signature".into(),
    }))
}

fn parse_dictionary(header: &str) -> Result<Vec<(&str, &str)>, Report<AuthError>> {
    split_outside_quotes(header, ',')
        .into_iter()
        .map(|member| {
            let (label, value) = member.split_once('=').ok_or_else(|| {
                Report::new(AuthError::MalformedSignatureHeader {
                    message: format!("dictionary member '{member}' has no value"),
                })
            })?;
            let label = label.trim();
            if label.is_empty() || !label.bytes().all(is_key_char) {
                return Err(Report::new(AuthError::MalformedSignatureHeader {
                    message: format!("invalid signature label '{label}'"),
                }));
            }
            Ok((label, value.trim()))
        })
        .collect()
}

fn is_key_char(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'-' | b'.' | b'*')
}

fn parse_inner_list(label: &str, value: &str) -> Result<SignatureParams, Report<AuthError>> {
    let malformed = |message: &str| {
        Report::new(AuthError::MalformedSignatureHeader {
            message: format!("Signature-Input '{label}': {message}"),
        })
    };

    let inner = value
        .strip_prefix('(')
        .ok_or_else(|| malformed("expected an inner list"))?;
    let close =
        find_outside_quotes(inner, ')').ok_or_else(|| malformed("unterminated inner list"))?;
    let (items, parameters) = (&inner[..close], inner[close + 1..].trim());

    if !parameters.is_empty() && !parameters.starts_with(';') {
        return Err(malformed("unexpected data after inner list"));
    }

    let mut components: Vec<String> = Vec::new();
    for item in items.split_ascii_whitespace() {
        let name = item
            .strip_prefix('"')
            .and_then(|i| i.strip_suffix('"'))
            .filter(|n| !n.is_empty() && !n.contains('"'))
            .ok_or_else(|| malformed("components must be quoted strings"))?;
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(malformed("component names must be lowercase"));
        }
        if components.iter().any(|c| c == name) {
            return Err(malformed("duplicate component"));
        }
        components.push(name.to_string());
    }

    Ok(SignatureParams::new(label, components, parameters))
}

fn parse_byte_sequence(value: &str) -> Result<Vec<u8>, Report<AuthError>> {
    let encoded = value
        .strip_prefix(':')
        .and_then(|v| v.strip_suffix(':'))
        .ok_or_else(|| {
            Report::new(AuthError::MalformedSignatureHeader {
                message: "signature must be a byte sequence (:base64:)".into(),
            })
        })?;

    general_purpose::STANDARD
        .decode(encoded)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(encoded))
        .map_err(|e| {
            Report::new(AuthError::MalformedSignatureHeader {
                message: format!("signature is not base64: {e}"),
            })
        })
}

fn find_outside_quotes(s: &str, target: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == target && !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Splits on `sep` where it is outside quoted strings and parentheses.
fn split_outside_quotes(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => depth = depth.saturating_sub(1),
            c if c == sep && !in_quotes && depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}
