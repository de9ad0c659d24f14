#[cfg(test)]
pub mod tests {
    use base64::{engine::general_purpose, Engine};
    use bytes::Bytes;
    use http::{HeaderValue, Method};
    use rand::rngs::OsRng;
    use url::Url;

    use crate::constants::{HEADER_CONTENT_DIGEST, HEADER_SIGNATURE, HEADER_SIGNATURE_INPUT};
    use crate::digest::{content_digest, DigestAlgorithm};
    use crate::keys::{KeyPair, KeyPairSet, PrivateKey, PublicKey};
    use crate::settings::Settings;
    use crate::signature::{signature_base, SignatureEncoding, SignatureParams, SignedRequest};

    pub const TEST_ISSUER: &str = "https://auth.test-service.com";

    pub const DEFAULT_COMPONENTS: &[&str] = &["@method", "@target-uri", "content-digest"];

    pub const TEST_BODY: &[u8] = b"{\"hello\": \"world\"}";

    pub fn crate_test_settings_str() -> String {
        r#"
            [token]
            issuer = "https://auth.test-service.com"
            ttl_secs = 900

            [signature]
            required_components = ["@method", "@target-uri"]
            enforce_thumbprint_binding = true
            allow_bodyless_without_digest = false

            [logging]
            level = "debug"
            "#
        .to_string()
    }

    pub fn create_test_settings() -> Settings {
        let toml_str = crate_test_settings_str();
        Settings::from_toml(&toml_str).expect("Invalid config")
    }

    pub fn generate_private_key() -> PrivateKey {
        PrivateKey::from_signing_key(p256::ecdsa::SigningKey::random(&mut OsRng))
    }

    pub fn generate_ed25519_key() -> ed25519_dalek::SigningKey {
        ed25519_dalek::SigningKey::generate(&mut OsRng)
    }

    pub fn test_key_pair_set() -> KeyPairSet {
        KeyPairSet::new(TEST_ISSUER, KeyPair::new("primary", generate_private_key()))
    }

    /// Serializes a public key as the JWK JSON a client would send.
    pub fn public_jwk_json(public_key: &PublicKey) -> String {
        let b64 = general_purpose::URL_SAFE_NO_PAD;
        let jwk = match public_key {
            PublicKey::EcP256 { x, y, .. } => serde_json::json!({
                "kty": "EC",
                "crv": "P-256",
                "x": b64.encode(x),
                "y": b64.encode(y),
            }),
            PublicKey::Ed25519(key) => serde_json::json!({
                "kty": "OKP",
                "crv": "Ed25519",
                "x": b64.encode(key.as_bytes()),
            }),
        };
        jwk.to_string()
    }

    /// A POST with a JSON body and matching `Content-Digest`, unsigned.
    pub fn test_request() -> SignedRequest {
        SignedRequest::new(
            Method::POST,
            Url::parse("https://api.test-service.com/v1/orders?dry_run=true").expect("valid url"),
        )
        .with_header(
            HEADER_CONTENT_DIGEST,
            HeaderValue::from_str(&content_digest(TEST_BODY, DigestAlgorithm::Sha256))
                .expect("valid header value"),
        )
        .with_body(Bytes::from_static(TEST_BODY))
    }

    fn signature_params(components: &[&str], keyid: &str, alg: &str) -> SignatureParams {
        SignatureParams::new(
            "sig1",
            components.iter().map(|c| (*c).to_string()).collect(),
            format!(";created=1700000000;keyid=\"{keyid}\";alg=\"{alg}\""),
        )
    }

    fn attach_signature(
        request: SignedRequest,
        params: &SignatureParams,
        signature: &[u8],
    ) -> SignedRequest {
        let input = format!("{}={}", params.label, params.serialize());
        let signature = format!(
            "{}=:{}:",
            params.label,
            general_purpose::STANDARD.encode(signature)
        );
        request
            .with_header(
                HEADER_SIGNATURE_INPUT,
                HeaderValue::from_str(&input).expect("valid header value"),
            )
            .with_header(
                HEADER_SIGNATURE,
                HeaderValue::from_str(&signature).expect("valid header value"),
            )
    }

    /// Signs `request` with a P-256 key, emitting `encoding`.
    pub fn sign_request(
        request: SignedRequest,
        private_key: &PrivateKey,
        components: &[&str],
        encoding: SignatureEncoding,
    ) -> SignedRequest {
        use p256::ecdsa::signature::Signer as _;

        let public_key = private_key.public_key();
        let keyid = public_key.thumbprint(crate::keys::ThumbprintAlgorithm::Sha256);
        let params = signature_params(components, &keyid, public_key.http_signature_algorithm());
        let base = signature_base(&request, &params).expect("should build signature base");

        let signature: p256::ecdsa::Signature = private_key.signing_key().sign(base.as_bytes());
        let bytes = match encoding {
            SignatureEncoding::Der => signature.to_der().as_bytes().to_vec(),
            SignatureEncoding::IeeeP1363 => signature.to_bytes().to_vec(),
        };
        attach_signature(request, &params, &bytes)
    }

    /// Signs `request` with an Ed25519 key.
    pub fn sign_request_ed25519(
        request: SignedRequest,
        signing_key: &ed25519_dalek::SigningKey,
        components: &[&str],
    ) -> SignedRequest {
        use ed25519_dalek::Signer as _;

        let public_key = PublicKey::Ed25519(signing_key.verifying_key());
        let keyid = public_key.thumbprint(crate::keys::ThumbprintAlgorithm::Sha256);
        let params = signature_params(components, &keyid, public_key.http_signature_algorithm());
        let base = signature_base(&request, &params).expect("should build signature base");

        let signature = signing_key.sign(base.as_bytes());
        attach_signature(request, &params, &signature.to_bytes())
    }
}
