use http::header::HeaderName;

pub const HEADER_CONTENT_DIGEST: HeaderName = HeaderName::from_static("content-digest");
pub const HEADER_SIGNATURE: HeaderName = HeaderName::from_static("signature");
pub const HEADER_SIGNATURE_INPUT: HeaderName = HeaderName::from_static("signature-input");

pub const COMPONENT_METHOD: &str = "@method";
pub const COMPONENT_TARGET_URI: &str = "@target-uri";
pub const COMPONENT_AUTHORITY: &str = "@authority";
pub const COMPONENT_SCHEME: &str = "@scheme";
pub const COMPONENT_PATH: &str = "@path";
pub const COMPONENT_QUERY: &str = "@query";
pub const COMPONENT_CONTENT_DIGEST: &str = "content-digest";
pub const COMPONENT_SIGNATURE_PARAMS: &str = "@signature-params";
