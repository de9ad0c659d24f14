use core::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use log::LevelFilter;
use serde::Deserialize;
use validator::Validate;

use crate::constants::{COMPONENT_METHOD, COMPONENT_TARGET_URI};
use crate::error::AuthError;

pub const ENVIRONMENT_VARIABLE_PREFIX: &str = "POP_AUTH";
pub const ENVIRONMENT_VARIABLE_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TokenSettings {
    /// Value of the `iss` claim for issued tokens and the expected issuer on validation.
    #[validate(length(min = 1))]
    pub issuer: String,
    #[validate(range(min = 1))]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignatureSettings {
    /// Components every request signature must cover. `content-digest` is
    /// added automatically when the request carries a body or a digest.
    #[serde(default = "default_required_components")]
    #[validate(length(min = 1))]
    pub required_components: Vec<String>,
    /// Reject requests whose public key does not hash to the referenced thumbprint.
    #[serde(default = "default_true")]
    pub enforce_thumbprint_binding: bool,
    /// Skip the digest check for requests with neither body nor `Content-Digest`.
    #[serde(default = "default_true")]
    pub allow_bodyless_without_digest: bool,
}

impl Default for SignatureSettings {
    fn default() -> Self {
        Self {
            required_components: default_required_components(),
            enforce_thumbprint_binding: true,
            allow_bodyless_without_digest: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingSettings {
    /// Parses the configured level.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] for an unknown level name.
    pub fn level_filter(&self) -> Result<LevelFilter, Report<AuthError>> {
        LevelFilter::from_str(&self.level).map_err(|_| {
            Report::new(AuthError::Configuration {
                message: format!("Invalid log level '{}'", self.level),
            })
        })
    }
}

fn default_required_components() -> Vec<String> {
    vec![COMPONENT_METHOD.to_string(), COMPONENT_TARGET_URI.to_string()]
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub token: TokenSettings,
    #[serde(default)]
    #[validate(nested)]
    pub signature: SignatureSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Loads settings from TOML, applying `POP_AUTH__SECTION__KEY`
    /// environment overrides, then validates them.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the TOML is invalid, a required
    /// field is missing, or validation fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<AuthError>> {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_VARIABLE_PREFIX)
            .separator(ENVIRONMENT_VARIABLE_SEPARATOR)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("signature.required_components");

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(AuthError::Configuration {
                message: "Failed to build configuration".into(),
            })?;

        let settings: Self =
            config
                .try_deserialize()
                .change_context(AuthError::Configuration {
                    message: "Failed to deserialize configuration".into(),
                })?;

        settings.validate().change_context(AuthError::Configuration {
            message: "Settings failed validation".into(),
        })?;

        Ok(settings)
    }

    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tests::crate_test_settings_str;

    #[test]
    fn test_settings_from_valid_toml() {
        let settings =
            Settings::from_toml(&crate_test_settings_str()).expect("should load test settings");

        assert_eq!(settings.token.issuer, "https://auth.test-service.com");
        assert_eq!(settings.token_ttl(), Duration::from_secs(900));
        assert_eq!(
            settings.signature.required_components,
            vec!["@method", "@target-uri"]
        );
        assert!(settings.signature.enforce_thumbprint_binding);
        assert!(!settings.signature.allow_bodyless_without_digest);
        assert_eq!(
            settings.logging.level_filter().expect("valid level"),
            LevelFilter::Debug
        );
    }

    #[test]
    fn test_settings_defaults() {
        let toml_str = r#"
            [token]
            issuer = "https://auth.example.com"
            ttl_secs = 60
            "#;

        let settings = Settings::from_toml(toml_str).expect("should load minimal settings");
        assert_eq!(
            settings.signature.required_components,
            default_required_components()
        );
        assert!(settings.signature.enforce_thumbprint_binding);
        assert!(settings.signature.allow_bodyless_without_digest);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_settings_missing_required_fields() {
        let toml_str = r#"
            [token]
            issuer = "https://auth.example.com"
            # Missing ttl_secs
            "#;

        let err = Settings::from_toml(toml_str).expect_err("should fail without ttl_secs");
        assert!(matches!(
            err.current_context(),
            AuthError::Configuration { .. }
        ));
    }

    #[test]
    fn test_settings_validation_rejects_empty_issuer() {
        let toml_str = r#"
            [token]
            issuer = ""
            ttl_secs = 60
            "#;

        assert!(Settings::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_settings_validation_rejects_zero_ttl() {
        let toml_str = r#"
            [token]
            issuer = "https://auth.example.com"
            ttl_secs = 0
            "#;

        assert!(Settings::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_settings_empty_toml() {
        assert!(Settings::from_toml("").is_err(), "Should fail with empty TOML");
    }

    #[test]
    fn test_settings_invalid_toml_syntax() {
        let toml_str = r#"
            [token
            issuer = "https://auth.example.com"
            "#;

        assert!(
            Settings::from_toml(toml_str).is_err(),
            "Should fail with invalid TOML syntax"
        );
    }

    #[test]
    fn test_invalid_log_level() {
        let logging = LoggingSettings {
            level: "chatty".into(),
        };
        assert!(logging.level_filter().is_err());
    }

    #[test]
    fn test_override_env() {
        temp_env::with_vars(
            [
                ("POP_AUTH__TOKEN__ISSUER", Some("https://rotated.example.com")),
                ("POP_AUTH__TOKEN__TTL_SECS", Some("120")),
                (
                    "POP_AUTH__SIGNATURE__REQUIRED_COMPONENTS",
                    Some("@method,@authority,@path"),
                ),
            ],
            || {
                let settings = Settings::from_toml(&crate_test_settings_str())
                    .expect("settings should load with env overrides");

                assert_eq!(settings.token.issuer, "https://rotated.example.com");
                assert_eq!(settings.token.ttl_secs, 120);
                assert_eq!(
                    settings.signature.required_components,
                    vec!["@method", "@authority", "@path"]
                );
            },
        );
    }
}
