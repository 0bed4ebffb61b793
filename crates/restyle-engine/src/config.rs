use std::env;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;

const MIN_REQUEST_TIMEOUT_S: f64 = 15.0;
const MAX_REQUEST_TIMEOUT_S: f64 = 300.0;

/// Connection settings for the hosted gateway.
#[derive(Clone, PartialEq)]
pub struct GatewayConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub image_model: String,
    pub text_model: String,
    pub request_timeout_s: f64,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("image_model", &self.image_model)
            .field("text_model", &self.text_model)
            .field("request_timeout_s", &self.request_timeout_s)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    /// Builds a config from any key lookup; unset or blank keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let first = |keys: &[&str]| keys.iter().find_map(|key| non_empty(lookup(key)));
        Self {
            api_base: first(&["GEMINI_API_BASE"])
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
            api_key: first(&["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"]),
            image_model: first(&["RESTYLE_IMAGE_MODEL"]).unwrap_or(defaults.image_model),
            text_model: first(&["RESTYLE_TEXT_MODEL"]).unwrap_or(defaults.text_model),
            request_timeout_s: first(&["RESTYLE_REQUEST_TIMEOUT"])
                .and_then(|value| value.parse::<f64>().ok())
                .unwrap_or(defaults.request_timeout_s),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        let seconds = if self.request_timeout_s.is_finite() {
            self.request_timeout_s
        } else {
            DEFAULT_REQUEST_TIMEOUT_S
        };
        Duration::from_secs_f64(seconds.clamp(MIN_REQUEST_TIMEOUT_S, MAX_REQUEST_TIMEOUT_S))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn non_empty_env(key: &str) -> Option<String> {
    non_empty(env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{GatewayConfig, DEFAULT_API_BASE, DEFAULT_IMAGE_MODEL};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[]));
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.image_model, DEFAULT_IMAGE_MODEL);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn key_lookup_prefers_gemini_then_google_then_api_key() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "google"),
            ("API_KEY", "plain"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("google"));

        let config = GatewayConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "  "),
            ("API_KEY", "plain"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("plain"));
    }

    #[test]
    fn overrides_are_trimmed() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("GEMINI_API_BASE", " http://localhost:9000/v1beta/ "),
            ("RESTYLE_TEXT_MODEL", "gemini-2.5-pro"),
            ("RESTYLE_REQUEST_TIMEOUT", "42"),
        ]));
        assert_eq!(config.api_base, "http://localhost:9000/v1beta");
        assert_eq!(config.text_model, "gemini-2.5-pro");
        assert_eq!(config.request_timeout(), Duration::from_secs(42));
    }

    #[test]
    fn timeout_is_clamped() {
        let mut config = GatewayConfig {
            request_timeout_s: 1.0,
            ..GatewayConfig::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        config.request_timeout_s = 10_000.0;
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
        config.request_timeout_s = f64::NAN;
        assert_eq!(config.request_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let config = GatewayConfig {
            api_key: Some("secret-key".to_string()),
            ..GatewayConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
