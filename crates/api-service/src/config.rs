//! API service configuration.
//!
//! Configuration is loaded from environment variables. The identity
//! provider can be given as an authority (`AUTH_DOMAIN`), from which the
//! issuer and JWKS URL are derived, or with both set explicitly.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default JWKS fetch timeout in seconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Maximum JWKS fetch timeout in seconds.
pub const MAX_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// Minimum periodic refresh interval in seconds.
pub const MIN_JWKS_REFRESH_INTERVAL_SECONDS: u64 = 60;

/// Default graceful shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 30;

/// Path identity providers publish their key set on.
pub const WELL_KNOWN_JWKS_PATH: &str = "/.well-known/jwks.json";

/// API service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Issuer a token's `iss` must equal exactly.
    pub issuer: String,

    /// Audience that must appear in a token's `aud`.
    pub audience: String,

    /// Identity provider JWKS endpoint.
    pub jwks_url: String,

    /// Upper bound on one key set fetch.
    pub jwks_fetch_timeout: Duration,

    /// Periodic key set refresh, `None` for miss-driven refresh only.
    pub jwks_refresh_interval: Option<Duration>,

    /// Clock skew tolerance applied to `exp` and `nbf`.
    pub jwt_clock_skew: Duration,

    /// Time allowed for in-flight requests after a shutdown signal.
    pub drain_period: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWKS URL: {0}")]
    InvalidJwksUrl(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid JWKS fetch timeout configuration: {0}")]
    InvalidFetchTimeout(String),

    #[error("Invalid JWKS refresh interval configuration: {0}")]
    InvalidRefreshInterval(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a
    /// value is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let authority = non_empty(vars, "AUTH_DOMAIN").map(|domain| normalize_authority(&domain));

        let issuer = match (non_empty(vars, "AUTH_ISSUER"), &authority) {
            (Some(issuer), _) => issuer,
            (None, Some(authority)) => format!("{authority}/"),
            (None, None) => return Err(ConfigError::MissingEnvVar("AUTH_ISSUER".to_string())),
        };

        let jwks_url = match (non_empty(vars, "AUTH_JWKS_URL"), &authority) {
            (Some(url), _) => url,
            (None, Some(authority)) => format!("{authority}{WELL_KNOWN_JWKS_PATH}"),
            (None, None) => return Err(ConfigError::MissingEnvVar("AUTH_JWKS_URL".to_string())),
        };

        let audience = non_empty(vars, "AUTH_AUDIENCE")
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_AUDIENCE".to_string()))?;

        let allow_insecure_http = parse_bool(vars, "JWKS_ALLOW_INSECURE_HTTP")?.unwrap_or(false);
        validate_jwks_url(&jwks_url, allow_insecure_http)?;

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a non-negative integer, got '{value_str}': {e}"
                ))
            })?;

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {value}",
                    MAX_CLOCK_SKEW.as_secs()
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let jwks_fetch_timeout = if let Some(value_str) = vars.get("JWKS_FETCH_TIMEOUT_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidFetchTimeout(format!(
                    "JWKS_FETCH_TIMEOUT_SECONDS must be a positive integer, got '{value_str}': {e}"
                ))
            })?;

            if !(1..=MAX_JWKS_FETCH_TIMEOUT_SECONDS).contains(&value) {
                return Err(ConfigError::InvalidFetchTimeout(format!(
                    "JWKS_FETCH_TIMEOUT_SECONDS must be between 1 and {MAX_JWKS_FETCH_TIMEOUT_SECONDS}, got {value}"
                )));
            }

            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS)
        };

        let jwks_refresh_interval =
            if let Some(value_str) = vars.get("JWKS_REFRESH_INTERVAL_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidRefreshInterval(format!(
                        "JWKS_REFRESH_INTERVAL_SECONDS must be a non-negative integer, got '{value_str}': {e}"
                    ))
                })?;

                match value {
                    0 => None,
                    v if v < MIN_JWKS_REFRESH_INTERVAL_SECONDS => {
                        return Err(ConfigError::InvalidRefreshInterval(format!(
                            "JWKS_REFRESH_INTERVAL_SECONDS must be 0 or at least {MIN_JWKS_REFRESH_INTERVAL_SECONDS}, got {v}"
                        )));
                    }
                    v => Some(Duration::from_secs(v)),
                }
            } else {
                None
            };

        let drain_period = if let Some(value_str) = vars.get("DRAIN_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
                name: "DRAIN_SECONDS".to_string(),
                message: format!("must be a non-negative integer, got '{value_str}': {e}"),
            })?;
            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_DRAIN_SECONDS)
        };

        Ok(Config {
            bind_address,
            issuer,
            audience,
            jwks_url,
            jwks_fetch_timeout,
            jwks_refresh_interval,
            jwt_clock_skew,
            drain_period,
        })
    }
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// `tenant.auth.example.com` or `https://tenant.auth.example.com/` both
/// become `https://tenant.auth.example.com`.
fn normalize_authority(domain: &str) -> String {
    let trimmed = domain.trim_end_matches('/');
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

fn parse_bool(vars: &HashMap<String, String>, name: &str) -> Result<Option<bool>, ConfigError> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" | "" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("expected true or false, got '{v}'"),
            }),
        },
    }
}

fn validate_jwks_url(url: &str, allow_insecure_http: bool) -> Result<(), ConfigError> {
    let rest = if let Some(rest) = url.strip_prefix("https://") {
        rest
    } else if let Some(rest) = url.strip_prefix("http://") {
        if !allow_insecure_http {
            return Err(ConfigError::InvalidJwksUrl(format!(
                "{url} is not HTTPS; set JWKS_ALLOW_INSECURE_HTTP=true to allow it"
            )));
        }
        rest
    } else {
        return Err(ConfigError::InvalidJwksUrl(format!(
            "{url} must be an absolute http(s) URL"
        )));
    };

    if rest.is_empty() || rest.starts_with('/') {
        return Err(ConfigError::InvalidJwksUrl(format!("{url} has no host")));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            ("AUTH_DOMAIN".to_string(), "tenant.auth.example.com".to_string()),
            ("AUTH_AUDIENCE".to_string(), "https://api.example.com".to_string()),
        ])
    }

    #[test]
    fn test_from_vars_derives_issuer_and_jwks_url_from_domain() {
        let config = Config::from_vars(&base_vars()).unwrap();

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.issuer, "https://tenant.auth.example.com/");
        assert_eq!(
            config.jwks_url,
            "https://tenant.auth.example.com/.well-known/jwks.json"
        );
        assert_eq!(config.audience, "https://api.example.com");
        assert_eq!(config.jwks_fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.jwks_refresh_interval, None);
        assert_eq!(config.jwt_clock_skew, Duration::ZERO);
        assert_eq!(config.drain_period, Duration::from_secs(30));
    }

    #[test]
    fn test_domain_with_scheme_and_trailing_slash() {
        let mut vars = base_vars();
        vars.insert(
            "AUTH_DOMAIN".to_string(),
            "https://tenant.auth.example.com/".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();

        assert_eq!(config.issuer, "https://tenant.auth.example.com/");
    }

    #[test]
    fn test_explicit_issuer_and_jwks_url_override_domain() {
        let mut vars = base_vars();
        vars.insert("AUTH_ISSUER".to_string(), "https://issuer.example.com".to_string());
        vars.insert(
            "AUTH_JWKS_URL".to_string(),
            "https://keys.example.com/jwks".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();

        assert_eq!(config.issuer, "https://issuer.example.com");
        assert_eq!(config.jwks_url, "https://keys.example.com/jwks");
    }

    #[test]
    fn test_missing_audience() {
        let mut vars = base_vars();
        vars.remove("AUTH_AUDIENCE");

        assert_eq!(
            Config::from_vars(&vars).unwrap_err(),
            ConfigError::MissingEnvVar("AUTH_AUDIENCE".to_string())
        );
    }

    #[test]
    fn test_missing_issuer_without_domain() {
        let vars = HashMap::from([
            ("AUTH_AUDIENCE".to_string(), "aud".to_string()),
            ("AUTH_JWKS_URL".to_string(), "https://keys.example.com/jwks".to_string()),
        ]);

        assert_eq!(
            Config::from_vars(&vars).unwrap_err(),
            ConfigError::MissingEnvVar("AUTH_ISSUER".to_string())
        );
    }

    #[test]
    fn test_missing_jwks_url_without_domain() {
        let vars = HashMap::from([
            ("AUTH_AUDIENCE".to_string(), "aud".to_string()),
            ("AUTH_ISSUER".to_string(), "https://issuer.example.com/".to_string()),
        ]);

        assert_eq!(
            Config::from_vars(&vars).unwrap_err(),
            ConfigError::MissingEnvVar("AUTH_JWKS_URL".to_string())
        );
    }

    #[test]
    fn test_http_jwks_url_requires_opt_in() {
        let mut vars = base_vars();
        vars.insert(
            "AUTH_JWKS_URL".to_string(),
            "http://127.0.0.1:9999/.well-known/jwks.json".to_string(),
        );

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidJwksUrl(_))
        ));

        vars.insert("JWKS_ALLOW_INSECURE_HTTP".to_string(), "true".to_string());
        assert!(Config::from_vars(&vars).is_ok());
    }

    #[test]
    fn test_jwks_url_must_be_absolute() {
        let mut vars = base_vars();
        vars.insert("AUTH_JWKS_URL".to_string(), "/jwks.json".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidJwksUrl(_))
        ));

        vars.insert("AUTH_JWKS_URL".to_string(), "https:///jwks.json".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidJwksUrl(_))
        ));
    }

    #[test]
    fn test_invalid_insecure_flag() {
        let mut vars = base_vars();
        vars.insert("JWKS_ALLOW_INSECURE_HTTP".to_string(), "maybe".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_clock_skew_bounds() {
        let mut vars = base_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "120".to_string());
        assert_eq!(
            Config::from_vars(&vars).unwrap().jwt_clock_skew,
            Duration::from_secs(120)
        );

        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "601".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidJwtClockSkew(_))
        ));

        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "-1".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidJwtClockSkew(_))
        ));
    }

    #[test]
    fn test_fetch_timeout_bounds() {
        let mut vars = base_vars();
        vars.insert("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "5".to_string());
        assert_eq!(
            Config::from_vars(&vars).unwrap().jwks_fetch_timeout,
            Duration::from_secs(5)
        );

        for invalid in ["0", "61", "abc"] {
            vars.insert("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), invalid.to_string());
            assert!(matches!(
                Config::from_vars(&vars),
                Err(ConfigError::InvalidFetchTimeout(_))
            ));
        }
    }

    #[test]
    fn test_refresh_interval() {
        let mut vars = base_vars();
        vars.insert("JWKS_REFRESH_INTERVAL_SECONDS".to_string(), "0".to_string());
        assert_eq!(Config::from_vars(&vars).unwrap().jwks_refresh_interval, None);

        vars.insert("JWKS_REFRESH_INTERVAL_SECONDS".to_string(), "3600".to_string());
        assert_eq!(
            Config::from_vars(&vars).unwrap().jwks_refresh_interval,
            Some(Duration::from_secs(3600))
        );

        vars.insert("JWKS_REFRESH_INTERVAL_SECONDS".to_string(), "30".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidRefreshInterval(_))
        ));
    }

    #[test]
    fn test_drain_seconds() {
        let mut vars = base_vars();
        vars.insert("DRAIN_SECONDS".to_string(), "0".to_string());
        assert_eq!(Config::from_vars(&vars).unwrap().drain_period, Duration::ZERO);

        vars.insert("DRAIN_SECONDS".to_string(), "soon".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
