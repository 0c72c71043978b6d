//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for structural
//! errors such as missing listeners, unparseable addresses, ambiguous token
//! settings and zero limits. Returns a list of [`ValidationError`] values
//! with per-field suggestions.

use std::net::SocketAddr;

use super::model::Config;
use crate::error::ValidationError;

/// Validate a listen address. Returns `Ok(())` or a human-readable error.
pub fn validate_listen(addr: &str) -> Result<(), String> {
    addr.parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| format!("'{addr}' is not a valid socket address"))
}

fn error(field: &str, message: impl Into<String>, suggestion: Option<&str>) -> ValidationError {
    ValidationError {
        field: field.into(),
        message: message.into(),
        suggestion: suggestion.map(String::from),
    }
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match (&config.listen.api, &config.listen.http) {
        (None, None) => errors.push(error(
            "listen",
            "at least one of listen.api or listen.http must be set",
            Some("add 'http: 0.0.0.0:8080'"),
        )),
        (api, http) => {
            for (field, addr) in [("listen.api", api), ("listen.http", http)] {
                if let Some(addr) = addr {
                    if let Err(msg) = validate_listen(addr) {
                        let suggestion = (!addr.contains(':')).then_some("include a port, e.g. '127.0.0.1:8080'");
                        errors.push(error(field, msg, suggestion));
                    }
                }
            }
        }
    }

    if config.database.as_os_str().is_empty() {
        errors.push(error(
            "database",
            "database path cannot be empty",
            Some("use ':memory:' for a throwaway database"),
        ));
    }

    match (&config.auth.public_key, &config.auth.secret) {
        (Some(_), Some(_)) => errors.push(error(
            "auth",
            "set either auth.public_key or auth.secret, not both",
            None,
        )),
        (None, None) => errors.push(error(
            "auth",
            "one of auth.public_key or auth.secret is required",
            None,
        )),
        (None, Some(secret)) if secret.is_empty() => {
            errors.push(error("auth.secret", "secret cannot be empty", None));
        }
        _ => {}
    }

    if config.favicons.inkscape.trim().is_empty() {
        errors.push(error(
            "favicons.inkscape",
            "converter command cannot be empty",
            Some("the default is 'inkscape'"),
        ));
    }

    if config.proxy.timeout_ms == 0 {
        errors.push(error("proxy.timeout_ms", "timeout must be greater than 0", None));
    }
    if config.proxy.max_body == 0 {
        errors.push(error("proxy.max_body", "max_body must be greater than 0", None));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let mut lines = Vec::new();
    if let Some(api) = &config.listen.api {
        lines.push(format!("  api:       {api}"));
    }
    if let Some(http) = &config.listen.http {
        lines.push(format!("  gateway:   {http}"));
    }
    lines.push(format!("  database:  {}", config.database.display()));
    lines.push(format!(
        "  tokens:    {}",
        if config.auth.public_key.is_some() { "RS256" } else { "HS256" }
    ));
    lines.push(format!(
        "  proxy:     {}ms timeout, {} byte body limit",
        config.proxy.timeout_ms, config.proxy.max_body
    ));
    if config.reload_interval_secs > 0 {
        lines.push(format!("  reload:    every {}s", config.reload_interval_secs));
    }

    format!("{path} is valid\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{AuthConfig, Listen};

    fn minimal_config() -> Config {
        Config {
            listen: Listen {
                api: Some("127.0.0.1:8081".into()),
                http: Some("0.0.0.0:8080".into()),
            },
            database: "gatehouse.db".into(),
            auth: AuthConfig {
                public_key: None,
                secret: Some("s3cret".into()),
            },
            error_pages: None,
            certs: None,
            favicons: Default::default(),
            proxy: Default::default(),
            reload_interval_secs: 0,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&minimal_config()).is_ok());
    }

    #[test]
    fn no_listener_fails() {
        let mut config = minimal_config();
        config.listen = Listen::default();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "listen");
    }

    #[test]
    fn address_without_port_suggests_fix() {
        let mut config = minimal_config();
        config.listen.http = Some("0.0.0.0".into());
        let errors = validate(&config).unwrap_err();
        assert!(errors[0].message.contains("not a valid socket address"));
        assert!(errors[0].suggestion.is_some());
    }

    #[test]
    fn both_auth_modes_fail() {
        let mut config = minimal_config();
        config.auth.public_key = Some("key.pem".into());
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("not both")));
    }

    #[test]
    fn missing_auth_fails() {
        let mut config = minimal_config();
        config.auth = AuthConfig::default();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_limits_fail() {
        let mut config = minimal_config();
        config.proxy.timeout_ms = 0;
        config.proxy.max_body = 0;
        assert_eq!(validate(&config).unwrap_err().len(), 2);
    }

    #[test]
    fn report_mentions_listeners() {
        let report = format_validation_report("gatehouse.yaml", &minimal_config());
        assert!(report.starts_with("gatehouse.yaml is valid"));
        assert!(report.contains("0.0.0.0:8080"));
        assert!(report.contains("HS256"));
    }
}
