//! Environment-based configuration for the mirror pipeline.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct. Built once at startup; no process-wide
/// mutable credential state after initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub source: Source,
    pub dest: Dest,
}

/// Source platform (Twitter/X API v2) credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub bearer_token: String,
    pub username: String,
}

/// Destination platform (Bluesky) credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dest {
    pub service: String,
    pub email: String,
    pub password: String,
}

const DEFAULT_DEST_SERVICE: &str = "https://bsky.social";

/// Load configuration from the process environment.
///
/// Required: `SOURCE_BEARER_TOKEN`, `SOURCE_USERNAME`, `DEST_EMAIL`,
/// `DEST_PASSWORD`. Optional: `DEST_SERVICE` (defaults to the public
/// Bluesky service).
pub fn from_env() -> Result<Config, ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
    let require = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

    let cfg = Config {
        source: Source {
            bearer_token: require("SOURCE_BEARER_TOKEN")?,
            username: require("SOURCE_USERNAME")?,
        },
        dest: Dest {
            service: lookup("DEST_SERVICE").unwrap_or_else(|| DEFAULT_DEST_SERVICE.to_string()),
            email: require("DEST_EMAIL")?,
            password: require("DEST_PASSWORD")?,
        },
    };
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.source.bearer_token.trim().is_empty() {
        return Err(ConfigError::Invalid("SOURCE_BEARER_TOKEN must be non-empty"));
    }
    if cfg.source.username.trim().is_empty() {
        return Err(ConfigError::Invalid("SOURCE_USERNAME must be non-empty"));
    }
    // Handles are stored without the leading '@' on the source platform.
    if cfg.source.username.starts_with('@') {
        return Err(ConfigError::Invalid("SOURCE_USERNAME must not include the leading '@'"));
    }
    if cfg.dest.service.trim().is_empty() {
        return Err(ConfigError::Invalid("DEST_SERVICE must be non-empty"));
    }
    if cfg.dest.email.trim().is_empty() {
        return Err(ConfigError::Invalid("DEST_EMAIL must be non-empty"));
    }
    if cfg.dest.password.trim().is_empty() {
        return Err(ConfigError::Invalid("DEST_PASSWORD must be non-empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SOURCE_BEARER_TOKEN", "token"),
            ("SOURCE_USERNAME", "someone"),
            ("DEST_EMAIL", "someone@example.com"),
            ("DEST_PASSWORD", "hunter2"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn loads_with_default_service() {
        let cfg = load(&vars()).unwrap();
        assert_eq!(cfg.source.username, "someone");
        assert_eq!(cfg.dest.service, DEFAULT_DEST_SERVICE);
    }

    #[test]
    fn service_override() {
        let mut vars = vars();
        vars.insert("DEST_SERVICE", "https://pds.example.com");
        let cfg = load(&vars).unwrap();
        assert_eq!(cfg.dest.service, "https://pds.example.com");
    }

    #[test]
    fn missing_credential() {
        let mut vars = vars();
        vars.remove("DEST_PASSWORD");
        let err = load(&vars).unwrap_err();
        match err {
            ConfigError::Missing(key) => assert_eq!(key, "DEST_PASSWORD"),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn rejects_blank_token() {
        let mut vars = vars();
        vars.insert("SOURCE_BEARER_TOKEN", "  ");
        let err = load(&vars).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("SOURCE_BEARER_TOKEN")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn rejects_at_prefixed_handle() {
        let mut vars = vars();
        vars.insert("SOURCE_USERNAME", "@someone");
        assert!(matches!(load(&vars), Err(ConfigError::Invalid(_))));
    }
}
