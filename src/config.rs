//! Process and request configuration.

use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

/// Number of distinct app ids a server keeps stores for.
pub const DEFAULT_MAX_APPS: usize = 256;

/// Longest accepted app id.
pub const MAX_APP_ID_LEN: usize = 64;

/// Header carrying the caller's application id.
pub const APP_ID_HEADER: &str = "x-app-id";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("PORT must be a number between 0 and 65535, got '{0}'")]
    InvalidPort(String),

    #[error("MAX_APPS must be a positive number, got '{0}'")]
    InvalidMaxApps(String),

    #[error("Missing or empty x-app-id header")]
    MissingAppId,

    #[error("Invalid app id '{0}': expected up to 64 ASCII letters, digits, '-' or '_'")]
    InvalidAppId(String),
}

/// Where the HTTP server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Cap on per-app stores held in memory
    pub max_apps: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_apps: DEFAULT_MAX_APPS,
        }
    }
}

impl ServerConfig {
    /// Read `HOST`, `PORT` and `MAX_APPS` from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(
            std::env::var("HOST").ok(),
            std::env::var("PORT").ok(),
            std::env::var("MAX_APPS").ok(),
        )
    }

    pub fn from_vars(
        host: Option<String>,
        port: Option<String>,
        max_apps: Option<String>,
    ) -> Result<Self, ConfigError> {
        let port = match port {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
            None => DEFAULT_PORT,
        };
        let max_apps = match max_apps {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidMaxApps(raw)),
            },
            None => DEFAULT_MAX_APPS,
        };
        Ok(ServerConfig {
            host: host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            max_apps,
        })
    }
}

/// Per-request settings, passed explicitly to whatever serves the request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestContext {
    pub app_id: String,
}

impl RequestContext {
    pub fn new(app_id: impl Into<String>) -> Self {
        RequestContext { app_id: app_id.into() }
    }

    /// Build from a raw header value. Blank, overlong, or oddly-charactered
    /// ids are rejected.
    pub fn from_header(value: Option<&str>) -> Result<Self, ConfigError> {
        let app_id = match value.map(str::trim) {
            Some(app_id) if !app_id.is_empty() => app_id,
            _ => return Err(ConfigError::MissingAppId),
        };
        let well_formed = app_id.len() <= MAX_APP_ID_LEN
            && app_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(ConfigError::InvalidAppId(app_id.to_string()));
        }
        Ok(RequestContext::new(app_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(ServerConfig::from_vars(None, None, None).unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_explicit_values() {
        let config =
            ServerConfig::from_vars(Some("0.0.0.0".to_string()), Some("9090".to_string()), Some("8".to_string())).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9090);
        assert_eq!(config.max_apps, 8);
    }

    #[test]
    fn test_invalid_port() {
        let err = ServerConfig::from_vars(None, Some("eighty".to_string()), None).unwrap_err();
        assert_eq!(err, ConfigError::InvalidPort("eighty".to_string()));
        assert!(ServerConfig::from_vars(None, Some("70000".to_string()), None).is_err());
        assert_eq!(
            ServerConfig::from_vars(None, None, Some("0".to_string())),
            Err(ConfigError::InvalidMaxApps("0".to_string()))
        );
    }

    #[test]
    fn test_request_context_from_header() {
        assert_eq!(
            RequestContext::from_header(Some(" app_1 ")).unwrap(),
            RequestContext::new("app_1")
        );
        assert_eq!(RequestContext::from_header(Some("")), Err(ConfigError::MissingAppId));
        assert_eq!(RequestContext::from_header(None), Err(ConfigError::MissingAppId));
        assert_eq!(
            RequestContext::from_header(Some("app 1")),
            Err(ConfigError::InvalidAppId("app 1".to_string()))
        );
        let long = "a".repeat(MAX_APP_ID_LEN + 1);
        assert!(RequestContext::from_header(Some(&long)).is_err());
    }
}
