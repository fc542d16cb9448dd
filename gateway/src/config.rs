use std::env;
use std::time::Duration;

use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Invalid URL for {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_host: String,
    pub port: u16,
    /// Detection service address used server-to-server.
    pub backend_url: Url,
    /// Detection service address handed to browsers.
    pub backend_public_url: Url,
    pub relay_timeout: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_host = lookup("BIND_HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = match lookup("PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: "PORT", value })?,
            None => 8001,
        };

        let backend_url = parse_url(&lookup, "AI_BACKEND_URL", "http://ai-backend:8000")?;
        let backend_public_url =
            parse_url(&lookup, "AI_BACKEND_PUBLIC_URL", "http://localhost:8000")?;

        let relay_timeout = match lookup("RELAY_TIMEOUT_SECS") {
            Some(value) => value
                .parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64)
                .ok_or(ConfigError::InvalidValue {
                    key: "RELAY_TIMEOUT_SECS",
                    value,
                })?,
            None => Duration::from_secs(30),
        };

        Ok(Self {
            bind_host,
            port,
            backend_url,
            backend_public_url,
            relay_timeout,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Browser-facing URL of a detection service endpoint.
    pub fn public_endpoint(&self, path: &str) -> String {
        endpoint(&self.backend_public_url, path)
    }
}

/// Joins `path` onto `base`, keeping any path prefix `base` already has.
pub fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn parse_url<F>(lookup: &F, key: &'static str, default: &str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { key, source })
}
