//! Connection, credential and tuning settings for the JWNET client.

use std::fmt;
use std::time::Duration;

use log::debug;
use reqwest::Url;

use crate::error::ApiError;
use crate::retry::{DEFAULT_MAX_RETRIES, RetryPolicy};
use crate::runtime::Runtime;

/// Per-attempt timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

pub const ENV_API_URL: &str = "JWNET_API_URL";
pub const ENV_API_KEY: &str = "JWNET_API_KEY";
pub const ENV_SUBSCRIBER_NO: &str = "JWNET_SUBSCRIBER_NO";
pub const ENV_PUBLIC_CONFIRM_NO: &str = "JWNET_PUBLIC_CONFIRM_NO";
pub const ENV_TIMEOUT_MS: &str = "JWNET_TIMEOUT_MS";
pub const ENV_MAX_RETRIES: &str = "JWNET_MAX_RETRIES";

/// Unvalidated settings, as collected from flags, files or the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub subscriber_no: Option<String>,
    pub public_confirm_no: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

/// Validated, immutable client settings.
#[derive(Clone, PartialEq)]
pub struct Config {
    api_url: String,
    api_key: String,
    subscriber_no: String,
    public_confirm_no: String,
    timeout: Duration,
    max_retries: u32,
}

impl Config {
    /// Validates `options`. Fails on the first missing or invalid setting;
    /// nothing is sent over the network.
    pub fn from_options(options: ConfigOptions) -> Result<Self, ApiError> {
        let api_url = required(options.api_url, "api_url", ENV_API_URL)?;
        let api_key = required(options.api_key, "api_key", ENV_API_KEY)?;
        let subscriber_no = required(options.subscriber_no, "subscriber_no", ENV_SUBSCRIBER_NO)?;
        let public_confirm_no = required(
            options.public_confirm_no,
            "public_confirm_no",
            ENV_PUBLIC_CONFIRM_NO,
        )?;

        let api_url = normalize_api_url(&api_url)?;

        let timeout = options.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(ApiError::config("timeout must be greater than zero"));
        }

        let config = Self {
            api_url,
            api_key,
            subscriber_no,
            public_confirm_no,
            timeout,
            max_retries: options.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        };
        debug!("Loaded JWNET configuration: {:?}", config);
        Ok(config)
    }

    /// Builds the configuration from `JWNET_*` environment variables.
    #[tracing::instrument(skip(runtime))]
    pub fn from_env<R: Runtime + ?Sized>(runtime: &R) -> Result<Self, ApiError> {
        let timeout = match read_env(runtime, ENV_TIMEOUT_MS) {
            Some(raw) => Some(Duration::from_millis(parse_number(&raw, ENV_TIMEOUT_MS)?)),
            None => None,
        };
        let max_retries = match read_env(runtime, ENV_MAX_RETRIES) {
            Some(raw) => Some(parse_number(&raw, ENV_MAX_RETRIES)?),
            None => None,
        };

        Self::from_options(ConfigOptions {
            api_url: read_env(runtime, ENV_API_URL),
            api_key: read_env(runtime, ENV_API_KEY),
            subscriber_no: read_env(runtime, ENV_SUBSCRIBER_NO),
            public_confirm_no: read_env(runtime, ENV_PUBLIC_CONFIRM_NO),
            timeout,
            max_retries,
        })
    }

    /// Base URL without a trailing slash.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn subscriber_no(&self) -> &str {
        &self.subscriber_no
    }

    pub fn public_confirm_no(&self) -> &str {
        &self.public_confirm_no
    }

    /// Deadline applied to each individual attempt.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url)
            .field("api_key", &mask_secret(&self.api_key))
            .field("subscriber_no", &self.subscriber_no)
            .field("public_confirm_no", &self.public_confirm_no)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

fn required(value: Option<String>, name: &str, env_key: &str) -> Result<String, ApiError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::config(format!(
            "missing required setting {} ({})",
            name, env_key
        ))),
    }
}

fn normalize_api_url(raw: &str) -> Result<String, ApiError> {
    let parsed = Url::parse(raw).map_err(|e| {
        ApiError::config(format!("api_url is not a valid URL: {}", raw)).with_source(e)
    })?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
        return Err(ApiError::config(format!(
            "api_url must be an http(s) URL: {}",
            raw
        )));
    }

    Ok(raw.strip_suffix('/').unwrap_or(raw).to_string())
}

fn read_env<R: Runtime + ?Sized>(runtime: &R, key: &str) -> Option<String> {
    runtime
        .env_var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, ApiError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim().parse::<T>().map_err(|e| {
        ApiError::config(format!("{} must be a non-negative integer, got {:?}", key, raw))
            .with_source(e)
    })
}

/// Masks a credential for logging, keeping at most four characters at each end.
pub(crate) fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "********".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}********{}", head, tail)
}
