//! Converter configuration.

use std::time::Duration;

use fxpair_common::Currency;

/// Environment variable holding the provider endpoint.
pub const PROVIDER_URL_ENV: &str = "FXPAIR_PROVIDER_URL";

/// Default exchange-rate endpoint.
pub const DEFAULT_PROVIDER_URL: &str = "https://api.coinbase.com/v2/exchange-rates";

/// Configuration for the rate fetcher and conversion engine.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Exchange-rate endpoint, queried with `?currency={BASE}`.
    pub provider_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// User agent sent to the provider.
    pub user_agent: String,
    /// Initial "from" currency.
    pub default_from: Currency,
    /// Initial "to" currency.
    pub default_to: Currency,
    /// How often callers should refresh the rate table.
    pub refresh_interval: Duration,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            user_agent: concat!("fxpair/", env!("CARGO_PKG_VERSION")).to_string(),
            default_from: Currency::usd(),
            default_to: Currency::eth(),
            refresh_interval: Duration::from_secs(60),
        }
    }
}

impl ConverterConfig {
    /// Load configuration from environment variables.
    ///
    /// Only the provider endpoint is read from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(PROVIDER_URL_ENV) {
            config.provider_url = url;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.provider_url.trim().is_empty() {
            return Err("Provider URL cannot be empty".to_string());
        }

        if !self.provider_url.starts_with("http://") && !self.provider_url.starts_with("https://") {
            return Err(format!("Provider URL must be http(s): {}", self.provider_url));
        }

        if self.request_timeout.is_zero() {
            return Err("Request timeout cannot be zero".to_string());
        }

        if self.refresh_interval.is_zero() {
            return Err("Refresh interval cannot be zero".to_string());
        }

        if self.default_from.is_empty() || self.default_to.is_empty() {
            return Err("Default currencies cannot be empty".to_string());
        }

        Ok(())
    }
}
