//! HTTP rate fetcher for Coinbase-style exchange-rate endpoints.
//!
//! The provider is queried with `GET {provider_url}?currency={BASE}` and is
//! expected to answer with:
//!
//! ```json
//! { "data": { "currency": "USD", "rates": { "EUR": "0.9", "ETH": "0.0005" } } }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use fxpair_common::{Currency, FetchToken, Rate};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::ConverterConfig;
use crate::error::{FxError, FxResult};
use crate::provider::RateFetcher;
use crate::table::{RateEntry, RateTable};

#[derive(Debug, Deserialize)]
struct RatesEnvelope {
    data: Option<RatesPayload>,
}

#[derive(Debug, Deserialize)]
struct RatesPayload {
    currency: Option<String>,
    rates: Option<serde_json::Map<String, Value>>,
}

/// Fetches rate tables over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpRateFetcher {
    client: reqwest::Client,
    provider_url: String,
    request_timeout: Duration,
}

impl HttpRateFetcher {
    /// Create a fetcher from the converter configuration.
    pub fn new(config: &ConverterConfig) -> FxResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FxError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, config))
    }

    /// Create a fetcher around an existing reqwest client.
    pub fn with_client(client: reqwest::Client, config: &ConverterConfig) -> Self {
        Self {
            client,
            provider_url: config.provider_url.clone(),
            request_timeout: config.request_timeout,
        }
    }

    /// Endpoint queried by this fetcher.
    pub fn provider_url(&self) -> &str {
        &self.provider_url
    }
}

#[async_trait]
impl RateFetcher for HttpRateFetcher {
    fn name(&self) -> &str {
        "HTTP"
    }

    #[instrument(skip(self, base, token), fields(base = %base, token = %token))]
    async fn fetch(&self, base: &Currency, token: FetchToken) -> FxResult<RateTable> {
        if base.is_empty() {
            return Err(FxError::EmptyBaseCurrency);
        }

        let response = self
            .client
            .get(&self.provider_url)
            .query(&[("currency", base.code())])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FxError::Transport(format!("request timeout: {}", e))
                } else if e.is_connect() {
                    FxError::Transport(format!("connection failed: {}", e))
                } else {
                    FxError::Transport(format!("request failed: {}", e))
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FxError::Transport(format!("failed to read response body: {}", e)))?;

        debug!(status, bytes = body.len(), "Provider responded");

        parse_rates_response(status, &body, base, token)
    }
}

/// Turn a provider response into a rate table.
///
/// Any non-2xx status is a provider error; a 2xx body without a usable
/// `data.rates` object is a parse error. A single unusable rate rejects the
/// whole response.
pub fn parse_rates_response(
    status: u16,
    body: &str,
    base: &Currency,
    token: FetchToken,
) -> FxResult<RateTable> {
    if !(200..300).contains(&status) {
        warn!(status, base = %base, "Provider returned non-success status");
        return Err(FxError::Provider {
            status_code: status,
        });
    }

    let envelope: RatesEnvelope = serde_json::from_str(body)
        .map_err(|e| FxError::Parse(format!("invalid JSON: {}", e)))?;

    let payload = envelope
        .data
        .ok_or_else(|| FxError::Parse("missing data object".to_string()))?;

    if let Some(currency) = payload.currency.as_deref() {
        if Currency::new(currency) != *base {
            return Err(FxError::Parse(format!(
                "requested rates for {} but provider answered for {}",
                base, currency
            )));
        }
    }

    let rates = payload
        .rates
        .ok_or_else(|| FxError::Parse("missing rates object".to_string()))?;

    if rates.is_empty() {
        return Err(FxError::Parse("rates object is empty".to_string()));
    }

    let entries = rates
        .into_iter()
        .map(|(code, value)| parse_entry(code, &value))
        .collect::<FxResult<Vec<_>>>()?;

    RateTable::new(base.clone(), entries, token)
}

fn parse_entry(code: String, value: &Value) -> FxResult<RateEntry> {
    let text = match value {
        Value::String(s) => s.clone(),
        // Numbers go through their text form so no float rounding sneaks in.
        Value::Number(n) => n.to_string(),
        other => {
            return Err(FxError::Parse(format!(
                "rate for {} is not a number: {}",
                code, other
            )))
        }
    };

    let rate = Rate::parse(&text).map_err(|e| FxError::Parse(format!("rate for {}: {}", code, e)))?;

    Ok(RateEntry::new(Currency::new(code), rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const USD_BODY: &str = r#"{
        "data": {
            "currency": "USD",
            "rates": { "USD": "1.0", "EUR": "0.9", "ETH": "0.0005", "GBP": 0.79 }
        }
    }"#;

    #[test]
    fn test_parse_success() {
        let table = parse_rates_response(200, USD_BODY, &Currency::usd(), FetchToken::new(3)).unwrap();

        assert_eq!(table.base(), &Currency::usd());
        assert_eq!(table.fetched_at(), FetchToken::new(3));
        assert_eq!(table.len(), 4);
        assert_eq!(table.rate(&Currency::eth()).unwrap().value(), dec!(0.0005));
        assert_eq!(table.rate(&Currency::gbp()).unwrap().value(), dec!(0.79));

        let codes: Vec<&str> = table.currencies().map(|c| c.code()).collect();
        assert_eq!(codes, vec!["ETH", "EUR", "GBP", "USD"]);
    }

    #[test]
    fn test_non_success_status() {
        let result = parse_rates_response(503, "oops", &Currency::usd(), FetchToken::new(1));

        assert_eq!(result, Err(FxError::Provider { status_code: 503 }));
    }

    #[test]
    fn test_missing_rates_is_parse_error() {
        let body = r#"{ "data": { "currency": "USD" } }"#;
        let result = parse_rates_response(200, body, &Currency::usd(), FetchToken::new(1));
        assert!(matches!(result, Err(FxError::Parse(_))));

        let result = parse_rates_response(200, "{}", &Currency::usd(), FetchToken::new(1));
        assert!(matches!(result, Err(FxError::Parse(_))));

        let result = parse_rates_response(200, "<html>", &Currency::usd(), FetchToken::new(1));
        assert!(matches!(result, Err(FxError::Parse(_))));
    }

    #[test]
    fn test_bad_rate_rejects_response() {
        let zero = r#"{ "data": { "rates": { "EUR": "0" } } }"#;
        assert!(matches!(
            parse_rates_response(200, zero, &Currency::usd(), FetchToken::new(1)),
            Err(FxError::Parse(_))
        ));

        let text = r#"{ "data": { "rates": { "EUR": "n/a" } } }"#;
        assert!(matches!(
            parse_rates_response(200, text, &Currency::usd(), FetchToken::new(1)),
            Err(FxError::Parse(_))
        ));

        let null = r#"{ "data": { "rates": { "EUR": null } } }"#;
        assert!(matches!(
            parse_rates_response(200, null, &Currency::usd(), FetchToken::new(1)),
            Err(FxError::Parse(_))
        ));
    }

    #[test]
    fn test_base_mismatch_is_parse_error() {
        let result = parse_rates_response(200, USD_BODY, &Currency::eur(), FetchToken::new(1));

        assert!(matches!(result, Err(FxError::Parse(_))));
    }

    #[tokio::test]
    async fn test_empty_base_rejected_before_request() {
        let fetcher = HttpRateFetcher::new(&ConverterConfig::default()).unwrap();

        let result = fetcher.fetch(&Currency::new(""), FetchToken::new(1)).await;

        assert_eq!(result, Err(FxError::EmptyBaseCurrency));
    }
}
