//! Simulated rate provider.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fxpair_common::{Currency, FetchToken, Rate};
use fxpair_fx::{FxError, FxResult, RateEntry, RateFetcher, RateTable};

/// Faults the simulated provider can be told to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fault {
    /// Every request fails at the transport level.
    Outage,
    /// Every request answers with this status.
    Status { code: u16 },
    /// Extra delay added to every request.
    Latency { delay_ms: u64 },
}

/// Rates of each simulated currency against USD.
const USD_RATES: &[(&str, i64, u32)] = &[
    ("BTC", 15, 6),
    ("ETH", 31, 5),
    ("EUR", 92, 2),
    ("GBP", 79, 2),
    ("JPY", 15130, 2),
    ("USD", 1, 0),
];

/// In-process rate provider with latency jitter and fault injection.
pub struct SimulatedMarket {
    usd_rates: Vec<(Currency, Decimal)>,
    rng: Mutex<StdRng>,
    fault: Mutex<Option<Fault>>,
    max_latency_ms: u64,
}

impl SimulatedMarket {
    /// Create a market with latencies up to `max_latency_ms`.
    pub fn new(max_latency_ms: u64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            usd_rates: USD_RATES
                .iter()
                .map(|(code, mantissa, scale)| (Currency::new(*code), Decimal::new(*mantissa, *scale)))
                .collect(),
            rng: Mutex::new(rng),
            fault: Mutex::new(None),
            max_latency_ms,
        }
    }

    /// Start producing a fault.
    pub fn inject(&self, fault: Fault) {
        *self.fault.lock() = Some(fault);
    }

    /// Stop producing faults.
    pub fn clear(&self) {
        *self.fault.lock() = None;
    }

    /// Currencies this market quotes.
    pub fn currencies(&self) -> Vec<Currency> {
        self.usd_rates.iter().map(|(c, _)| c.clone()).collect()
    }

    fn latency(&self) -> Duration {
        let jitter = self.rng.lock().gen_range(0..=self.max_latency_ms);
        let extra = match &*self.fault.lock() {
            Some(Fault::Latency { delay_ms }) => *delay_ms,
            _ => 0,
        };
        Duration::from_millis(jitter + extra)
    }

    fn cross_rates(&self, base: &Currency) -> FxResult<Vec<RateEntry>> {
        let base_usd = self
            .usd_rates
            .iter()
            .find(|(c, _)| c == base)
            .map(|(_, r)| *r)
            .ok_or(FxError::Provider { status_code: 400 })?;

        self.usd_rates
            .iter()
            .map(|(currency, usd_rate)| {
                let rate = Rate::new(*usd_rate / base_usd)
                    .map_err(|e| FxError::Parse(format!("{}: {}", currency, e)))?;
                Ok(RateEntry::new(currency.clone(), rate))
            })
            .collect()
    }
}

#[async_trait]
impl RateFetcher for SimulatedMarket {
    fn name(&self) -> &str {
        "SIMULATED"
    }

    async fn fetch(&self, base: &Currency, token: FetchToken) -> FxResult<RateTable> {
        if base.is_empty() {
            return Err(FxError::EmptyBaseCurrency);
        }

        let delay = self.latency();
        debug!(base = %base, token = %token, delay_ms = delay.as_millis() as u64, "Simulated request");
        tokio::time::sleep(delay).await;

        let fault = self.fault.lock().clone();
        match fault {
            Some(Fault::Outage) => Err(FxError::Transport("simulated outage".to_string())),
            Some(Fault::Status { code }) => Err(FxError::Provider { status_code: code }),
            _ => RateTable::new(base.clone(), self.cross_rates(base)?, token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_cross_rates() {
        let market = SimulatedMarket::new(0, Some(7));

        let table = market.fetch(&Currency::eur(), FetchToken::new(1)).await.unwrap();

        assert_eq!(table.rate(&Currency::eur()).unwrap().value(), dec!(1));
        assert_eq!(
            table.rate(&Currency::gbp()).unwrap().value(),
            dec!(0.79) / dec!(0.92)
        );
    }

    #[tokio::test]
    async fn test_faults() {
        let market = SimulatedMarket::new(0, Some(7));

        market.inject(Fault::Outage);
        let result = market.fetch(&Currency::usd(), FetchToken::new(1)).await;
        assert!(matches!(result, Err(FxError::Transport(_))));

        market.inject(Fault::Status { code: 503 });
        let result = market.fetch(&Currency::usd(), FetchToken::new(2)).await;
        assert_eq!(result, Err(FxError::Provider { status_code: 503 }));

        market.clear();
        assert!(market.fetch(&Currency::usd(), FetchToken::new(3)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_base() {
        let market = SimulatedMarket::new(0, Some(7));

        let result = market.fetch(&Currency::new("XYZ"), FetchToken::new(1)).await;

        assert_eq!(result, Err(FxError::Provider { status_code: 400 }));
    }
}
