//! Rate fetcher trait and test implementations.

use async_trait::async_trait;
use fxpair_common::{Currency, FetchToken};

use crate::error::FxResult;
use crate::table::RateTable;

/// Retrieves the full rate table for a base currency.
///
/// Implementations may be called concurrently and must not retry on their
/// own; retry policy belongs to the caller.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    /// Get the fetcher name.
    fn name(&self) -> &str;

    /// Fetch every rate quoted against `base`, stamping the table with `token`.
    async fn fetch(&self, base: &Currency, token: FetchToken) -> FxResult<RateTable>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockRateFetcher;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use dashmap::DashMap;
    use fxpair_common::{Currency, FetchToken, Rate};
    use rust_decimal::Decimal;
    use tokio::sync::Semaphore;

    use super::RateFetcher;
    use crate::error::{FxError, FxResult};
    use crate::table::{RateEntry, RateTable};

    /// Mock rate fetcher for testing.
    ///
    /// Serves scripted tables per base currency. A base can be put on hold so
    /// its fetches park until released, which lets tests choose the order in
    /// which concurrent fetches complete.
    #[derive(Default)]
    pub struct MockRateFetcher {
        rates: DashMap<Currency, Vec<(Currency, Decimal)>>,
        failures: DashMap<Currency, FxError>,
        gates: DashMap<Currency, Arc<Semaphore>>,
        calls: AtomicUsize,
    }

    impl MockRateFetcher {
        /// Create a new mock fetcher.
        pub fn new() -> Self {
            Self::default()
        }

        /// Set the rates served for a base currency.
        pub fn set_rates(&self, base: Currency, rates: &[(&str, Decimal)]) {
            let rates = rates
                .iter()
                .map(|(code, rate)| (Currency::new(*code), *rate))
                .collect();
            self.rates.insert(base, rates);
        }

        /// Make fetches for a base fail with the given error.
        pub fn fail_with(&self, base: Currency, error: FxError) {
            self.failures.insert(base, error);
        }

        /// Stop failing fetches for a base.
        pub fn clear_failure(&self, base: &Currency) {
            self.failures.remove(base);
        }

        /// Park every fetch for a base until [`release`](Self::release) is called.
        pub fn hold(&self, base: Currency) {
            self.gates.insert(base, Arc::new(Semaphore::new(0)));
        }

        /// Let one parked fetch for a base complete.
        pub fn release(&self, base: &Currency) {
            if let Some(gate) = self.gates.get(base) {
                gate.add_permits(1);
            }
        }

        /// Number of fetches started so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateFetcher for MockRateFetcher {
        fn name(&self) -> &str {
            "MOCK"
        }

        async fn fetch(&self, base: &Currency, token: FetchToken) -> FxResult<RateTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if base.is_empty() {
                return Err(FxError::EmptyBaseCurrency);
            }

            let gate = self.gates.get(base).map(|g| g.clone());
            if let Some(gate) = gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|e| FxError::Transport(e.to_string()))?;
                permit.forget();
            }

            if let Some(error) = self.failures.get(base) {
                return Err(error.clone());
            }

            let rates = self
                .rates
                .get(base)
                .map(|r| r.clone())
                .ok_or(FxError::Provider { status_code: 400 })?;

            let entries = rates
                .into_iter()
                .map(|(currency, rate)| {
                    Rate::new(rate)
                        .map(|rate| RateEntry::new(currency.clone(), rate))
                        .map_err(|e| FxError::Parse(format!("{}: {}", currency, e)))
                })
                .collect::<FxResult<Vec<_>>>()?;

            RateTable::new(base.clone(), entries, token)
        }
    }
}
