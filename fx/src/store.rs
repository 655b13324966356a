//! Rate store with last-request-wins arbitration.
//!
//! Every fetch gets a [`FetchToken`] when it is issued. A result is applied
//! only if no newer fetch was issued in the meantime; older results are
//! dropped whether they carry a table or an error. The current table and the
//! latest issued token sit behind one mutex so the check and the update
//! happen in a single critical section.

use std::sync::Arc;

use fxpair_common::{Currency, FetchToken};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::error::{FxError, FxResult};
use crate::provider::RateFetcher;
use crate::table::RateTable;

/// How a settled fetch affected the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The fetch was the newest one and its table is now current.
    Applied(Arc<RateTable>),
    /// The fetch was the newest one and failed; the current table is kept.
    Failed(FxError),
    /// A newer fetch was issued, so this result was dropped.
    Discarded,
}

impl FetchOutcome {
    /// Check if the result was dropped as stale.
    pub fn is_discarded(&self) -> bool {
        matches!(self, FetchOutcome::Discarded)
    }
}

/// Store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Fetches issued.
    pub issued: u64,
    /// Winning fetches whose table became current.
    pub applied: u64,
    /// Winning fetches that failed.
    pub failed: u64,
    /// Results dropped because a newer fetch existed.
    pub discarded: u64,
}

#[derive(Debug)]
struct IssuedFetch {
    token: FetchToken,
    base: Currency,
    settled: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    current: Option<Arc<RateTable>>,
    last_token: FetchToken,
    latest: Option<IssuedFetch>,
    stats: StoreStats,
}

/// Handle to an issued fetch.
#[derive(Debug)]
pub struct FetchHandle {
    token: FetchToken,
    base: Currency,
    outcome: oneshot::Receiver<FetchOutcome>,
}

impl FetchHandle {
    /// Token assigned to the fetch.
    pub fn token(&self) -> FetchToken {
        self.token
    }

    /// Base currency requested.
    pub fn base(&self) -> &Currency {
        &self.base
    }

    /// Wait for the fetch to settle.
    pub async fn outcome(self) -> FetchOutcome {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => FetchOutcome::Failed(FxError::TaskFailed(format!(
                "fetch {} ended without a result",
                self.token
            ))),
        }
    }

    /// Get the outcome if the fetch has settled, without waiting.
    pub fn try_outcome(&mut self) -> Option<FetchOutcome> {
        match self.outcome.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(FetchOutcome::Failed(
                FxError::TaskFailed(format!("fetch {} ended without a result", self.token)),
            )),
        }
    }
}

/// Holds the latest winning rate table.
///
/// Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct RateStore {
    fetcher: Arc<dyn RateFetcher>,
    state: Arc<Mutex<StoreState>>,
    runtime: Option<Handle>,
}

impl RateStore {
    /// Create an empty store backed by a fetcher.
    ///
    /// Fetches run on the runtime of whichever thread issues them.
    pub fn new(fetcher: Arc<dyn RateFetcher>) -> Self {
        Self {
            fetcher,
            state: Arc::new(Mutex::new(StoreState::default())),
            runtime: None,
        }
    }

    /// Create an empty store whose fetches always run on `runtime`, so
    /// threads without a Tokio context can issue them.
    pub fn with_handle(fetcher: Arc<dyn RateFetcher>, runtime: Handle) -> Self {
        Self {
            runtime: Some(runtime),
            ..Self::new(fetcher)
        }
    }

    /// Issue a fetch for `base` and run it in the background.
    ///
    /// Returns immediately. With no runtime to run on, the fetch settles at
    /// once as [`FxError::TaskFailed`].
    #[instrument(skip(self, base), fields(base = %base))]
    pub fn begin_fetch(&self, base: Currency) -> FetchHandle {
        let token = self.issue(base.clone());
        let (tx, rx) = oneshot::channel();

        let runtime = match self.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => runtime,
            None => {
                warn!(token = %token, "No async runtime available for rate fetch");
                let outcome = self.apply_result(
                    token,
                    Err(FxError::TaskFailed("no async runtime to run the fetch".to_string())),
                );
                let _ = tx.send(outcome);
                return FetchHandle {
                    token,
                    base,
                    outcome: rx,
                };
            }
        };

        let store = self.clone();
        let fetch_base = base.clone();
        runtime.spawn(async move {
            let fetcher = store.fetcher.clone();
            // Run the fetch as its own task so a panic still settles the token.
            let result = tokio::spawn(async move { fetcher.fetch(&fetch_base, token).await })
                .await
                .unwrap_or_else(|e| Err(FxError::TaskFailed(e.to_string())));

            let outcome = store.apply_result(token, result);
            // The issuer may have stopped listening.
            let _ = tx.send(outcome);
        });

        FetchHandle {
            token,
            base,
            outcome: rx,
        }
    }

    /// Allocate the next token for `base` and mark it as the newest fetch.
    ///
    /// [`begin_fetch`](Self::begin_fetch) calls this before spawning the
    /// request; callers driving their own transport call it directly and
    /// report back through [`apply_result`](Self::apply_result).
    pub fn issue(&self, base: Currency) -> FetchToken {
        let mut state = self.state.lock();
        let token = state.last_token.next();
        state.last_token = token;
        state.stats.issued += 1;

        debug!(token = %token, base = %base, "Issued rate fetch");

        state.latest = Some(IssuedFetch {
            token,
            base,
            settled: false,
        });
        token
    }

    /// Settle a fetch.
    ///
    /// Only the newest issued token can change the store, and only once.
    pub fn apply_result(&self, token: FetchToken, result: FxResult<RateTable>) -> FetchOutcome {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let latest = match state.latest.as_mut() {
            Some(latest) if latest.token == token && !latest.settled => latest,
            _ => {
                state.stats.discarded += 1;
                debug!(
                    token = %token,
                    newest = %state.last_token,
                    ok = result.is_ok(),
                    "Discarded stale rate fetch"
                );
                return FetchOutcome::Discarded;
            }
        };
        latest.settled = true;

        match result {
            Ok(table) => {
                let table = Arc::new(table);
                info!(
                    token = %token,
                    base = %table.base(),
                    currencies = table.len(),
                    "Applied rate table"
                );
                state.current = Some(table.clone());
                state.stats.applied += 1;
                FetchOutcome::Applied(table)
            }
            Err(e) => {
                warn!(
                    token = %token,
                    base = %latest.base,
                    error = %e,
                    "Rate fetch failed, keeping last known table"
                );
                state.stats.failed += 1;
                FetchOutcome::Failed(e)
            }
        }
    }

    /// The current table, if any fetch has succeeded.
    pub fn current(&self) -> Option<Arc<RateTable>> {
        self.state.lock().current.clone()
    }

    /// Base currency the store is converging on.
    ///
    /// That is the newest fetch's base while it is in flight, otherwise the
    /// base of the current table.
    pub fn pending_base(&self) -> Option<Currency> {
        let state = self.state.lock();
        match &state.latest {
            Some(latest) if !latest.settled => Some(latest.base.clone()),
            _ => state.current.as_ref().map(|t| t.base().clone()),
        }
    }

    /// Check if the newest fetch has not settled yet.
    pub fn is_fetching(&self) -> bool {
        self.state
            .lock()
            .latest
            .as_ref()
            .map(|l| !l.settled)
            .unwrap_or(false)
    }

    /// Get store counters.
    pub fn stats(&self) -> StoreStats {
        self.state.lock().stats
    }

    /// Name of the underlying fetcher.
    pub fn fetcher_name(&self) -> &str {
        self.fetcher.name()
    }
}
