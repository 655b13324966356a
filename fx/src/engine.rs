//! Bidirectional conversion engine.

use std::sync::Arc;

use fxpair_common::{AmountInput, Currency, FetchToken, Side};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::ConverterConfig;
use crate::error::FxError;
use crate::store::{FetchHandle, FetchOutcome, RateStore};
use crate::table::RateTable;

/// The two selected currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    /// Currency the rate table is fetched against.
    pub from: Currency,
    /// Currency converted to.
    pub to: Currency,
}

impl Selection {
    /// Create a new selection.
    pub fn new(from: Currency, to: Currency) -> Self {
        Self { from, to }
    }

    /// Check if both sides name the same currency.
    pub fn is_same(&self) -> bool {
        self.from == self.to
    }
}

/// Everything the presentation layer reads after an operation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionState {
    /// Selected currencies.
    pub selection: Selection,
    /// Amount in the "from" currency.
    pub from_amount: AmountInput,
    /// Amount in the "to" currency.
    pub to_amount: AmountInput,
    /// Table used for the last computation.
    pub table: Option<Arc<RateTable>>,
    /// Side most recently edited; the other side is derived from it.
    pub driving: Side,
}

impl ConversionState {
    /// Fresh state with empty amounts and no table.
    pub fn new(selection: Selection) -> Self {
        Self {
            selection,
            from_amount: AmountInput::zero(),
            to_amount: AmountInput::zero(),
            table: None,
            driving: Side::From,
        }
    }

    /// Amount field for a side.
    pub fn amount(&self, side: Side) -> &AmountInput {
        match side {
            Side::From => &self.from_amount,
            Side::To => &self.to_amount,
        }
    }

    fn amount_mut(&mut self, side: Side) -> &mut AmountInput {
        match side {
            Side::From => &mut self.from_amount,
            Side::To => &mut self.to_amount,
        }
    }

    fn currency(&self, side: Side) -> &Currency {
        match side {
            Side::From => &self.selection.from,
            Side::To => &self.selection.to,
        }
    }
}

/// Keeps a pair of amounts consistent across rate, selection and amount changes.
///
/// Owned by a single session. Edits are synchronous; rate fetches triggered
/// by selection changes run in the background and are folded back in by
/// [`poll_updates`](Self::poll_updates) or
/// [`wait_for_rates`](Self::wait_for_rates).
///
/// Fetches run on the store's runtime (see [`RateStore::with_handle`]) or on
/// the calling thread's. Without either, a fetch settles as
/// [`FxError::TaskFailed`] and shows up through [`last_error`](Self::last_error).
pub struct ConversionEngine {
    store: RateStore,
    state: ConversionState,
    pending: Vec<FetchHandle>,
    last_error: Option<FxError>,
}

impl ConversionEngine {
    /// Create an engine without fetching anything.
    pub fn new(store: RateStore, selection: Selection) -> Self {
        let mut state = ConversionState::new(selection);
        state.table = store.current();

        Self {
            store,
            state,
            pending: Vec::new(),
            last_error: None,
        }
    }

    /// Create an engine with the configured default currencies and start
    /// loading rates for the "from" side.
    pub fn open(store: RateStore, config: &ConverterConfig) -> Self {
        let selection = Selection::new(config.default_from.clone(), config.default_to.clone());
        let mut engine = Self::new(store, selection);
        engine.ensure_rates();
        engine
    }

    /// Current state.
    pub fn state(&self) -> &ConversionState {
        &self.state
    }

    /// Store backing this engine.
    pub fn store(&self) -> &RateStore {
        &self.store
    }

    /// Currency codes offered by the current table, sorted.
    pub fn currencies(&self) -> Vec<Currency> {
        self.state
            .table
            .as_ref()
            .map(|t| t.currencies().cloned().collect())
            .unwrap_or_default()
    }

    /// Error from the most recent winning fetch, if it failed.
    pub fn last_error(&self) -> Option<&FxError> {
        self.last_error.as_ref()
    }

    /// Take and clear the last fetch error.
    pub fn take_error(&mut self) -> Option<FxError> {
        self.last_error.take()
    }

    /// Check if fetches issued by this engine are still outstanding.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Select the "from" currency.
    #[instrument(skip(self, code), fields(code = %code.as_ref()))]
    pub fn set_from_currency(&mut self, code: impl AsRef<str>) -> &ConversionState {
        self.state.selection.from = Currency::new(code.as_ref());
        self.after_selection_change();
        &self.state
    }

    /// Select the "to" currency.
    #[instrument(skip(self, code), fields(code = %code.as_ref()))]
    pub fn set_to_currency(&mut self, code: impl AsRef<str>) -> &ConversionState {
        self.state.selection.to = Currency::new(code.as_ref());
        self.after_selection_change();
        &self.state
    }

    /// Edit the "from" amount; the "to" amount is derived.
    pub fn edit_from_amount(&mut self, text: impl Into<String>) -> &ConversionState {
        self.edit(Side::From, text.into())
    }

    /// Edit the "to" amount; the "from" amount is derived.
    pub fn edit_to_amount(&mut self, text: impl Into<String>) -> &ConversionState {
        self.edit(Side::To, text.into())
    }

    /// Number of issued fetches not yet folded in.
    pub fn pending_fetches(&self) -> usize {
        self.pending.len()
    }

    /// Re-fetch rates for the current "from" currency.
    pub fn refresh_rates(&mut self) -> FetchToken {
        // Fold in settled fetches so callers that never poll stay bounded.
        self.poll_updates();

        let handle = self.store.begin_fetch(self.state.selection.from.clone());
        let token = handle.token();
        self.pending.push(handle);
        token
    }

    /// Fold in every fetch that has settled, without waiting.
    ///
    /// Returns true if the state changed.
    pub fn poll_updates(&mut self) -> bool {
        let mut changed = false;
        let mut still_pending = Vec::with_capacity(self.pending.len());

        for mut handle in std::mem::take(&mut self.pending) {
            match handle.try_outcome() {
                Some(outcome) => changed |= self.apply_outcome(handle.token(), outcome),
                None => still_pending.push(handle),
            }
        }

        self.pending = still_pending;
        changed
    }

    /// Wait for every outstanding fetch and fold in the results.
    ///
    /// Returns true if the state changed.
    pub async fn wait_for_rates(&mut self) -> bool {
        let mut changed = false;

        while !self.pending.is_empty() {
            let handle = self.pending.remove(0);
            let token = handle.token();
            let outcome = handle.outcome().await;
            changed |= self.apply_outcome(token, outcome);
        }

        changed
    }

    fn edit(&mut self, side: Side, text: String) -> &ConversionState {
        *self.state.amount_mut(side) = AmountInput::parse(text);
        self.state.driving = side;
        self.derive();
        &self.state
    }

    fn after_selection_change(&mut self) {
        if !self.ensure_rates() {
            self.adopt(self.store.current());
            self.derive();
        }
    }

    /// Start a fetch unless the store already has, or is already fetching,
    /// a table for the "from" currency. Returns true if a fetch was issued.
    fn ensure_rates(&mut self) -> bool {
        let from = &self.state.selection.from;
        if self.store.pending_base().as_ref() == Some(from) {
            return false;
        }

        debug!(from = %from, "Rates needed for new base");
        self.refresh_rates();
        true
    }

    fn apply_outcome(&mut self, token: FetchToken, outcome: FetchOutcome) -> bool {
        match outcome {
            FetchOutcome::Applied(table) => {
                if self.adopt(Some(table)) {
                    self.last_error = None;
                    self.derive();
                    true
                } else {
                    false
                }
            }
            FetchOutcome::Failed(e) => {
                warn!(token = %token, error = %e, "Rates unavailable, showing last known values");
                self.last_error = Some(e);
                true
            }
            FetchOutcome::Discarded => {
                debug!(token = %token, "Ignoring superseded fetch");
                false
            }
        }
    }

    /// Switch to `table` if it is newer than the one in use.
    fn adopt(&mut self, table: Option<Arc<RateTable>>) -> bool {
        let Some(table) = table else {
            return false;
        };

        let newer = match &self.state.table {
            Some(current) => table.fetched_at() > current.fetched_at(),
            None => true,
        };

        if newer {
            info!(
                base = %table.base(),
                token = %table.fetched_at(),
                "Using new rate table"
            );
            self.state.table = Some(table);
        }
        newer
    }

    /// Recompute the derived amount from the driving one.
    fn derive(&mut self) {
        let driving = self.state.driving;
        let derived_side = driving.opposite();
        let value = self.state.amount(driving).value;

        if self.state.selection.is_same() {
            *self.state.amount_mut(derived_side) = AmountInput::from_value(value);
            return;
        }

        let Some(table) = self.state.table.as_ref() else {
            debug!("No rate table yet, keeping derived amount");
            return;
        };

        let from = self.state.currency(driving);
        let to = self.state.currency(derived_side);

        match table.convert(value, from, to) {
            Some(converted) => {
                *self.state.amount_mut(derived_side) = AmountInput::from_value(converted);
            }
            None => {
                debug!(
                    from = %from,
                    to = %to,
                    base = %table.base(),
                    "Cannot convert with current table, keeping derived amount"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockRateFetcher;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn usd_fetcher() -> Arc<MockRateFetcher> {
        let fetcher = Arc::new(MockRateFetcher::new());
        fetcher.set_rates(
            Currency::usd(),
            &[("USD", dec!(1)), ("EUR", dec!(0.9)), ("ETH", dec!(0.0005))],
        );
        fetcher
    }

    async fn loaded_engine(fetcher: Arc<MockRateFetcher>, to: &str) -> ConversionEngine {
        let store = RateStore::new(fetcher);
        let mut engine = ConversionEngine::new(store, Selection::new(Currency::usd(), Currency::new(to)));
        engine.refresh_rates();
        engine.wait_for_rates().await;
        engine
    }

    #[tokio::test]
    async fn test_edit_from_amount_converts() {
        let mut engine = loaded_engine(usd_fetcher(), "ETH").await;

        let state = engine.edit_from_amount("1000");

        assert_eq!(state.to_amount.text, "0.5");
        assert_eq!(state.to_amount.value, dec!(0.5));
        assert_eq!(state.driving, Side::From);
    }

    #[tokio::test]
    async fn test_edit_to_amount_converts_back() {
        let mut engine = loaded_engine(usd_fetcher(), "EUR").await;

        let state = engine.edit_to_amount("90");

        assert_eq!(state.from_amount.value, dec!(100));
        assert_eq!(state.to_amount.text, "90");
        assert_eq!(state.driving, Side::To);
    }

    #[tokio::test]
    async fn test_non_numeric_input_counts_as_zero() {
        let mut engine = loaded_engine(usd_fetcher(), "EUR").await;
        engine.edit_from_amount("10");

        let state = engine.edit_from_amount("ten");

        assert_eq!(state.from_amount.text, "ten");
        assert_eq!(state.to_amount.value, Decimal::ZERO);
        assert!(engine.last_error().is_none());
    }

    #[tokio::test]
    async fn test_same_currency_keeps_amounts_equal() {
        let mut engine = loaded_engine(usd_fetcher(), "USD").await;

        let state = engine.edit_from_amount("42.5");
        assert_eq!(state.to_amount.value, dec!(42.5));

        let state = engine.edit_to_amount("7");
        assert_eq!(state.from_amount.value, dec!(7));
    }

    #[test]
    fn test_selection_change_without_runtime_reports_error() {
        let store = RateStore::new(usd_fetcher());
        let mut engine = ConversionEngine::new(store, Selection::new(Currency::usd(), Currency::eth()));

        let state = engine.set_from_currency("EUR");
        assert_eq!(state.selection.from, Currency::eur());

        assert!(engine.poll_updates());
        assert!(matches!(engine.last_error(), Some(FxError::TaskFailed(_))));
        assert!(!engine.has_pending());
        assert!(engine.state().table.is_none());
    }

    #[test]
    fn test_selection_change_off_runtime_with_handle() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let fetcher = usd_fetcher();
        fetcher.set_rates(Currency::eur(), &[("USD", dec!(1.1)), ("ETH", dec!(0.00055))]);
        let store = RateStore::with_handle(fetcher, runtime.handle().clone());
        let mut engine = ConversionEngine::new(store, Selection::new(Currency::usd(), Currency::eth()));

        engine.set_from_currency("EUR");
        assert!(runtime.block_on(engine.wait_for_rates()));

        assert_eq!(engine.state().table.as_ref().unwrap().base(), &Currency::eur());
        assert!(engine.last_error().is_none());
    }

    #[tokio::test]
    async fn test_repeated_refresh_keeps_pending_bounded() {
        let mut engine = ConversionEngine::new(
            RateStore::new(usd_fetcher()),
            Selection::new(Currency::usd(), Currency::eur()),
        );

        for _ in 0..10 {
            engine.refresh_rates();
            while engine.store().is_fetching() {
                tokio::task::yield_now().await;
            }
        }

        assert_eq!(engine.pending_fetches(), 1);
        assert_eq!(engine.store().stats().issued, 10);
        assert_eq!(engine.state().table.as_ref().unwrap().base(), &Currency::usd());
    }

    #[test]
    fn test_same_currency_without_table() {
        let store = RateStore::new(Arc::new(MockRateFetcher::new()));
        let mut engine = ConversionEngine::new(store, Selection::new(Currency::eur(), Currency::eur()));

        let state = engine.edit_from_amount("3");

        assert_eq!(state.to_amount.value, dec!(3));
    }

    #[test]
    fn test_edit_before_first_table_keeps_derived() {
        let store = RateStore::new(Arc::new(MockRateFetcher::new()));
        let mut engine = ConversionEngine::new(store, Selection::new(Currency::usd(), Currency::eth()));

        let state = engine.edit_from_amount("1000");

        assert_eq!(state.from_amount.value, dec!(1000));
        assert_eq!(state.to_amount, AmountInput::zero());
    }

    #[tokio::test]
    async fn test_unknown_to_currency_keeps_derived() {
        let mut engine = loaded_engine(usd_fetcher(), "EUR").await;
        engine.edit_from_amount("10");

        engine.set_to_currency("XYZ");
        let state = engine.edit_from_amount("20");

        assert_eq!(state.to_amount.value, dec!(9));
    }

    #[tokio::test]
    async fn test_set_to_currency_recomputes_immediately() {
        let fetcher = usd_fetcher();
        let mut engine = loaded_engine(fetcher.clone(), "EUR").await;
        engine.edit_from_amount("1000");

        let state = engine.set_to_currency("ETH");

        assert_eq!(state.to_amount.value, dec!(0.5));
        assert!(!engine.has_pending());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_set_from_currency_waits_for_new_table() {
        let fetcher = usd_fetcher();
        fetcher.set_rates(
            Currency::eur(),
            &[("EUR", dec!(1)), ("USD", dec!(1.25)), ("ETH", dec!(0.0006))],
        );
        let mut engine = loaded_engine(fetcher.clone(), "ETH").await;
        engine.edit_from_amount("1000");

        let state = engine.set_from_currency("EUR");
        assert_eq!(state.to_amount.value, dec!(0.5));
        assert!(engine.has_pending());

        engine.wait_for_rates().await;

        let state = engine.state();
        assert_eq!(state.table.as_ref().unwrap().base(), &Currency::eur());
        assert_eq!(state.from_amount.value, dec!(1000));
        assert_eq!(state.to_amount.value, dec!(0.6));
    }

    #[tokio::test]
    async fn test_recompute_uses_driving_side() {
        let fetcher = usd_fetcher();
        fetcher.set_rates(
            Currency::eur(),
            &[("EUR", dec!(1)), ("USD", dec!(1.25)), ("ETH", dec!(0.0006))],
        );
        let mut engine = loaded_engine(fetcher, "ETH").await;
        engine.edit_to_amount("3");

        engine.set_from_currency("EUR");
        engine.wait_for_rates().await;

        let state = engine.state();
        assert_eq!(state.to_amount.text, "3");
        assert_eq!(state.from_amount.value, dec!(5000));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_stale_table() {
        let fetcher = usd_fetcher();
        let mut engine = loaded_engine(fetcher.clone(), "ETH").await;
        fetcher.fail_with(Currency::usd(), FxError::Transport("offline".into()));

        engine.refresh_rates();
        engine.wait_for_rates().await;

        assert_eq!(engine.last_error(), Some(&FxError::Transport("offline".into())));
        let state = engine.edit_from_amount("2000");
        assert_eq!(state.to_amount.value, dec!(1));
        assert_eq!(state.table.as_ref().unwrap().base(), &Currency::usd());
    }

    #[tokio::test]
    async fn test_open_loads_default_selection() {
        let store = RateStore::new(usd_fetcher());
        let mut engine = ConversionEngine::open(store, &ConverterConfig::default());

        assert!(engine.has_pending());
        engine.wait_for_rates().await;

        assert_eq!(engine.state().selection.from, Currency::usd());
        assert_eq!(engine.state().selection.to, Currency::eth());
        let codes: Vec<String> = engine.currencies().iter().map(|c| c.to_string()).collect();
        assert_eq!(codes, vec!["ETH", "EUR", "USD"]);
    }

    #[tokio::test]
    async fn test_poll_updates_picks_up_settled_fetch() {
        let fetcher = usd_fetcher();
        fetcher.hold(Currency::usd());
        let store = RateStore::new(fetcher.clone());
        let mut engine = ConversionEngine::new(store, Selection::new(Currency::usd(), Currency::eth()));
        engine.refresh_rates();
        engine.edit_from_amount("1000");

        assert!(!engine.poll_updates());

        fetcher.release(&Currency::usd());
        while engine.has_pending() {
            tokio::task::yield_now().await;
            engine.poll_updates();
        }

        assert_eq!(engine.state().to_amount.value, dec!(0.5));
    }
}
