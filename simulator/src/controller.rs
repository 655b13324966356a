//! Simulation controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tracing::{info, warn};

use fxpair_common::Currency;
use fxpair_fx::{ConversionEngine, ConverterConfig, RateStore};

use crate::market::SimulatedMarket;
use crate::metrics::SimulationMetrics;
use crate::scenario::{AssertCondition, Scenario, ScenarioStep};

/// Drives a conversion engine through scenarios.
pub struct SimulationController {
    /// Engine under test.
    engine: ConversionEngine,
    /// Simulated provider, absent when running against a live endpoint.
    market: Option<Arc<SimulatedMarket>>,
    /// Currencies used for random selections.
    currencies: Vec<Currency>,
    /// Simulation speed multiplier.
    speed: f64,
    /// Random number generator.
    rng: StdRng,
    /// Simulation metrics.
    metrics: SimulationMetrics,
    /// Refresh interval for continuous mode.
    refresh_interval: Duration,
}

impl SimulationController {
    /// Create a controller over a simulated market.
    pub fn simulated(
        market: Arc<SimulatedMarket>,
        config: &ConverterConfig,
        speed: f64,
        seed: Option<u64>,
    ) -> Self {
        let currencies = market.currencies();
        let store = RateStore::new(market.clone());
        Self::build(store, Some(market), currencies, config, speed, seed)
    }

    /// Create a controller over any rate store.
    pub fn with_store(store: RateStore, config: &ConverterConfig, speed: f64, seed: Option<u64>) -> Self {
        let currencies = vec![
            config.default_from.clone(),
            config.default_to.clone(),
            Currency::eur(),
            Currency::gbp(),
        ];
        Self::build(store, None, currencies, config, speed, seed)
    }

    fn build(
        store: RateStore,
        market: Option<Arc<SimulatedMarket>>,
        currencies: Vec<Currency>,
        config: &ConverterConfig,
        speed: f64,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            engine: ConversionEngine::open(store, config),
            market,
            currencies,
            speed,
            rng,
            metrics: SimulationMetrics::new(),
            refresh_interval: config.refresh_interval,
        }
    }

    /// Run a scenario.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        for step in &scenario.steps {
            self.execute_step(step).await?;
        }

        self.settle().await;
        Ok(())
    }

    /// Run random selections and edits until the duration elapses or Ctrl+C.
    pub async fn run(&mut self, duration: Option<Duration>) -> anyhow::Result<()> {
        info!("Running simulation in continuous mode");

        let op_delay = Duration::from_millis((200.0 / self.speed).max(1.0) as u64);
        let mut ops = tokio::time::interval(op_delay);
        let mut refresh = tokio::time::interval(self.refresh_interval);
        let deadline = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = refresh.tick() => {
                    self.engine.refresh_rates();
                }
                _ = ops.tick() => {
                    self.random_operation();
                    // Amounts may lag a selection change until its fetch lands.
                    if self.engine.poll_updates() && !self.engine.has_pending() {
                        let passed = self.amounts_consistent();
                        self.metrics.record_assertion(passed);
                    }
                }
            }
        }

        self.settle().await;
        Ok(())
    }

    /// Get simulation metrics.
    pub fn metrics(&self) -> SimulationMetrics {
        let mut metrics = self.metrics.clone();
        metrics.store = self.engine.store().stats();
        metrics
    }

    fn random_operation(&mut self) {
        self.metrics.record_operation();

        match self.rng.gen_range(0..4) {
            0 => {
                let currency = self.random_currency();
                self.engine.set_from_currency(currency.code());
            }
            1 => {
                let currency = self.random_currency();
                self.engine.set_to_currency(currency.code());
            }
            2 => {
                let amount = Decimal::new(self.rng.gen_range(1..10_000_000), 2);
                self.engine.edit_from_amount(amount.to_string());
            }
            _ => {
                let amount = Decimal::new(self.rng.gen_range(1..10_000_000), 2);
                self.engine.edit_to_amount(amount.to_string());
            }
        }
    }

    fn random_currency(&mut self) -> Currency {
        let idx = self.rng.gen_range(0..self.currencies.len());
        self.currencies[idx].clone()
    }

    async fn settle(&mut self) {
        let started = Instant::now();
        self.engine.wait_for_rates().await;
        self.metrics.record_settle(started.elapsed().as_millis() as u64);
    }

    /// Execute a single scenario step.
    async fn execute_step(&mut self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Wait { millis } => {
                let adjusted = (*millis as f64 / self.speed) as u64;
                tokio::time::sleep(Duration::from_millis(adjusted)).await;
            }
            ScenarioStep::SetFrom { currency } => {
                self.metrics.record_operation();
                self.engine.set_from_currency(currency);
            }
            ScenarioStep::SetTo { currency } => {
                self.metrics.record_operation();
                self.engine.set_to_currency(currency);
            }
            ScenarioStep::EditFrom { amount } => {
                self.metrics.record_operation();
                self.engine.edit_from_amount(amount.clone());
            }
            ScenarioStep::EditTo { amount } => {
                self.metrics.record_operation();
                self.engine.edit_to_amount(amount.clone());
            }
            ScenarioStep::Refresh => {
                self.engine.refresh_rates();
            }
            ScenarioStep::Settle => {
                self.settle().await;
            }
            ScenarioStep::InjectFault { fault } => {
                let market = self
                    .market
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("Faults need the simulated market"))?;
                info!("Injecting fault {:?}", fault);
                market.inject(fault.clone());
            }
            ScenarioStep::ClearFault => {
                if let Some(market) = &self.market {
                    info!("Clearing fault");
                    market.clear();
                }
            }
            ScenarioStep::Assert { condition } => {
                let passed = self.check(condition);
                if passed {
                    info!("Assertion held: {:?}", condition);
                } else {
                    warn!(state = ?self.engine.state(), "Assertion failed: {:?}", condition);
                }
                self.metrics.record_assertion(passed);
            }
        }

        Ok(())
    }

    fn check(&self, condition: &AssertCondition) -> bool {
        let state = self.engine.state();
        match condition {
            AssertCondition::TableBase { currency } => state
                .table
                .as_ref()
                .map(|t| *t.base() == Currency::new(currency.as_str()))
                .unwrap_or(false),
            AssertCondition::AmountsConsistent => self.amounts_consistent(),
            AssertCondition::ToAmountEquals { amount } => state.to_amount.text == *amount,
            AssertCondition::FromAmountEquals { amount } => state.from_amount.text == *amount,
            AssertCondition::HasError => self.engine.last_error().is_some(),
            AssertCondition::NoError => self.engine.last_error().is_none(),
        }
    }

    /// Both amounts must stand for the same quantity of base currency.
    ///
    /// Holds vacuously while a currency is missing from the table.
    fn amounts_consistent(&self) -> bool {
        let state = self.engine.state();
        let Some(table) = state.table.as_ref() else {
            return true;
        };
        let (Some(from_rate), Some(to_rate)) = (
            table.rate(&state.selection.from),
            table.rate(&state.selection.to),
        ) else {
            return true;
        };

        let from_base = state.from_amount.value / from_rate.value();
        let to_base = state.to_amount.value / to_rate.value();
        let scale = from_base.abs().max(Decimal::ONE);

        (from_base - to_base).abs() <= scale * Decimal::new(1, 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> SimulationController {
        let market = Arc::new(SimulatedMarket::new(5, Some(42)));
        SimulationController::simulated(market, &ConverterConfig::default(), 1.0, Some(42))
    }

    #[tokio::test]
    async fn test_builtin_scenarios_pass() {
        for name in Scenario::builtin() {
            let mut controller = controller();
            let scenario = Scenario::load(name).unwrap();

            controller.run_scenario(&scenario).await.unwrap();

            let metrics = controller.metrics();
            assert!(metrics.all_passed(), "scenario {} failed", name);
            assert!(metrics.assertions_passed > 0);
        }
    }

    #[tokio::test]
    async fn test_rapid_flip_discards_stale_fetches() {
        let mut controller = controller();
        let scenario = Scenario::load("rapid-flip").unwrap();

        controller.run_scenario(&scenario).await.unwrap();

        let metrics = controller.metrics();
        assert_eq!(metrics.store.issued, 7);
        assert_eq!(
            metrics.store.applied + metrics.store.failed + metrics.store.discarded,
            7
        );
    }
}
