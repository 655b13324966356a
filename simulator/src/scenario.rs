//! Simulation scenarios.

use serde::{Deserialize, Serialize};

use crate::market::Fault;

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Wait for a duration.
    Wait { millis: u64 },
    /// Select the "from" currency.
    SetFrom { currency: String },
    /// Select the "to" currency.
    SetTo { currency: String },
    /// Type into the "from" amount.
    EditFrom { amount: String },
    /// Type into the "to" amount.
    EditTo { amount: String },
    /// Refresh rates for the current "from" currency.
    Refresh,
    /// Wait until every outstanding fetch has settled.
    Settle,
    /// Make the provider misbehave.
    InjectFault { fault: Fault },
    /// Restore the provider.
    ClearFault,
    /// Assert a condition.
    Assert { condition: AssertCondition },
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssertCondition {
    /// The engine's table is quoted against this currency.
    TableBase { currency: String },
    /// Both amounts stand for the same quantity of base currency.
    AmountsConsistent,
    /// The "to" amount shows exactly this text.
    ToAmountEquals { amount: String },
    /// The "from" amount shows exactly this text.
    FromAmountEquals { amount: String },
    /// The last fetch failed.
    HasError,
    /// No fetch error is pending.
    NoError,
}

impl Scenario {
    /// Load a built-in scenario by name, or a JSON scenario from a path.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "rapid-flip" => Ok(Self::rapid_flip()),
            "provider-outage" => Ok(Self::provider_outage()),
            "round-trip" => Ok(Self::round_trip()),
            "same-currency" => Ok(Self::same_currency()),
            path if path.ends_with(".json") => {
                let text = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&text)?)
            }
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Names of the built-in scenarios.
    pub fn builtin() -> &'static [&'static str] {
        &["rapid-flip", "provider-outage", "round-trip", "same-currency"]
    }

    /// Flip the "from" currency faster than the provider answers.
    fn rapid_flip() -> Self {
        let mut steps = vec![
            ScenarioStep::Settle,
            ScenarioStep::EditFrom {
                amount: "1000".to_string(),
            },
        ];
        for currency in ["EUR", "GBP", "JPY", "EUR", "BTC", "GBP"] {
            steps.push(ScenarioStep::SetFrom {
                currency: currency.to_string(),
            });
            steps.push(ScenarioStep::Wait { millis: 5 });
        }
        steps.push(ScenarioStep::Settle);
        steps.push(ScenarioStep::Assert {
            condition: AssertCondition::TableBase {
                currency: "GBP".to_string(),
            },
        });
        steps.push(ScenarioStep::Assert {
            condition: AssertCondition::AmountsConsistent,
        });
        steps.push(ScenarioStep::Assert {
            condition: AssertCondition::NoError,
        });

        Self {
            name: "rapid-flip".to_string(),
            description: "Out-of-order responses must not override the newest selection".to_string(),
            steps,
        }
    }

    /// Keep converting on stale rates while the provider is down.
    fn provider_outage() -> Self {
        Self {
            name: "provider-outage".to_string(),
            description: "Failed refreshes keep the last known table".to_string(),
            steps: vec![
                ScenarioStep::Settle,
                ScenarioStep::InjectFault { fault: Fault::Outage },
                ScenarioStep::Refresh,
                ScenarioStep::Settle,
                ScenarioStep::Assert {
                    condition: AssertCondition::HasError,
                },
                ScenarioStep::EditFrom {
                    amount: "250".to_string(),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::AmountsConsistent,
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::TableBase {
                        currency: "USD".to_string(),
                    },
                },
                ScenarioStep::ClearFault,
                ScenarioStep::Refresh,
                ScenarioStep::Settle,
                ScenarioStep::Assert {
                    condition: AssertCondition::NoError,
                },
            ],
        }
    }

    /// Convert forth and back.
    fn round_trip() -> Self {
        Self {
            name: "round-trip".to_string(),
            description: "Editing either side keeps both amounts consistent".to_string(),
            steps: vec![
                ScenarioStep::Settle,
                ScenarioStep::SetTo {
                    currency: "EUR".to_string(),
                },
                ScenarioStep::EditFrom {
                    amount: "100".to_string(),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ToAmountEquals {
                        amount: "92".to_string(),
                    },
                },
                ScenarioStep::EditTo {
                    amount: "92".to_string(),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::FromAmountEquals {
                        amount: "100".to_string(),
                    },
                },
                ScenarioStep::EditFrom {
                    amount: "not a number".to_string(),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ToAmountEquals {
                        amount: "0".to_string(),
                    },
                },
            ],
        }
    }

    /// Same currency on both sides.
    fn same_currency() -> Self {
        Self {
            name: "same-currency".to_string(),
            description: "Identical currencies mirror each other".to_string(),
            steps: vec![
                ScenarioStep::Settle,
                ScenarioStep::SetTo {
                    currency: "USD".to_string(),
                },
                ScenarioStep::EditTo {
                    amount: "12.75".to_string(),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::FromAmountEquals {
                        amount: "12.75".to_string(),
                    },
                },
            ],
        }
    }
}
