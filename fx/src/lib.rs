//! fxpair FX Engine
//!
//! Bidirectional currency conversion over a live rate table.
//!
//! # Components
//!
//! - [`RateFetcher`]: pulls the full rate table for a base currency
//! - [`RateStore`]: keeps the newest table, dropping results of superseded fetches
//! - [`ConversionEngine`]: keeps a "from" and a "to" amount consistent
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fxpair_fx::{ConversionEngine, ConverterConfig, HttpRateFetcher, RateStore};
//!
//! let config = ConverterConfig::from_env();
//! let store = RateStore::new(Arc::new(HttpRateFetcher::new(&config)?));
//!
//! // Starts loading USD rates in the background.
//! let mut engine = ConversionEngine::open(store, &config);
//! engine.wait_for_rates().await;
//!
//! let state = engine.edit_from_amount("1000");
//! println!("{} {}", state.to_amount, state.selection.to);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod provider;
pub mod store;
pub mod table;

pub use config::ConverterConfig;
pub use engine::{ConversionEngine, ConversionState, Selection};
pub use error::{FxError, FxResult};
pub use http::{parse_rates_response, HttpRateFetcher};
pub use provider::RateFetcher;
#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateFetcher;
pub use store::{FetchHandle, FetchOutcome, RateStore, StoreStats};
pub use table::{RateEntry, RateTable};
