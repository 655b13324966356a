//! Immutable rate tables quoted against a base currency.

use chrono::{DateTime, Utc};
use fxpair_common::{Currency, FetchToken, Rate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{FxError, FxResult};

/// Rate of one currency against the table's base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateEntry {
    /// Quoted currency.
    pub currency: Currency,
    /// Units of `currency` per one unit of base.
    pub rate: Rate,
}

impl RateEntry {
    /// Create a new entry.
    pub fn new(currency: Currency, rate: Rate) -> Self {
        Self { currency, rate }
    }
}

/// A full set of rates against one base currency.
///
/// Entries are sorted by currency code and codes are unique. The base
/// currency is always present; when the provider leaves it out it is added
/// with a rate of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateTable {
    base: Currency,
    entries: Vec<RateEntry>,
    fetched_at: FetchToken,
    received_at: DateTime<Utc>,
}

impl RateTable {
    /// Build a table, rejecting duplicate currency codes.
    pub fn new(base: Currency, mut entries: Vec<RateEntry>, fetched_at: FetchToken) -> FxResult<Self> {
        entries.sort_by(|a, b| a.currency.cmp(&b.currency));

        if let Some(pair) = entries.windows(2).find(|w| w[0].currency == w[1].currency) {
            return Err(FxError::Parse(format!(
                "duplicate rate for {}",
                pair[0].currency
            )));
        }

        if let Err(idx) = entries.binary_search_by(|e| e.currency.cmp(&base)) {
            entries.insert(idx, RateEntry::new(base.clone(), Rate::ONE));
        }

        Ok(Self {
            base,
            entries,
            fetched_at,
            received_at: Utc::now(),
        })
    }

    /// Currency all rates are quoted against.
    pub fn base(&self) -> &Currency {
        &self.base
    }

    /// Entries in currency code order.
    pub fn entries(&self) -> &[RateEntry] {
        &self.entries
    }

    /// Token of the fetch that produced this table.
    pub fn fetched_at(&self) -> FetchToken {
        self.fetched_at
    }

    /// When the provider response was parsed.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Look up the rate of a currency.
    pub fn rate(&self, currency: &Currency) -> Option<Rate> {
        self.entries
            .binary_search_by(|e| e.currency.cmp(currency))
            .ok()
            .map(|idx| self.entries[idx].rate)
    }

    /// Check if a currency is quoted in this table.
    pub fn contains(&self, currency: &Currency) -> bool {
        self.rate(currency).is_some()
    }

    /// Currency codes in sorted order.
    pub fn currencies(&self) -> impl Iterator<Item = &Currency> {
        self.entries.iter().map(|e| &e.currency)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert an amount of `from` into `to`.
    ///
    /// Returns `None` when either currency is missing or the result does not
    /// fit in a decimal.
    ///
    /// Results carry at most 28 decimal places, so a quotient smaller than
    /// about `1e-16` keeps fewer than twelve significant digits and no longer
    /// converts back within `1e-8` relative.
    pub fn convert(&self, amount: Decimal, from: &Currency, to: &Currency) -> Option<Decimal> {
        let from_rate = self.rate(from)?;
        let to_rate = self.rate(to)?;

        // Multiply first to keep precision for tiny rates.
        amount
            .checked_mul(to_rate.value())?
            .checked_div(from_rate.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(code: &str, rate: Decimal) -> RateEntry {
        RateEntry::new(Currency::new(code), Rate::new(rate).unwrap())
    }

    fn usd_table() -> RateTable {
        RateTable::new(
            Currency::usd(),
            vec![
                entry("ETH", dec!(0.0005)),
                entry("USD", dec!(1)),
                entry("EUR", dec!(0.9)),
            ],
            FetchToken::new(1),
        )
        .unwrap()
    }

    #[test]
    fn test_entries_sorted() {
        let table = usd_table();
        let codes: Vec<&str> = table.currencies().map(|c| c.code()).collect();

        assert_eq!(codes, vec!["ETH", "EUR", "USD"]);
        assert_eq!(table.fetched_at(), FetchToken::new(1));
    }

    #[test]
    fn test_duplicate_currency_rejected() {
        let result = RateTable::new(
            Currency::usd(),
            vec![entry("EUR", dec!(0.9)), entry("EUR", dec!(0.91))],
            FetchToken::new(1),
        );

        assert!(matches!(result, Err(FxError::Parse(_))));
    }

    #[test]
    fn test_missing_base_is_implied() {
        let table = RateTable::new(
            Currency::eur(),
            vec![entry("USD", dec!(1.1))],
            FetchToken::new(2),
        )
        .unwrap();

        assert_eq!(table.rate(&Currency::eur()), Some(Rate::ONE));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_convert_through_base() {
        let table = usd_table();

        let eth = table
            .convert(dec!(1000), &Currency::usd(), &Currency::eth())
            .unwrap();
        assert_eq!(eth, dec!(0.5));

        let usd = table
            .convert(dec!(0.9), &Currency::eur(), &Currency::usd())
            .unwrap();
        assert_eq!(usd, dec!(1));
    }

    #[test]
    fn test_convert_extreme_rates_round_trip() {
        let table = RateTable::new(
            Currency::usd(),
            vec![entry("AAA", dec!(77777777.7)), entry("BBB", dec!(0.0000001))],
            FetchToken::new(1),
        )
        .unwrap();
        let (aaa, bbb) = (Currency::new("AAA"), Currency::new("BBB"));
        let amount = dec!(7.1);

        let there = table.convert(amount, &aaa, &bbb).unwrap();
        assert!(there > dec!(0.0000000000000001));
        let back = table.convert(there, &bbb, &aaa).unwrap();

        assert!((back - amount).abs() <= amount * dec!(0.00000001), "{}", back);
    }

    #[test]
    fn test_convert_unknown_currency() {
        let table = usd_table();

        assert!(table
            .convert(dec!(1), &Currency::usd(), &Currency::new("XYZ"))
            .is_none());
    }
}
