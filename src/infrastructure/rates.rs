use crate::domain::ExchangeRates;
use crate::error::{NormalizeError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Fixed exchange-rate table, usually loaded from `rates.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticRates {
    pub reference: String,
    #[serde(default)]
    pub rates: HashMap<String, Decimal>,
}

impl StaticRates {
    pub fn new(reference: &str) -> Self {
        Self {
            reference: reference.to_uppercase(),
            rates: HashMap::new(),
        }
    }

    pub fn with_rate(mut self, currency: &str, rate: Decimal) -> Self {
        self.rates.insert(currency.to_uppercase(), rate);
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let table: StaticRates = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let rates = table
            .rates
            .into_iter()
            .map(|(code, rate)| (code.to_uppercase(), rate))
            .collect();

        Ok(Self {
            reference: table.reference.to_uppercase(),
            rates,
        })
    }
}

impl ExchangeRates for StaticRates {
    fn reference(&self) -> &str {
        &self.reference
    }

    fn rate(&self, currency: &str) -> std::result::Result<Decimal, NormalizeError> {
        let code = currency.trim().to_uppercase();
        if code == self.reference {
            return Ok(Decimal::ONE);
        }

        self.rates
            .get(&code)
            .copied()
            .filter(|rate| *rate > Decimal::ZERO)
            .ok_or(NormalizeError::UnknownCurrency(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn reference_currency_is_identity() {
        let rates = StaticRates::new("usd");
        assert_eq!(rates.rate("USD").unwrap(), Decimal::ONE);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let rates = StaticRates::new("USD").with_rate("brl", Decimal::from_str("0.2").unwrap());
        assert_eq!(rates.rate("BRL").unwrap(), Decimal::from_str("0.2").unwrap());
    }

    #[test]
    fn unknown_and_non_positive_rates_fail() {
        let rates = StaticRates::new("USD").with_rate("EUR", Decimal::ZERO);
        assert_eq!(
            rates.rate("EUR"),
            Err(NormalizeError::UnknownCurrency("EUR".into()))
        );
        assert_eq!(
            rates.rate("JPY"),
            Err(NormalizeError::UnknownCurrency("JPY".into()))
        );
    }

    #[test]
    fn loads_table_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.json");
        std::fs::write(&path, r#"{"reference": "usd", "rates": {"brl": "0.18"}}"#).unwrap();

        let rates = StaticRates::load(&path).unwrap();
        assert_eq!(rates.reference(), "USD");
        assert_eq!(rates.rate("BRL").unwrap(), Decimal::from_str("0.18").unwrap());
    }
}
