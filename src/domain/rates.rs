use crate::error::NormalizeError;
use rust_decimal::Decimal;

/// Exchange-rate lookup injected into the normalizer.
pub trait ExchangeRates: Send + Sync {
    /// Currency every canonical price is expressed in.
    fn reference(&self) -> &str;

    /// Units of the reference currency for one unit of `currency`.
    fn rate(&self, currency: &str) -> Result<Decimal, NormalizeError>;
}
