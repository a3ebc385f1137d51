use crate::domain::{ExchangeRates, GameOffer, Pricing, RawAmount, RawOffer, RawPrice};
use crate::error::NormalizeError;
use crate::services::text_utils::TitleNormalizer;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

static FREE_PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(free|gr[aá]tis|gratuito|free to play)\s*$").unwrap());

/// Turns raw storefront records into canonical offers in the reference
/// currency.
pub struct Normalizer {
    rates: Arc<dyn ExchangeRates>,
}

impl Normalizer {
    pub fn new(rates: Arc<dyn ExchangeRates>) -> Self {
        Self { rates }
    }

    pub fn reference_currency(&self) -> &str {
        self.rates.reference()
    }

    pub fn normalize(&self, raw: RawOffer) -> Result<GameOffer, NormalizeError> {
        let title = TitleNormalizer::format_for_display(&raw.title);
        let title_key = TitleNormalizer::key(&title);
        if title_key.is_empty() {
            return Err(NormalizeError::MissingTitle(raw.title));
        }
        let pricing = self.pricing(&raw.price, &raw.currency)?;

        Ok(GameOffer {
            platform: raw.platform,
            title_key,
            title,
            external_id: raw.external_id,
            pricing,
            currency: self.rates.reference().to_string(),
            url: raw.url,
            last_seen: raw.fetched_at,
            stale: false,
            metadata: raw.metadata,
        })
    }

    fn pricing(&self, price: &RawPrice, currency: &str) -> Result<Option<Pricing>, NormalizeError> {
        let original = price.original.as_ref().map(parse_minor_units).transpose()?;
        let discounted = price.discounted.as_ref().map(parse_minor_units).transpose()?;
        let percent = price.discount.as_ref().and_then(parse_percent);

        let (original, discounted) = match (original, discounted) {
            (None, None) => return Ok(None),
            (Some(original), Some(discounted)) => (original.max(discounted), discounted),
            (Some(original), None) => (original, apply_discount(original, percent)),
            (None, Some(discounted)) => (reconstruct_original(discounted, percent), discounted),
        };

        let discount_percent = discount_percent(original, discounted);
        let rate = self.rate_for(currency)?;

        Ok(Some(Pricing {
            original_price: convert(original, rate)?,
            discounted_price: convert(discounted, rate)?,
            discount_percent,
        }))
    }

    fn rate_for(&self, currency: &str) -> Result<Decimal, NormalizeError> {
        if currency.trim().eq_ignore_ascii_case(self.rates.reference()) {
            return Ok(Decimal::ONE);
        }
        self.rates.rate(currency)
    }
}

/// Numbers are already minor units; text is parsed leniently
/// (`R$ 1.299,90`, `$1,299.90`, `19,99€`, `Free`).
pub fn parse_minor_units(amount: &RawAmount) -> Result<i64, NormalizeError> {
    match amount {
        RawAmount::Number(n) if *n < 0 => Err(NormalizeError::MalformedPrice(n.to_string())),
        RawAmount::Number(n) => Ok(*n),
        RawAmount::Text(text) => parse_price_text(text),
    }
}

fn parse_price_text(text: &str) -> Result<i64, NormalizeError> {
    let malformed = || NormalizeError::MalformedPrice(text.to_string());

    if FREE_PRICE.is_match(text) {
        return Ok(0);
    }

    let first_digit = text.find(|c: char| c.is_ascii_digit()).ok_or_else(malformed)?;
    if text[..first_digit].contains('-') {
        return Err(malformed());
    }

    let numeric: String = text[first_digit..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let numeric = numeric.trim_end_matches(['.', ',']);

    let (integer, fraction) = match numeric.rfind(['.', ',']) {
        Some(pos) if (1..=2).contains(&(numeric.len() - pos - 1)) => {
            (&numeric[..pos], &numeric[pos + 1..])
        }
        _ => (numeric, ""),
    };

    let integer: String = integer.chars().filter(|c| c.is_ascii_digit()).collect();
    let major: i64 = if integer.is_empty() {
        0
    } else {
        integer.parse().map_err(|_| malformed())?
    };
    let minor: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| malformed())? * 10,
        _ => fraction.parse().map_err(|_| malformed())?,
    };

    major
        .checked_mul(100)
        .and_then(|m| m.checked_add(minor))
        .ok_or_else(malformed)
}

/// Whole-number percent from `50`, `"-50%"` or `"50 % off"`; capped at 100.
pub fn parse_percent(amount: &RawAmount) -> Option<u8> {
    let value = match amount {
        RawAmount::Number(n) => n.unsigned_abs(),
        RawAmount::Text(text) => {
            let digits: String = text
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()?
        }
    };
    Some(value.min(100) as u8)
}

fn round_to_i64(value: Decimal) -> Option<i64> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Only a final price and a percentage are shown: `final / (1 - pct)`.
fn reconstruct_original(discounted: i64, percent: Option<u8>) -> i64 {
    match percent {
        Some(p) if (1..100).contains(&p) => round_to_i64(
            Decimal::from(discounted) * Decimal::ONE_HUNDRED / Decimal::from(100 - p),
        )
        .unwrap_or(discounted),
        _ => discounted,
    }
}

fn apply_discount(original: i64, percent: Option<u8>) -> i64 {
    match percent {
        Some(p) if p > 0 => round_to_i64(
            Decimal::from(original) * Decimal::from(100 - p) / Decimal::ONE_HUNDRED,
        )
        .unwrap_or(original),
        _ => original,
    }
}

/// `round((1 - discounted / original) * 100)`, 0 when nothing is known.
pub fn discount_percent(original: i64, discounted: i64) -> u8 {
    if original <= 0 || discounted >= original {
        return 0;
    }
    let ratio = Decimal::ONE - Decimal::from(discounted) / Decimal::from(original);
    round_to_i64(ratio * Decimal::ONE_HUNDRED)
        .map(|p| p.clamp(0, 100) as u8)
        .unwrap_or(0)
}

fn convert(minor: i64, rate: Decimal) -> Result<i64, NormalizeError> {
    round_to_i64(Decimal::from(minor) * rate)
        .ok_or_else(|| NormalizeError::MalformedPrice(minor.to_string()))
}
