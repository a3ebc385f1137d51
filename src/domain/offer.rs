use crate::domain::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A price or discount exactly as a storefront exposed it.
///
/// JSON APIs hand out integers (minor units for prices, whole percent for
/// discounts); HTML pages hand out text such as `R$ 49,99` or `-50%`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(i64),
    Text(String),
}

impl From<i64> for RawAmount {
    fn from(n: i64) -> Self {
        RawAmount::Number(n)
    }
}

impl From<&str> for RawAmount {
    fn from(s: &str) -> Self {
        RawAmount::Text(s.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPrice {
    pub original: Option<RawAmount>,
    pub discounted: Option<RawAmount>,
    pub discount: Option<RawAmount>,
}

impl RawPrice {
    pub fn is_missing(&self) -> bool {
        self.original.is_none() && self.discounted.is_none()
    }
}

/// Descriptive store data for a title, as Steam's app details expose it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    /// `game`, `dlc`, `music`, ... `None` when the store had no details.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_image: Option<String>,
}

impl GameMetadata {
    /// Details were looked up but the store had none to give.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Unknown types count as games; only an explicit other type does not.
    pub fn is_game(&self) -> bool {
        self.kind.as_deref().map_or(true, |kind| kind == "game")
    }
}

/// One scraped listing entry, before any cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOffer {
    pub platform: Platform,
    pub title: String,
    pub price: RawPrice,
    pub currency: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<GameMetadata>,
}

/// Prices in minor units of the reference currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub original_price: i64,
    pub discounted_price: i64,
    pub discount_percent: u8,
}

/// Canonical offer for one (platform, title key) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOffer {
    pub platform: Platform,
    pub title_key: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// `None` when the storefront lists the game without a price.
    pub pricing: Option<Pricing>,
    pub currency: String,
    pub url: String,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub stale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<GameMetadata>,
}

impl GameOffer {
    pub fn is_available(&self) -> bool {
        self.pricing.is_some() && !self.stale
    }

    pub fn discounted_price(&self) -> Option<i64> {
        self.pricing.map(|p| p.discounted_price)
    }
}
