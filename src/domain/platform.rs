use serde::{Deserialize, Serialize};
use std::fmt;

/// Storefronts the pipeline knows how to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Steam,
    Nuuvem,
    GamersGate,
    Gog,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Steam => "steam",
            Platform::Nuuvem => "nuuvem",
            Platform::GamersGate => "gamersgate",
            Platform::Gog => "gog",
        }
    }

    /// Currency a storefront quotes in when the page itself does not say.
    pub fn default_currency(&self) -> &'static str {
        match self {
            Platform::Nuuvem => "BRL",
            Platform::Steam | Platform::GamersGate | Platform::Gog => "USD",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
