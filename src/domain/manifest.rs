use crate::domain::{GameListing, Platform};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Flat export of every stored listing, consumed by the comparison app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub total_games: usize,
    pub last_updated: String,
    pub games: Vec<GameListing>,
    pub metadata: ManifestMetadata,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub platforms: Vec<Platform>,
    pub reference_currency: String,
    pub version: String,
}

impl Manifest {
    pub fn new(mut games: Vec<GameListing>, reference_currency: &str) -> Self {
        games.sort_by(|a, b| a.title_key.cmp(&b.title_key));

        let platforms: Vec<Platform> = games
            .iter()
            .flat_map(|game| game.offers.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            total_games: games.len(),
            last_updated: Local::now().to_rfc3339(),
            games,
            metadata: ManifestMetadata {
                platforms,
                reference_currency: reference_currency.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}
