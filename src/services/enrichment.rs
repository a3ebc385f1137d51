use crate::domain::{GameMetadata, ListingStore, RawOffer};
use crate::error::FetchError;
use crate::infrastructure::{PageFetcher, StorefrontAdapter};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attaches store metadata (kind, genres, description, artwork) to raw
/// offers, backed by a per-platform details cache so an id is looked up
/// once across runs.
pub struct Enrichment {
    store: Arc<dyn ListingStore>,
    max_lookups: usize,
}

impl Enrichment {
    pub fn new(store: Arc<dyn ListingStore>, max_lookups: usize) -> Self {
        Self { store, max_lookups }
    }

    /// Fills `metadata` on every offer that has an external id, looking up
    /// at most `max_lookups` uncached ids. Returns the number of lookups.
    ///
    /// Ids that the storefront does not know, or answers with garbage for,
    /// are cached as unavailable. Network failures are left for a later run.
    pub async fn enrich(
        &self,
        adapter: &dyn StorefrontAdapter,
        fetcher: &PageFetcher,
        offers: &mut [RawOffer],
    ) -> usize {
        let platform = adapter.platform();
        let mut cache = self.store.load_app_details(platform).unwrap_or_else(|err| {
            warn!("Could not load {} details cache: {}", platform, err);
            BTreeMap::new()
        });
        let mut changed = false;

        // Offers parsed from a detail page already know their metadata.
        for offer in offers.iter() {
            if let (Some(id), Some(metadata)) = (&offer.external_id, &offer.metadata) {
                if cache.get(id) != Some(metadata) {
                    cache.insert(id.clone(), metadata.clone());
                    changed = true;
                }
            }
        }

        let mut seen = HashSet::new();
        let missing: Vec<String> = offers
            .iter()
            .filter(|offer| offer.metadata.is_none())
            .filter_map(|offer| offer.external_id.clone())
            .filter(|id| !cache.contains_key(id) && seen.insert(id.clone()))
            .collect();

        let mut looked_up = 0;
        for id in missing.iter().take(self.max_lookups) {
            if fetcher.cancel_signal().is_cancelled() {
                break;
            }
            let Some(url) = adapter.details_url(id) else {
                break;
            };

            let result = match fetcher.get_text(&url).await {
                Ok(body) => adapter.parse_details(&body, id, &url),
                Err(err) => Err(err),
            };
            match result {
                Ok(metadata) => {
                    cache.insert(id.clone(), metadata);
                    changed = true;
                    looked_up += 1;
                }
                Err(err) if err.is_cancelled() => break,
                Err(err @ (FetchError::NotFound { .. } | FetchError::Parse { .. })) => {
                    debug!(%platform, id = %id, "No details: {}", err);
                    cache.insert(id.clone(), GameMetadata::unavailable());
                    changed = true;
                    looked_up += 1;
                }
                Err(err) => {
                    warn!(
                        %platform,
                        id = %id,
                        reason = err.reason(),
                        "Detail lookup failed: {}",
                        err
                    );
                }
            }
        }
        if missing.len() > self.max_lookups {
            info!(
                %platform,
                deferred = missing.len() - self.max_lookups,
                "Detail lookups left for a later run"
            );
        }

        for offer in offers.iter_mut().filter(|offer| offer.metadata.is_none()) {
            if let Some(id) = &offer.external_id {
                offer.metadata = cache.get(id).cloned();
            }
        }

        if changed {
            if let Err(err) = self.store.save_app_details(platform, &cache) {
                warn!("Could not save {} details cache: {}", platform, err);
            }
        }
        looked_up
    }
}

/// Removes offers whose metadata names something other than a game.
/// Offers without metadata are kept.
pub fn drop_non_games(offers: &mut Vec<RawOffer>) -> usize {
    let before = offers.len();
    offers.retain(|offer| offer.metadata.as_ref().map_or(true, GameMetadata::is_game));
    before - offers.len()
}
