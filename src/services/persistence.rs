use crate::domain::{GameListing, ListingStore, Platform};
use crate::error::PersistError;
use crate::services::text_utils::TitleNormalizer;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted { revision: u64 },
    Updated { revision: u64 },
    Unchanged,
}

/// Result of one platform's staleness sweep.
#[derive(Debug, Default)]
pub struct StaleSweep {
    pub marked: usize,
    pub failures: Vec<(String, PersistError)>,
}

/// Merge-upserts listings into the external store.
///
/// Stored offers are never deleted: a platform slot is replaced when this
/// run saw that platform, and left alone otherwise.
pub struct PersistenceGateway {
    store: Arc<dyn ListingStore>,
    display_titles: HashMap<String, String>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self {
            store,
            display_titles: HashMap::new(),
        }
    }

    /// Display titles that replace whatever title the store holds.
    pub fn with_display_titles(mut self, display_titles: &HashMap<String, String>) -> Self {
        self.display_titles = display_titles
            .iter()
            .map(|(key, title)| (TitleNormalizer::key(key), title.clone()))
            .collect();
        self
    }

    pub fn store(&self) -> &Arc<dyn ListingStore> {
        &self.store
    }

    pub fn upsert(&self, listing: &GameListing) -> Result<UpsertOutcome, PersistError> {
        let stored = self.store.load_listing(&listing.title_key)?;

        let Some(stored) = stored else {
            let mut fresh = listing.clone();
            if let Some(title) = self.display_titles.get(&fresh.title_key) {
                fresh.title.clone_from(title);
            }
            let revision = self.store.upsert_listing(&fresh, None)?;
            return Ok(UpsertOutcome::Inserted { revision });
        };

        let mut merged = stored.clone();
        merged.merge_offers(listing);
        if let Some(title) = self.display_titles.get(&merged.title_key) {
            merged.title.clone_from(title);
        }

        if merged.same_content(&stored) {
            debug!(key = %listing.title_key, "Listing unchanged, skipping write");
            return Ok(UpsertOutcome::Unchanged);
        }

        let revision = self.store.upsert_listing(&merged, Some(stored.revision))?;
        Ok(UpsertOutcome::Updated { revision })
    }

    /// Upsert with up to `retries` further attempts; each attempt re-reads
    /// and re-merges.
    pub fn upsert_with_retry(
        &self,
        listing: &GameListing,
        retries: u32,
    ) -> Result<UpsertOutcome, PersistError> {
        let mut attempt = 0;
        loop {
            match self.upsert(listing) {
                Ok(outcome) => return Ok(outcome),
                Err(err) if attempt < retries => {
                    attempt += 1;
                    warn!(
                        key = %listing.title_key,
                        attempt,
                        reason = err.reason(),
                        "Upsert failed, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Marks `platform` offers stale on stored listings this run did not
    /// observe and that were last seen before `now - grace`.
    pub fn mark_unseen_stale(
        &self,
        platform: Platform,
        observed: &HashSet<String>,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> Result<StaleSweep, PersistError> {
        let cutoff = now - grace;
        let mut sweep = StaleSweep::default();

        for listing in self.store.load_all()? {
            if observed.contains(&listing.title_key) {
                continue;
            }
            let Some(offer) = listing.offer(platform) else {
                continue;
            };
            if offer.stale || offer.last_seen >= cutoff {
                continue;
            }

            match self.store.mark_stale(&listing.title_key, platform) {
                Ok(()) => sweep.marked += 1,
                Err(err) => sweep.failures.push((listing.title_key.clone(), err)),
            }
        }

        info!(
            platform = %platform,
            marked = sweep.marked,
            failed = sweep.failures.len(),
            "Staleness sweep finished"
        );
        Ok(sweep)
    }
}
