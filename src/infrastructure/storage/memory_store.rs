use crate::domain::storage::ListingStore;
use crate::domain::{GameListing, GameMetadata, Manifest, Platform};
use crate::error::PersistError;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    listings: BTreeMap<String, GameListing>,
    manifest: Option<Manifest>,
    app_details: BTreeMap<Platform, BTreeMap<String, GameMetadata>>,
    writes: usize,
}

/// In-process store for tests and dry runs. Same revision rules as
/// [`FileSystemStore`](super::FileSystemStore).
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, PersistError> {
        self.inner
            .lock()
            .map_err(|_| PersistError::Unavailable("store lock poisoned".to_string()))
    }

    /// Number of successful listing writes, stale marks included.
    pub fn writes(&self) -> usize {
        self.lock().map(|inner| inner.writes).unwrap_or(0)
    }

    pub fn manifest_len(&self) -> Option<usize> {
        self.lock()
            .ok()
            .and_then(|inner| inner.manifest.as_ref().map(|m| m.total_games))
    }
}

impl ListingStore for MemoryStore {
    fn load_listing(&self, title_key: &str) -> Result<Option<GameListing>, PersistError> {
        Ok(self.lock()?.listings.get(title_key).cloned())
    }

    fn upsert_listing(
        &self,
        listing: &GameListing,
        expected_revision: Option<u64>,
    ) -> Result<u64, PersistError> {
        let mut inner = self.lock()?;
        let current = inner.listings.get(&listing.title_key).map(|l| l.revision);
        if current != expected_revision {
            return Err(PersistError::Conflict {
                key: listing.title_key.clone(),
                expected: expected_revision.unwrap_or(0),
                found: current.unwrap_or(0),
            });
        }

        let mut stored = listing.clone();
        stored.revision = current.unwrap_or(0) + 1;
        let revision = stored.revision;
        inner.listings.insert(stored.title_key.clone(), stored);
        inner.writes += 1;
        Ok(revision)
    }

    fn mark_stale(&self, title_key: &str, platform: Platform) -> Result<(), PersistError> {
        let mut inner = self.lock()?;
        let marked = inner
            .listings
            .get_mut(title_key)
            .and_then(|listing| {
                let offer = listing.offers.get_mut(&platform)?;
                if offer.stale {
                    return None;
                }
                offer.stale = true;
                listing.revision += 1;
                Some(())
            })
            .is_some();
        if marked {
            inner.writes += 1;
        }
        Ok(())
    }

    fn listing_keys(&self) -> Result<Vec<String>, PersistError> {
        Ok(self.lock()?.listings.keys().cloned().collect())
    }

    fn save_manifest(&self, manifest: &Manifest) -> Result<(), PersistError> {
        self.lock()?.manifest = Some(manifest.clone());
        Ok(())
    }

    fn load_app_details(
        &self,
        platform: Platform,
    ) -> Result<BTreeMap<String, GameMetadata>, PersistError> {
        Ok(self
            .lock()?
            .app_details
            .get(&platform)
            .cloned()
            .unwrap_or_default())
    }

    fn save_app_details(
        &self,
        platform: Platform,
        details: &BTreeMap<String, GameMetadata>,
    ) -> Result<(), PersistError> {
        self.lock()?.app_details.insert(platform, details.clone());
        Ok(())
    }
}
