use super::{GameListing, GameMetadata, Manifest, Platform};
use crate::error::PersistError;
use std::collections::{BTreeMap, HashMap};

/// Write/query interface of the external listing store.
pub trait ListingStore: Send + Sync {
    fn load_listing(&self, title_key: &str) -> Result<Option<GameListing>, PersistError>;

    /// Writes `listing` and returns the stored revision.
    ///
    /// `expected_revision` is `None` for a fresh insert and the revision that
    /// was read otherwise; a mismatch fails with [`PersistError::Conflict`].
    fn upsert_listing(
        &self,
        listing: &GameListing,
        expected_revision: Option<u64>,
    ) -> Result<u64, PersistError>;

    fn mark_stale(&self, title_key: &str, platform: Platform) -> Result<(), PersistError>;

    fn listing_keys(&self) -> Result<Vec<String>, PersistError>;

    fn save_manifest(&self, manifest: &Manifest) -> Result<(), PersistError>;

    /// Cached store details per product id. Stores without a cache start
    /// empty every run.
    fn load_app_details(
        &self,
        _platform: Platform,
    ) -> Result<BTreeMap<String, GameMetadata>, PersistError> {
        Ok(BTreeMap::new())
    }

    fn save_app_details(
        &self,
        _platform: Platform,
        _details: &BTreeMap<String, GameMetadata>,
    ) -> Result<(), PersistError> {
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<GameListing>, PersistError> {
        let mut listings = Vec::new();
        for key in self.listing_keys()? {
            if let Some(listing) = self.load_listing(&key)? {
                listings.push(listing);
            }
        }
        Ok(listings)
    }

    /// `(platform, store product id) -> title key` for every stored offer
    /// that carries an id.
    fn external_ids(&self) -> Result<HashMap<(Platform, String), String>, PersistError> {
        let mut ids = HashMap::new();
        for listing in self.load_all()? {
            for offer in listing.offers.values() {
                if let Some(id) = &offer.external_id {
                    ids.insert((offer.platform, id.clone()), listing.title_key.clone());
                }
            }
        }
        Ok(ids)
    }
}

pub struct StorageKeys;

impl StorageKeys {
    pub const LISTINGS_DIR: &'static str = "listings";
    pub const MANIFEST: &'static str = "all_games";
    pub const RUN_REPORT: &'static str = "last_run";

    /// `all_steam_details` and so on.
    pub fn app_details(platform: Platform) -> String {
        format!("all_{}_details", platform.as_str())
    }
}
