use crate::domain::storage::{ListingStore, StorageKeys};
use crate::domain::{GameListing, GameMetadata, Manifest, Platform, RunReport};
use crate::error::PersistError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One pretty-printed JSON document per listing under `data_dir/listings`,
/// plus the manifest and last run report at the top of `data_dir`.
#[derive(Clone)]
pub struct FileSystemStore {
    data_dir: PathBuf,
    // Serializes read-check-write so revision checks hold across tasks.
    write_lock: Arc<Mutex<()>>,
}

impl FileSystemStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn get_path_for_key(&self, key: &str, subdir: Option<&str>) -> PathBuf {
        match subdir {
            Some(dir) => self.data_dir.join(dir).join(format!("{}.json", key)),
            None => self.data_dir.join(format!("{}.json", key)),
        }
    }

    fn ensure_dir(&self, dir: &Path) -> Result<(), PersistError> {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn write_json_file<T: serde::Serialize + ?Sized>(
        &self,
        key: &str,
        subdir: Option<&str>,
        data: &T,
    ) -> Result<(), PersistError> {
        match subdir {
            Some(dir) => self.ensure_dir(&self.data_dir.join(dir))?,
            None => self.ensure_dir(&self.data_dir)?,
        }

        let path = self.get_path_for_key(key, subdir);
        let content = serde_json::to_string_pretty(data)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn read_json_file<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        subdir: Option<&str>,
    ) -> Result<Option<T>, PersistError> {
        let path = self.get_path_for_key(key, subdir);
        if path.exists() {
            let content = fs::read_to_string(path)?;
            Ok(Some(serde_json::from_str(&content)?))
        } else {
            Ok(None)
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, PersistError> {
        self.write_lock
            .lock()
            .map_err(|_| PersistError::Unavailable("store lock poisoned".to_string()))
    }

    fn write_checked(
        &self,
        listing: &GameListing,
        expected_revision: Option<u64>,
    ) -> Result<u64, PersistError> {
        let current = self
            .read_json_file::<GameListing>(&listing.title_key, Some(StorageKeys::LISTINGS_DIR))?
            .map(|stored| stored.revision);

        if current != expected_revision {
            return Err(PersistError::Conflict {
                key: listing.title_key.clone(),
                expected: expected_revision.unwrap_or(0),
                found: current.unwrap_or(0),
            });
        }

        let mut stored = listing.clone();
        stored.revision = current.unwrap_or(0) + 1;
        self.write_json_file(&stored.title_key, Some(StorageKeys::LISTINGS_DIR), &stored)?;
        Ok(stored.revision)
    }

    pub fn save_report(&self, report: &RunReport) -> Result<(), PersistError> {
        self.write_json_file(StorageKeys::RUN_REPORT, None, report)
    }

    pub fn load_manifest(&self) -> Result<Option<Manifest>, PersistError> {
        self.read_json_file(StorageKeys::MANIFEST, None)
    }
}

impl ListingStore for FileSystemStore {
    fn load_listing(&self, title_key: &str) -> Result<Option<GameListing>, PersistError> {
        self.read_json_file(title_key, Some(StorageKeys::LISTINGS_DIR))
    }

    fn upsert_listing(
        &self,
        listing: &GameListing,
        expected_revision: Option<u64>,
    ) -> Result<u64, PersistError> {
        let _guard = self.lock()?;
        self.write_checked(listing, expected_revision)
    }

    fn mark_stale(&self, title_key: &str, platform: Platform) -> Result<(), PersistError> {
        let _guard = self.lock()?;
        let Some(mut listing) =
            self.read_json_file::<GameListing>(title_key, Some(StorageKeys::LISTINGS_DIR))?
        else {
            return Ok(());
        };

        match listing.offers.get_mut(&platform) {
            Some(offer) if !offer.stale => offer.stale = true,
            _ => return Ok(()),
        }
        let revision = listing.revision;
        self.write_checked(&listing, Some(revision))?;
        Ok(())
    }

    fn listing_keys(&self) -> Result<Vec<String>, PersistError> {
        let dir = self.data_dir.join(StorageKeys::LISTINGS_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn save_manifest(&self, manifest: &Manifest) -> Result<(), PersistError> {
        self.write_json_file(StorageKeys::MANIFEST, None, manifest)
    }

    fn load_app_details(
        &self,
        platform: Platform,
    ) -> Result<BTreeMap<String, GameMetadata>, PersistError> {
        Ok(self
            .read_json_file(&StorageKeys::app_details(platform), None)?
            .unwrap_or_default())
    }

    fn save_app_details(
        &self,
        platform: Platform,
        details: &BTreeMap<String, GameMetadata>,
    ) -> Result<(), PersistError> {
        self.write_json_file(&StorageKeys::app_details(platform), None, details)
    }
}
