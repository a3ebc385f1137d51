use crate::config::{AppRef, CatalogEntry, PlatformCatalog};
use crate::domain::{GameMetadata, Platform, RawOffer};
use crate::error::FetchError;
use chrono::{DateTime, Utc};
use governor::Quota;
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod gamersgate;
pub mod gog;
pub(crate) mod html;
pub mod nuuvem;
pub mod pages;
pub mod steam;

/// What one fetched page yielded.
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub offers: Vec<RawOffer>,
    /// Last page number, when the storefront reports it.
    pub last_page: Option<u32>,
}

/// Everything a parser needs to know about the page it is looking at.
pub struct PageContext<'a> {
    pub url: &'a str,
    pub entry: &'a CatalogEntry,
    pub page: u32,
    pub currency: &'a str,
    pub fetched_at: DateTime<Utc>,
}

/// One storefront's quirks: where pages live and how to read them.
///
/// Network I/O, retries and pagination are shared (see [`pages`]); an
/// adapter only builds URLs and extracts raw fields.
pub trait StorefrontAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Currency assumed when a page does not state one.
    fn currency(&self) -> &str;

    /// URL of the 1-based `page` for `entry`.
    fn page_url(&self, entry: &CatalogEntry, page: u32) -> Result<String, FetchError>;

    fn parse_page(&self, body: &str, ctx: &PageContext<'_>) -> Result<ParsedPage, FetchError>;

    /// Request budget shared by every call the run makes to this storefront.
    fn rate_limit(&self) -> Option<Quota> {
        None
    }

    /// Index documents that enumerate the whole catalog for `entry`.
    /// Empty for storefronts without such an index.
    fn index_urls(&self, _entry: &CatalogEntry) -> Vec<String> {
        Vec::new()
    }

    fn parse_index(&self, _body: &str, url: &str) -> Result<Vec<AppRef>, FetchError> {
        Err(FetchError::parse(url, "storefront has no application index"))
    }

    /// Where metadata for one of this storefront's ids is looked up, if anywhere.
    fn details_url(&self, _external_id: &str) -> Option<String> {
        None
    }

    fn parse_details(
        &self,
        _body: &str,
        _external_id: &str,
        url: &str,
    ) -> Result<GameMetadata, FetchError> {
        Err(FetchError::parse(url, "storefront has no detail lookup"))
    }
}

/// Error for catalog entry kinds a storefront cannot enumerate.
pub(crate) fn unsupported_entry(platform: Platform, entry: &CatalogEntry) -> FetchError {
    FetchError::parse(
        entry.as_str(),
        format!("{platform} cannot enumerate '{}' entries", entry.as_str()),
    )
}

/// Picks the adapter variant for a platform's catalog section.
pub fn build_adapter(catalog: &PlatformCatalog) -> Arc<dyn StorefrontAdapter> {
    let currency = catalog.currency();
    match catalog.platform {
        Platform::Steam => Arc::new(steam::SteamAdapter::new(
            catalog.country.as_deref().unwrap_or(steam::DEFAULT_COUNTRY),
            &currency,
        )),
        Platform::Nuuvem => Arc::new(nuuvem::NuuvemAdapter::new(&currency)),
        Platform::GamersGate => Arc::new(gamersgate::GamersGateAdapter::new(&currency)),
        Platform::Gog => Arc::new(gog::GogAdapter::new(
            catalog.country.as_deref().unwrap_or(gog::DEFAULT_COUNTRY),
            &currency,
        )),
    }
}

/// Adapters keyed by platform, fixed when the pipeline is constructed.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Platform, Arc<dyn StorefrontAdapter>>,
}

impl AdapterRegistry {
    pub fn from_catalog(platforms: &[PlatformCatalog]) -> Self {
        let adapters = platforms
            .iter()
            .map(|p| (p.platform, build_adapter(p)))
            .collect();
        Self { adapters }
    }

    /// Registers or replaces the adapter for its platform.
    pub fn with_adapter(mut self, adapter: Arc<dyn StorefrontAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn StorefrontAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.adapters.keys().copied()
    }
}

/// Sets (or replaces) a query parameter, keeping the others in order.
pub(crate) fn with_query_param(url: &str, name: &str, value: &str) -> Result<String, FetchError> {
    let mut parsed =
        reqwest::Url::parse(url).map_err(|e| FetchError::parse(url, format!("invalid url: {e}")))?;
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair(name, value);
    Ok(parsed.to_string())
}
