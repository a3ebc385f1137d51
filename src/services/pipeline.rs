use crate::config::{Catalog, CatalogEntry, PipelineOptions};
use crate::domain::{
    ExchangeRates, FailureSubject, GameListing, GameOffer, ListingStore, Manifest, Platform,
    RawOffer, RunReport, RunState,
};
use crate::error::{FetchError, Result};
use crate::infrastructure::{
    fetch_entry, AdapterRegistry, CancelSignal, PageFetcher, StorefrontAdapter,
};
use crate::services::enrichment::{drop_non_games, Enrichment};
use crate::services::normalizing::Normalizer;
use crate::services::persistence::{PersistenceGateway, UpsertOutcome};
use crate::services::reconciling::Reconciler;
use crate::services::text_utils::{TitleFilter, TitleNormalizer};
use chrono::Utc;
use reqwest::Client;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What one platform's adapter produced this run.
#[derive(Debug)]
pub struct PlatformFetch {
    pub platform: Platform,
    pub offers: Vec<RawOffer>,
    pub errors: Vec<FetchError>,
    pub cancelled: bool,
    pub details_fetched: usize,
    entries: usize,
}

impl PlatformFetch {
    fn empty(platform: Platform) -> Self {
        Self {
            platform,
            offers: Vec::new(),
            errors: Vec::new(),
            cancelled: false,
            details_fetched: 0,
            entries: 0,
        }
    }

    /// Every catalog entry was walked to its end without error or
    /// cancellation. Only then may absent offers be marked stale.
    pub fn is_complete(&self) -> bool {
        self.entries > 0 && self.errors.is_empty() && !self.cancelled
    }
}

/// Runs every catalog entry of one platform in order, then attaches
/// metadata to what was found.
async fn fetch_platform(
    adapter: Arc<dyn StorefrontAdapter>,
    fetcher: PageFetcher,
    entries: Vec<CatalogEntry>,
    max_pages: u32,
    filter: TitleFilter,
    enrichment: Arc<Enrichment>,
) -> PlatformFetch {
    let mut fetched = PlatformFetch::empty(adapter.platform());

    for entry in &entries {
        if fetcher.cancel_signal().is_cancelled() {
            fetched.cancelled = true;
            break;
        }
        let result = fetch_entry(adapter.as_ref(), &fetcher, entry, max_pages, &filter).await;
        fetched.entries += 1;
        fetched.offers.extend(result.offers);
        fetched.cancelled |= result.cancelled;
        if let Some(err) = result.error {
            fetched.errors.push(err);
        }
    }

    // Entries skipped by cancellation still count against completeness.
    if fetched.entries < entries.len() {
        fetched.cancelled = true;
    }
    if !fetched.cancelled {
        fetched.details_fetched = enrichment
            .enrich(adapter.as_ref(), &fetcher, &mut fetched.offers)
            .await;
    }
    fetched
}

/// One fetcher per platform, each carrying its storefront's rate limit.
fn platform_fetchers(
    registry: &AdapterRegistry,
    base: &PageFetcher,
) -> BTreeMap<Platform, PageFetcher> {
    registry
        .platforms()
        .filter_map(|platform| registry.get(platform).map(|adapter| (platform, adapter)))
        .map(|(platform, adapter)| {
            let fetcher = match adapter.rate_limit() {
                Some(quota) => base.clone().with_rate_limit(quota),
                None => base.clone(),
            };
            (platform, fetcher)
        })
        .collect()
}

/// The full fetch → normalize → reconcile → persist cycle.
pub struct Pipeline {
    catalog: Catalog,
    options: PipelineOptions,
    registry: AdapterRegistry,
    fetcher: PageFetcher,
    fetchers: BTreeMap<Platform, PageFetcher>,
    normalizer: Normalizer,
    gateway: PersistenceGateway,
    enrichment: Arc<Enrichment>,
    filter: TitleFilter,
    cancel: CancelSignal,
}

impl Pipeline {
    pub fn new(
        catalog: Catalog,
        options: PipelineOptions,
        client: Client,
        rates: Arc<dyn ExchangeRates>,
        store: Arc<dyn ListingStore>,
        cancel: CancelSignal,
    ) -> Result<Self> {
        catalog.validate()?;
        let filter = TitleFilter::new(&catalog.excluded_keywords)?;
        let registry = AdapterRegistry::from_catalog(&catalog.platforms);
        let fetcher = PageFetcher::new(client, options.retry, cancel.clone());
        let fetchers = platform_fetchers(&registry, &fetcher);
        let enrichment = Arc::new(Enrichment::new(store.clone(), options.max_detail_lookups));
        let gateway = PersistenceGateway::new(store).with_display_titles(&catalog.display_titles);

        info!(
            "Created pipeline for {} platforms",
            catalog.platforms.len()
        );
        Ok(Self {
            catalog,
            options,
            registry,
            fetcher,
            fetchers,
            normalizer: Normalizer::new(rates),
            gateway,
            enrichment,
            filter,
            cancel,
        })
    }

    /// Swaps in adapters, e.g. ones pointed at a different base URL.
    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.fetchers = platform_fetchers(&registry, &self.fetcher);
        self.registry = registry;
        self
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::new();
        info!("Starting price pipeline run");

        self.transition(&mut report, RunState::FetchingAll);
        let mut fetched = self.fetch_all().await;
        for platform in &fetched {
            report.offers_fetched += platform.offers.len();
            report.details_fetched += platform.details_fetched;
            for err in &platform.errors {
                report.record_failure(
                    FailureSubject::Platform(platform.platform),
                    err.reason(),
                    err,
                );
            }
        }
        report.cancelled = self.cancel.is_cancelled() || fetched.iter().any(|p| p.cancelled);

        let complete: Vec<Platform> = fetched
            .iter()
            .filter(|p| p.is_complete())
            .map(|p| p.platform)
            .collect();

        let known_ids = self.gateway.store().external_ids().unwrap_or_else(|err| {
            warn!("Could not load stored external ids: {}", err);
            HashMap::new()
        });
        let reconciler = Reconciler::new(&self.catalog.aliases, &self.catalog.display_titles)
            .with_external_ids(known_ids);
        // Everything the storefront showed counts as seen, including offers
        // that fail normalization below.
        let mut observed = observed_keys(&fetched, &reconciler);
        for platform in &mut fetched {
            report.non_games_dropped += drop_non_games(&mut platform.offers);
        }

        self.transition(&mut report, RunState::Normalizing);
        let offers = self.normalize_all(fetched, &mut report);

        self.transition(&mut report, RunState::Reconciling);
        let listings = self.reconcile_all(reconciler, offers);
        for listing in listings.values() {
            for platform in listing.offers.keys() {
                observed
                    .entry(*platform)
                    .or_default()
                    .insert(listing.title_key.clone());
            }
        }

        self.transition(&mut report, RunState::Persisting);
        self.persist_all(&listings, &mut report);
        if report.cancelled {
            info!("Run was cancelled, skipping staleness marking");
        } else {
            self.mark_stale(&complete, &observed, &mut report);
        }
        if self.options.export_manifest {
            self.export_manifest();
        }

        report.finish();
        info!(
            state = %report.state,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            unchanged = report.listings_unchanged,
            stale = report.offers_marked_stale,
            details = report.details_fetched,
            "Pipeline run finished"
        );
        report
    }

    fn transition(&self, report: &mut RunReport, next: RunState) {
        info!(from = %report.state, to = %next, "Pipeline state change");
        report.state = next;
    }

    /// One task per platform, or one platform after the other. Results come
    /// back in catalog order either way.
    async fn fetch_all(&self) -> Vec<PlatformFetch> {
        let mut jobs = Vec::new();
        for section in &self.catalog.platforms {
            let Some(adapter) = self.registry.get(section.platform) else {
                warn!("No adapter registered for {}, skipping", section.platform);
                continue;
            };
            let fetcher = self
                .fetchers
                .get(&section.platform)
                .cloned()
                .unwrap_or_else(|| self.fetcher.clone());
            jobs.push((section.platform, adapter, fetcher, section.entries.clone()));
        }

        let mut results = Vec::with_capacity(jobs.len());
        if self.options.concurrent {
            let handles: Vec<(Platform, JoinHandle<PlatformFetch>)> = jobs
                .into_iter()
                .map(|(platform, adapter, fetcher, entries)| {
                    let task = fetch_platform(
                        adapter,
                        fetcher,
                        entries,
                        self.options.max_pages,
                        self.filter.clone(),
                        self.enrichment.clone(),
                    );
                    (platform, tokio::spawn(task))
                })
                .collect();

            for (platform, handle) in handles {
                match handle.await {
                    Ok(fetched) => results.push(fetched),
                    Err(err) => {
                        error!("Fetch task for {} did not complete: {}", platform, err);
                        let mut failed = PlatformFetch::empty(platform);
                        failed
                            .errors
                            .push(FetchError::network(platform.as_str(), None, err));
                        results.push(failed);
                    }
                }
            }
        } else {
            for (_, adapter, fetcher, entries) in jobs {
                results.push(
                    fetch_platform(
                        adapter,
                        fetcher,
                        entries,
                        self.options.max_pages,
                        self.filter.clone(),
                        self.enrichment.clone(),
                    )
                    .await,
                );
            }
        }
        results
    }

    fn normalize_all(&self, fetched: Vec<PlatformFetch>, report: &mut RunReport) -> Vec<GameOffer> {
        let mut offers = Vec::new();
        for raw in fetched.into_iter().flat_map(|p| p.offers) {
            let key = Some(TitleNormalizer::key(&raw.title))
                .filter(|key| !key.is_empty())
                .unwrap_or_else(|| raw.title.clone());
            let platform = raw.platform;
            match self.normalizer.normalize(raw) {
                Ok(offer) => offers.push(offer),
                Err(err) => {
                    warn!(%platform, key = %key, reason = err.reason(), "Dropping offer: {}", err);
                    report.record_failure(FailureSubject::TitleKey(key), err.reason(), &err);
                }
            }
        }
        report.offers_normalized = offers.len();
        offers
    }

    fn reconcile_all(
        &self,
        mut reconciler: Reconciler,
        offers: Vec<GameOffer>,
    ) -> BTreeMap<String, GameListing> {
        let mut listings = BTreeMap::new();
        for offer in offers {
            reconciler.reconcile(&mut listings, offer);
        }
        info!("Reconciled into {} listings", listings.len());
        listings
    }

    fn persist_all(&self, listings: &BTreeMap<String, GameListing>, report: &mut RunReport) {
        for listing in listings.values() {
            match self
                .gateway
                .upsert_with_retry(listing, self.options.persist_retries)
            {
                Ok(outcome) => {
                    report.succeeded += 1;
                    if outcome == UpsertOutcome::Unchanged {
                        report.listings_unchanged += 1;
                    }
                    debug!(key = %listing.title_key, ?outcome, "Persisted listing");
                }
                Err(err) => {
                    error!(key = %listing.title_key, reason = err.reason(), "Giving up on listing: {}", err);
                    report.record_failure(
                        FailureSubject::TitleKey(listing.title_key.clone()),
                        err.reason(),
                        &err,
                    );
                }
            }
        }
    }

    fn mark_stale(
        &self,
        complete: &[Platform],
        observed: &HashMap<Platform, HashSet<String>>,
        report: &mut RunReport,
    ) {
        let now = Utc::now();
        let nothing = HashSet::new();
        for &platform in complete {
            let observed = observed.get(&platform).unwrap_or(&nothing);
            match self
                .gateway
                .mark_unseen_stale(platform, observed, self.options.stale_grace, now)
            {
                Ok(sweep) => {
                    report.offers_marked_stale += sweep.marked;
                    for (key, err) in sweep.failures {
                        report.record_failure(FailureSubject::TitleKey(key), err.reason(), &err);
                    }
                }
                Err(err) => {
                    warn!("Staleness sweep for {} failed: {}", platform, err);
                    report.record_failure(FailureSubject::Platform(platform), err.reason(), &err);
                }
            }
        }
    }

    fn export_manifest(&self) {
        let store = self.gateway.store();
        let exported = store.load_all().and_then(|games| {
            let manifest = Manifest::new(games, self.normalizer.reference_currency());
            store.save_manifest(&manifest).map(|()| manifest.total_games)
        });
        match exported {
            Ok(total) => info!("Exported manifest with {} games", total),
            Err(err) => error!("Failed to export manifest: {}", err),
        }
    }
}

/// Listing keys per platform for every raw offer fetched, resolved the way
/// the reconciler would file them.
fn observed_keys(
    fetched: &[PlatformFetch],
    reconciler: &Reconciler,
) -> HashMap<Platform, HashSet<String>> {
    let mut observed: HashMap<Platform, HashSet<String>> = HashMap::new();
    for platform in fetched {
        let keys = observed.entry(platform.platform).or_default();
        for raw in &platform.offers {
            let key = TitleNormalizer::key(&raw.title);
            if key.is_empty() {
                continue;
            }
            keys.insert(reconciler.resolve(raw.platform, &key, raw.external_id.as_deref()));
        }
    }
    observed
}

/// Builds a [`Pipeline`] from explicit inputs and runs it once.
pub async fn run_pipeline(
    catalog: Catalog,
    options: PipelineOptions,
    client: Client,
    rates: Arc<dyn ExchangeRates>,
    store: Arc<dyn ListingStore>,
    cancel: CancelSignal,
) -> Result<RunReport> {
    let pipeline = Pipeline::new(catalog, options, client, rates, store, cancel)?;
    Ok(pipeline.run().await)
}
