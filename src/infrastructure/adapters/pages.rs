//! Lazy, finite, restartable page sequences over one catalog entry.

use super::{PageContext, StorefrontAdapter};
use crate::config::{AppListOptions, AppRef, CatalogEntry};
use crate::domain::RawOffer;
use crate::error::FetchError;
use crate::infrastructure::PageFetcher;
use crate::services::text_utils::TitleFilter;
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Walks the pages of one catalog entry on demand.
///
/// Nothing is fetched until [`next_page`](Self::next_page) is awaited. The
/// sequence ends at the storefront's last page, at the first empty page, at
/// `max_pages`, after a failed page, or once the run is cancelled.
/// [`restart`](Self::restart) rewinds it to page 1.
pub struct OfferPages<'a> {
    adapter: &'a dyn StorefrontAdapter,
    fetcher: &'a PageFetcher,
    entry: &'a CatalogEntry,
    max_pages: u32,
    next: u32,
    last_page: Option<u32>,
    finished: bool,
}

impl<'a> OfferPages<'a> {
    pub fn new(
        adapter: &'a dyn StorefrontAdapter,
        fetcher: &'a PageFetcher,
        entry: &'a CatalogEntry,
        max_pages: u32,
    ) -> Self {
        Self {
            adapter,
            fetcher,
            entry,
            max_pages,
            next: 1,
            last_page: None,
            finished: false,
        }
    }

    pub fn restart(&mut self) {
        self.next = 1;
        self.last_page = None;
        self.finished = false;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
            || self.next > self.max_pages
            || self.last_page.is_some_and(|last| self.next > last)
    }

    pub async fn next_page(&mut self) -> Option<Result<Vec<RawOffer>, FetchError>> {
        if self.is_finished() {
            return None;
        }
        if self.fetcher.cancel_signal().is_cancelled() {
            debug!("Run cancelled, stopping pagination for {}", self.entry.as_str());
            self.finished = true;
            return None;
        }

        let page = self.next;
        let result = self.fetch(page).await;
        match &result {
            Ok(parsed_offers) => {
                self.next += 1;
                if parsed_offers.is_empty() {
                    self.finished = true;
                }
            }
            Err(_) => self.finished = true,
        }
        Some(result)
    }

    async fn fetch(&mut self, page: u32) -> Result<Vec<RawOffer>, FetchError> {
        let url = self.adapter.page_url(self.entry, page)?;
        let body = self.fetcher.get_text(&url).await?;

        let ctx = PageContext {
            url: &url,
            entry: self.entry,
            page,
            currency: self.adapter.currency(),
            fetched_at: Utc::now(),
        };
        let parsed = self.adapter.parse_page(&body, &ctx)?;
        if let Some(last) = parsed.last_page {
            self.last_page = Some(last);
        }

        debug!(
            platform = %self.adapter.platform(),
            page,
            last_page = ?self.last_page,
            offers = parsed.offers.len(),
            "Parsed page"
        );
        Ok(parsed.offers)
    }
}

/// Result of fetching one catalog entry: whatever was collected, plus the
/// error that stopped it early, if any.
#[derive(Debug, Default)]
pub struct EntryFetch {
    pub offers: Vec<RawOffer>,
    pub error: Option<FetchError>,
    pub cancelled: bool,
}

impl EntryFetch {
    pub fn into_result(self) -> Result<Vec<RawOffer>, FetchError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.offers),
        }
    }
}

/// Drains every page of `entry`, dropping titles the filter rejects.
///
/// An [`AppList`](CatalogEntry::AppList) entry is first expanded through the
/// storefront's index, then priced batch by batch; `max_pages` bounds the
/// number of batches.
pub async fn fetch_entry(
    adapter: &dyn StorefrontAdapter,
    fetcher: &PageFetcher,
    entry: &CatalogEntry,
    max_pages: u32,
    filter: &TitleFilter,
) -> EntryFetch {
    let mut fetched = match entry {
        CatalogEntry::AppList(options) => {
            fetch_app_list(adapter, fetcher, entry, options, max_pages, filter).await
        }
        _ => {
            let mut fetched = EntryFetch::default();
            drain_pages(adapter, fetcher, entry, max_pages, filter, &mut fetched).await;
            fetched
        }
    };

    fetched.cancelled = fetcher.cancel_signal().is_cancelled();
    info!(
        platform = %adapter.platform(),
        entry = entry.as_str(),
        offers = fetched.offers.len(),
        cancelled = fetched.cancelled,
        "Fetched catalog entry"
    );
    fetched
}

/// Appends the pages of `entry` to `fetched`. Returns false when a page
/// failed; a cancelled request ends the walk without counting as a failure.
async fn drain_pages(
    adapter: &dyn StorefrontAdapter,
    fetcher: &PageFetcher,
    entry: &CatalogEntry,
    max_pages: u32,
    filter: &TitleFilter,
    fetched: &mut EntryFetch,
) -> bool {
    let mut pages = OfferPages::new(adapter, fetcher, entry, max_pages);

    while let Some(page) = pages.next_page().await {
        match page {
            Ok(offers) => fetched.offers.extend(
                offers
                    .into_iter()
                    .filter(|offer| !filter.is_excluded(&offer.title)),
            ),
            Err(err) if err.is_cancelled() => {
                debug!(platform = %adapter.platform(), "Request cancelled mid-entry");
                break;
            }
            Err(err) => {
                warn!(
                    platform = %adapter.platform(),
                    entry = entry.as_str(),
                    reason = err.reason(),
                    error = %err,
                    "Fetch failed"
                );
                fetched.error = Some(err);
                return false;
            }
        }
    }
    true
}

async fn fetch_app_list(
    adapter: &dyn StorefrontAdapter,
    fetcher: &PageFetcher,
    entry: &CatalogEntry,
    options: &AppListOptions,
    max_pages: u32,
    filter: &TitleFilter,
) -> EntryFetch {
    let mut fetched = EntryFetch::default();
    let mut apps = read_app_index(adapter, fetcher, entry, &mut fetched).await;
    if apps.is_empty() {
        if fetched.error.is_none() && !fetcher.cancel_signal().is_cancelled() {
            fetched.error = Some(FetchError::parse(entry.as_str(), "application index is empty"));
        }
        return fetched;
    }

    let listed = apps.len();
    apps.retain(|app| !filter.is_excluded(&app.name));
    let batches: Vec<&[AppRef]> = apps
        .chunks(options.batch_size.max(1))
        .take(max_pages as usize)
        .collect();
    info!(
        platform = %adapter.platform(),
        listed,
        kept = apps.len(),
        batches = batches.len(),
        "Read application index"
    );

    for batch in batches {
        let batch = CatalogEntry::Apps(batch.to_vec());
        if !drain_pages(adapter, fetcher, &batch, 1, filter, &mut fetched).await
            || fetcher.cancel_signal().is_cancelled()
        {
            break;
        }
    }
    fetched
}

/// Merges every index document of the storefront, first name per id wins.
/// A failed document is recorded but the others still count.
async fn read_app_index(
    adapter: &dyn StorefrontAdapter,
    fetcher: &PageFetcher,
    entry: &CatalogEntry,
    fetched: &mut EntryFetch,
) -> Vec<AppRef> {
    let urls = adapter.index_urls(entry);
    if urls.is_empty() {
        fetched.error = Some(FetchError::parse(
            entry.as_str(),
            format!("{} has no application index", adapter.platform()),
        ));
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut apps = Vec::new();
    for url in &urls {
        let result = match fetcher.get_text(url).await {
            Ok(body) => adapter.parse_index(&body, url),
            Err(err) => Err(err),
        };
        match result {
            Ok(listed) => {
                debug!(url = %url, apps = listed.len(), "Fetched application index");
                apps.extend(listed.into_iter().filter(|app| seen.insert(app.id.clone())));
            }
            Err(err) if err.is_cancelled() => break,
            Err(err) => {
                warn!(
                    platform = %adapter.platform(),
                    url = %url,
                    reason = err.reason(),
                    error = %err,
                    "Application index failed"
                );
                fetched.error = Some(err);
            }
        }
    }
    apps
}
