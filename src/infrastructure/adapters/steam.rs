use super::html::{absolute_url, has_any, last_page_number, select_text};
use super::{with_query_param, PageContext, ParsedPage, StorefrontAdapter};
use crate::config::{AppRef, CatalogEntry};
use crate::domain::{GameMetadata, Platform, RawAmount, RawOffer, RawPrice};
use crate::error::FetchError;
use governor::Quota;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://store.steampowered.com";
pub const DEFAULT_API_BASE_URL: &str = "https://api.steampowered.com";
pub const DEFAULT_COUNTRY: &str = "US";

/// Steam answers 429 past roughly 200 store calls per five minutes.
pub const RATE_LIMIT_CALLS: u32 = 195;
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(310);

static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("a.search_result_row").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("span.title").unwrap());
static DISCOUNT_BLOCK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.discount_block").unwrap());
static ORIGINAL_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".discount_original_price").unwrap());
static FINAL_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".discount_final_price").unwrap());
static DISCOUNT_PCT: Lazy<Selector> = Lazy::new(|| Selector::parse(".discount_pct").unwrap());
static PAGINATION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".search_pagination_right a").unwrap());
static RESULTS: Lazy<Selector> = Lazy::new(|| Selector::parse("#search_resultsRows").unwrap());

#[derive(Debug, Deserialize)]
struct AppDetailsEnvelope {
    success: bool,
    data: Option<AppDetails>,
}

#[derive(Debug, Deserialize)]
struct AppDetails {
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    is_free: bool,
    price_overview: Option<PriceOverview>,
    #[serde(default)]
    genres: Vec<Genre>,
    short_description: Option<String>,
    header_image: Option<String>,
}

impl AppDetails {
    fn metadata(&self) -> GameMetadata {
        GameMetadata {
            kind: self.kind.clone(),
            genres: self.genres.iter().map(|g| g.description.clone()).collect(),
            description: self.short_description.clone().filter(|d| !d.trim().is_empty()),
            header_image: self.header_image.clone().filter(|i| !i.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Genre {
    description: String,
}

/// `appdetails` filtered to `price_overview`: `data` is an object with just
/// the price, or `[]` when the app has none.
#[derive(Debug, Deserialize)]
struct PriceEnvelope {
    success: bool,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AppListResponse {
    applist: AppList,
}

#[derive(Debug, Deserialize)]
struct AppList {
    apps: Vec<AppListItem>,
}

#[derive(Debug, Deserialize)]
struct AppListItem {
    appid: u64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PriceOverview {
    currency: String,
    initial: i64,
    #[serde(rename = "final")]
    final_price: i64,
    discount_percent: i64,
}

/// Steam: the `appdetails` JSON API for known app ids and app-list
/// batches, search result HTML for category URLs.
pub struct SteamAdapter {
    base_url: String,
    api_base_url: String,
    country: String,
    currency: String,
    rate_limit: Option<Quota>,
}

/// 195 calls per 310 seconds, all of them available as a burst.
pub fn default_rate_limit() -> Option<Quota> {
    let burst = NonZeroU32::new(RATE_LIMIT_CALLS)?;
    Quota::with_period(RATE_LIMIT_WINDOW / RATE_LIMIT_CALLS).map(|quota| quota.allow_burst(burst))
}

impl SteamAdapter {
    pub fn new(country: &str, currency: &str) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            country: country.to_string(),
            currency: currency.to_string(),
            rate_limit: default_rate_limit(),
        }
    }

    /// Points both the store and the Web API at `base_url`.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.api_base_url = self.base_url.clone();
        self
    }

    pub fn with_rate_limit(mut self, quota: Option<Quota>) -> Self {
        self.rate_limit = quota;
        self
    }

    fn app_url(&self, app_id: &str) -> String {
        format!("{}/app/{}", self.base_url, app_id)
    }

    fn details_endpoint(&self, app_id: &str) -> String {
        format!(
            "{}/api/appdetails?appids={}&cc={}&l=english",
            self.base_url, app_id, self.country
        )
    }

    fn parse_app_details(
        &self,
        body: &str,
        app_id: &str,
        ctx: &PageContext<'_>,
    ) -> Result<ParsedPage, FetchError> {
        let mut envelopes: HashMap<String, AppDetailsEnvelope> =
            serde_json::from_str(body).map_err(|e| FetchError::parse(ctx.url, e))?;

        let details = envelopes
            .remove(app_id)
            .filter(|envelope| envelope.success)
            .and_then(|envelope| envelope.data)
            .ok_or_else(|| FetchError::NotFound {
                url: ctx.url.to_string(),
            })?;

        let metadata = details.metadata();
        // DLC, soundtracks and videos share the app namespace
        if !metadata.is_game() {
            return Ok(ParsedPage {
                offers: Vec::new(),
                last_page: Some(1),
            });
        }

        let (price, currency) = match details.price_overview {
            Some(overview) => (
                RawPrice {
                    original: Some(RawAmount::Number(overview.initial)),
                    discounted: Some(RawAmount::Number(overview.final_price)),
                    discount: Some(RawAmount::Number(overview.discount_percent)),
                },
                overview.currency,
            ),
            None if details.is_free => (
                RawPrice {
                    original: Some(RawAmount::Number(0)),
                    discounted: Some(RawAmount::Number(0)),
                    discount: None,
                },
                ctx.currency.to_string(),
            ),
            None => (RawPrice::default(), ctx.currency.to_string()),
        };

        Ok(ParsedPage {
            offers: vec![RawOffer {
                platform: Platform::Steam,
                title: details.name,
                price,
                currency,
                url: self.app_url(app_id),
                external_id: Some(app_id.to_string()),
                fetched_at: ctx.fetched_at,
                metadata: Some(metadata),
            }],
            last_page: Some(1),
        })
    }

    /// One `appdetails` batch. Offers follow the batch order; apps Steam
    /// does not know or has no price for are left out.
    fn parse_app_batch(
        &self,
        body: &str,
        apps: &[AppRef],
        ctx: &PageContext<'_>,
    ) -> Result<ParsedPage, FetchError> {
        let mut envelopes: HashMap<String, PriceEnvelope> =
            serde_json::from_str(body).map_err(|e| FetchError::parse(ctx.url, e))?;

        let mut offers = Vec::new();
        for app in apps {
            let Some(envelope) = envelopes.remove(&app.id).filter(|e| e.success) else {
                debug!(app_id = %app.id, "Steam has no details for app");
                continue;
            };
            let Some(overview) = envelope.data.get("price_overview") else {
                continue;
            };
            let overview: PriceOverview = serde_json::from_value(overview.clone())
                .map_err(|e| FetchError::parse(ctx.url, format!("app {}: {e}", app.id)))?;

            offers.push(RawOffer {
                platform: Platform::Steam,
                title: app.name.clone(),
                price: RawPrice {
                    original: Some(RawAmount::Number(overview.initial)),
                    discounted: Some(RawAmount::Number(overview.final_price)),
                    discount: Some(RawAmount::Number(overview.discount_percent)),
                },
                currency: overview.currency,
                url: self.app_url(&app.id),
                external_id: Some(app.id.clone()),
                fetched_at: ctx.fetched_at,
                metadata: None,
            });
        }

        Ok(ParsedPage {
            offers,
            last_page: Some(1),
        })
    }

    fn parse_search_results(
        &self,
        body: &str,
        ctx: &PageContext<'_>,
    ) -> Result<ParsedPage, FetchError> {
        let document = Html::parse_document(body);
        let mut offers = Vec::new();

        for row in document.select(&ROW) {
            let Some(title) = select_text(row, &TITLE) else {
                continue;
            };

            let block = row.select(&DISCOUNT_BLOCK).next();
            let final_text = select_text(row, &FINAL_PRICE);
            let discounted = match final_text {
                Some(text) => Some(RawAmount::Text(text)),
                None => block
                    .and_then(|b| b.value().attr("data-price-final"))
                    .and_then(|cents| cents.parse::<i64>().ok())
                    .map(RawAmount::Number),
            };

            let price = RawPrice {
                original: select_text(row, &ORIGINAL_PRICE).map(RawAmount::Text),
                discounted,
                discount: select_text(row, &DISCOUNT_PCT).map(RawAmount::Text),
            };

            offers.push(RawOffer {
                platform: Platform::Steam,
                title,
                price,
                currency: ctx.currency.to_string(),
                url: row
                    .value()
                    .attr("href")
                    .map(|href| absolute_url(ctx.url, href))
                    .unwrap_or_else(|| ctx.url.to_string()),
                external_id: row.value().attr("data-ds-appid").map(str::to_string),
                fetched_at: ctx.fetched_at,
                metadata: None,
            });
        }

        let recognized = has_any(&document, &[&ROW, &PAGINATION, &RESULTS]);
        if ctx.page == 1 && offers.is_empty() && !recognized {
            return Err(FetchError::parse(ctx.url, "unrecognized search page structure"));
        }

        let last_page = last_page_number(&document, &PAGINATION).or(Some(ctx.page));
        Ok(ParsedPage { offers, last_page })
    }
}

impl StorefrontAdapter for SteamAdapter {
    fn platform(&self) -> Platform {
        Platform::Steam
    }

    fn currency(&self) -> &str {
        &self.currency
    }

    fn rate_limit(&self) -> Option<Quota> {
        self.rate_limit
    }

    fn page_url(&self, entry: &CatalogEntry, page: u32) -> Result<String, FetchError> {
        match entry {
            CatalogEntry::Id(app_id) => Ok(self.details_endpoint(app_id)),
            CatalogEntry::Url(url) => with_query_param(url, "page", &page.to_string()),
            CatalogEntry::Apps(apps) => {
                let ids: Vec<&str> = apps.iter().map(|app| app.id.as_str()).collect();
                Ok(format!(
                    "{}/api/appdetails?appids={}&cc={}&filters=price_overview",
                    self.base_url,
                    ids.join(","),
                    self.country
                ))
            }
            CatalogEntry::AppList(_) => Err(FetchError::parse(
                entry.as_str(),
                "the app list is read through index_urls, not paged",
            )),
        }
    }

    fn parse_page(&self, body: &str, ctx: &PageContext<'_>) -> Result<ParsedPage, FetchError> {
        match ctx.entry {
            CatalogEntry::Id(app_id) => self.parse_app_details(body, app_id, ctx),
            CatalogEntry::Url(_) => self.parse_search_results(body, ctx),
            CatalogEntry::Apps(apps) => self.parse_app_batch(body, apps, ctx),
            CatalogEntry::AppList(_) => Err(FetchError::parse(ctx.url, "app list is not a page")),
        }
    }

    fn index_urls(&self, entry: &CatalogEntry) -> Vec<String> {
        match entry {
            CatalogEntry::AppList(_) => vec![
                format!("{}/ISteamApps/GetAppList/v0002/", self.api_base_url),
                format!("{}/ISteamApps/GetAppList/v2/", self.api_base_url),
            ],
            _ => Vec::new(),
        }
    }

    fn parse_index(&self, body: &str, url: &str) -> Result<Vec<AppRef>, FetchError> {
        let response: AppListResponse =
            serde_json::from_str(body).map_err(|e| FetchError::parse(url, e))?;

        let mut seen = HashSet::new();
        Ok(response
            .applist
            .apps
            .into_iter()
            .filter(|app| !app.name.trim().is_empty())
            .filter(|app| seen.insert(app.appid))
            .map(|app| AppRef {
                id: app.appid.to_string(),
                name: app.name.trim().to_string(),
            })
            .collect())
    }

    fn details_url(&self, external_id: &str) -> Option<String> {
        Some(self.details_endpoint(external_id))
    }

    fn parse_details(
        &self,
        body: &str,
        external_id: &str,
        url: &str,
    ) -> Result<GameMetadata, FetchError> {
        let mut envelopes: HashMap<String, AppDetailsEnvelope> =
            serde_json::from_str(body).map_err(|e| FetchError::parse(url, e))?;

        Ok(envelopes
            .remove(external_id)
            .filter(|envelope| envelope.success)
            .and_then(|envelope| envelope.data)
            .map(|details| details.metadata())
            .unwrap_or_else(GameMetadata::unavailable))
    }
}
