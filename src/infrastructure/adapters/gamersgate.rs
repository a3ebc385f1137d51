use super::html::{absolute_url, element_text, has_any, has_digit, last_page_number, select_text};
use super::{unsupported_entry, with_query_param, PageContext, ParsedPage, StorefrontAdapter};
use crate::config::CatalogEntry;
use crate::domain::{Platform, RawAmount, RawOffer, RawPrice};
use crate::error::FetchError;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://www.gamersgate.com";

static ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("div.catalog-item").unwrap());
static TITLE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".catalog-item--title a").unwrap());
static PRICE: Lazy<Selector> = Lazy::new(|| Selector::parse(".catalog-item--price span").unwrap());
static FULL_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".catalog-item--full-price").unwrap());
static DISCOUNT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".product--label-discount").unwrap());
static PAGINATION: Lazy<Selector> = Lazy::new(|| Selector::parse(".catalog-paginator li").unwrap());

pub struct GamersGateAdapter {
    base_url: String,
    currency: String,
}

impl GamersGateAdapter {
    pub fn new(currency: &str) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            currency: currency.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

impl StorefrontAdapter for GamersGateAdapter {
    fn platform(&self) -> Platform {
        Platform::GamersGate
    }

    fn currency(&self) -> &str {
        &self.currency
    }

    fn page_url(&self, entry: &CatalogEntry, page: u32) -> Result<String, FetchError> {
        let listing = match entry {
            CatalogEntry::Url(url) => url.clone(),
            CatalogEntry::Id(term) => {
                with_query_param(&format!("{}/games/", self.base_url), "query", term)?
            }
            other => return Err(unsupported_entry(self.platform(), other)),
        };
        with_query_param(&listing, "page", &page.to_string())
    }

    fn parse_page(&self, body: &str, ctx: &PageContext<'_>) -> Result<ParsedPage, FetchError> {
        let document = Html::parse_document(body);
        let mut offers = Vec::new();

        for item in document.select(&ITEM) {
            let link = item.select(&TITLE_LINK).next();
            let title = link
                .and_then(|a| a.value().attr("title").map(str::to_string))
                .or_else(|| link.map(element_text))
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty());
            let Some(title) = title else {
                debug!("Skipping GamersGate item without a title on {}", ctx.url);
                continue;
            };

            // Sold-out items render "Out of stock" where the price would be
            let discounted = select_text(item, &PRICE).filter(|text| has_digit(text));
            let price = RawPrice {
                original: discounted
                    .as_ref()
                    .and(select_text(item, &FULL_PRICE))
                    .map(RawAmount::Text),
                discounted: discounted.map(RawAmount::Text),
                discount: select_text(item, &DISCOUNT).map(RawAmount::Text),
            };

            offers.push(RawOffer {
                platform: Platform::GamersGate,
                title,
                price,
                currency: ctx.currency.to_string(),
                url: link
                    .and_then(|a| a.value().attr("href"))
                    .map(|href| absolute_url(ctx.url, href))
                    .unwrap_or_else(|| ctx.url.to_string()),
                external_id: item.value().attr("data-id").map(str::to_string),
                fetched_at: ctx.fetched_at,
                metadata: None,
            });
        }

        if ctx.page == 1 && offers.is_empty() && !has_any(&document, &[&ITEM, &PAGINATION]) {
            return Err(FetchError::parse(ctx.url, "unrecognized catalog page structure"));
        }

        Ok(ParsedPage {
            offers,
            last_page: last_page_number(&document, &PAGINATION),
        })
    }
}
