use super::{unsupported_entry, with_query_param, PageContext, ParsedPage, StorefrontAdapter};
use crate::config::CatalogEntry;
use crate::domain::{Platform, RawAmount, RawOffer, RawPrice};
use crate::error::FetchError;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://catalog.gog.com";
pub const DEFAULT_COUNTRY: &str = "US";
const STORE_URL: &str = "https://www.gog.com/en/game";
const PAGE_SIZE: &str = "48";

#[derive(Debug, Deserialize)]
struct CatalogPage {
    pages: Option<u32>,
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Product {
    id: Option<String>,
    title: Option<String>,
    slug: Option<String>,
    store_link: Option<String>,
    price: Option<ProductPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductPrice {
    discount: Option<String>,
    base_money: Option<Money>,
    final_money: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct Money {
    amount: String,
    currency: Option<String>,
}

/// GOG's public catalog API. Prices come as decimal strings per currency.
pub struct GogAdapter {
    base_url: String,
    country: String,
    currency: String,
}

impl GogAdapter {
    pub fn new(country: &str, currency: &str) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            country: country.to_string(),
            currency: currency.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn search_url(&self, term: &str) -> Result<String, FetchError> {
        let url = format!("{}/v1/catalog", self.base_url);
        let url = with_query_param(&url, "limit", PAGE_SIZE)?;
        let url = with_query_param(&url, "query", &format!("like:{term}"))?;
        let url = with_query_param(&url, "countryCode", &self.country)?;
        with_query_param(&url, "currencyCode", &self.currency)
    }

    fn offer(&self, product: Product, ctx: &PageContext<'_>) -> Option<RawOffer> {
        let title = product
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())?;

        let (price, currency) = match product.price {
            Some(price) => {
                let currency = price
                    .final_money
                    .as_ref()
                    .or(price.base_money.as_ref())
                    .and_then(|m| m.currency.clone())
                    .unwrap_or_else(|| ctx.currency.to_string());
                let raw = RawPrice {
                    original: price.base_money.map(|m| RawAmount::Text(m.amount)),
                    discounted: price.final_money.map(|m| RawAmount::Text(m.amount)),
                    discount: price.discount.map(RawAmount::Text),
                };
                (raw, currency)
            }
            None => (RawPrice::default(), ctx.currency.to_string()),
        };

        let url = product
            .store_link
            .or_else(|| product.slug.map(|slug| format!("{STORE_URL}/{slug}")))
            .unwrap_or_else(|| ctx.url.to_string());

        Some(RawOffer {
            platform: Platform::Gog,
            title,
            price,
            currency,
            url,
            external_id: product.id,
            fetched_at: ctx.fetched_at,
            metadata: None,
        })
    }
}

impl StorefrontAdapter for GogAdapter {
    fn platform(&self) -> Platform {
        Platform::Gog
    }

    fn currency(&self) -> &str {
        &self.currency
    }

    fn page_url(&self, entry: &CatalogEntry, page: u32) -> Result<String, FetchError> {
        let listing = match entry {
            CatalogEntry::Url(url) => url.clone(),
            CatalogEntry::Id(term) => self.search_url(term)?,
            other => return Err(unsupported_entry(self.platform(), other)),
        };
        with_query_param(&listing, "page", &page.to_string())
    }

    fn parse_page(&self, body: &str, ctx: &PageContext<'_>) -> Result<ParsedPage, FetchError> {
        let catalog: CatalogPage =
            serde_json::from_str(body).map_err(|e| FetchError::parse(ctx.url, e))?;

        let total = catalog.products.len();
        let offers: Vec<RawOffer> = catalog
            .products
            .into_iter()
            .filter_map(|product| self.offer(product, ctx))
            .collect();
        if offers.len() < total {
            debug!(
                "Skipped {} untitled GOG products on {}",
                total - offers.len(),
                ctx.url
            );
        }

        Ok(ParsedPage {
            offers,
            last_page: catalog.pages,
        })
    }
}
