use super::html::{absolute_url, has_any, has_digit, last_page_number, select_text};
use super::{unsupported_entry, PageContext, ParsedPage, StorefrontAdapter};
use crate::config::CatalogEntry;
use crate::domain::{Platform, RawAmount, RawOffer, RawPrice};
use crate::error::FetchError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://www.nuuvem.com";

static CARD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[data-component="product-card"]"#).unwrap());
static WRAPPER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.product-card--wrapper").unwrap());
static PRODUCT_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse(".product-title").unwrap());
static DISCOUNT: Lazy<Selector> = Lazy::new(|| Selector::parse(".product-discount").unwrap());
static PRICE_LABEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".product-button__label").unwrap());
static PAGINATION: Lazy<Selector> = Lazy::new(|| Selector::parse(".pagination a").unwrap());

static PAGE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"/page/\d+/?$").unwrap());
static FREE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(gr[aá]tis|free)\b").unwrap());

/// Nuuvem catalog pages. Cards only carry the final price and the discount
/// badge; the original price is rebuilt downstream.
pub struct NuuvemAdapter {
    base_url: String,
    currency: String,
}

impl NuuvemAdapter {
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

    fn search_url(&self, term: &str, page: u32) -> Result<String, FetchError> {
        let page = page.to_string();
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| FetchError::parse(&self.base_url, format!("invalid url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::parse(&self.base_url, "url cannot be a base"))?
            .pop_if_empty()
            .extend(["br-pt", "catalog", "search", term, "page", page.as_str()]);
        Ok(url.to_string())
    }
}

/// Only a label that looks like a price counts; "Indisponível" and the like
/// mean the product cannot be bought.
fn price_label(label: Option<String>) -> Option<RawAmount> {
    label
        .filter(|text| has_digit(text) || FREE_LABEL.is_match(text))
        .map(RawAmount::Text)
}

impl StorefrontAdapter for NuuvemAdapter {
    fn platform(&self) -> Platform {
        Platform::Nuuvem
    }

    fn currency(&self) -> &str {
        &self.currency
    }

    fn page_url(&self, entry: &CatalogEntry, page: u32) -> Result<String, FetchError> {
        match entry {
            CatalogEntry::Url(url) => {
                let base = PAGE_SUFFIX.replace(url.trim_end_matches('/'), "");
                Ok(format!("{}/page/{}", base.trim_end_matches('/'), page))
            }
            CatalogEntry::Id(term) => self.search_url(term, page),
            other => Err(unsupported_entry(self.platform(), other)),
        }
    }

    fn parse_page(&self, body: &str, ctx: &PageContext<'_>) -> Result<ParsedPage, FetchError> {
        let document = Html::parse_document(body);
        let mut offers = Vec::new();

        for card in document.select(&CARD) {
            let wrapper = card.select(&WRAPPER).next();
            let title = wrapper
                .and_then(|w| w.value().attr("title"))
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .or_else(|| select_text(card, &PRODUCT_TITLE));
            let Some(title) = title else {
                debug!("Skipping Nuuvem card without a title on {}", ctx.url);
                continue;
            };

            let price = RawPrice {
                original: None,
                discounted: price_label(select_text(card, &PRICE_LABEL)),
                discount: select_text(card, &DISCOUNT).map(RawAmount::Text),
            };

            let url = wrapper
                .and_then(|w| w.value().attr("href"))
                .map(|href| absolute_url(ctx.url, href))
                .unwrap_or_else(|| ctx.url.to_string());

            offers.push(RawOffer {
                platform: Platform::Nuuvem,
                title,
                price,
                currency: ctx.currency.to_string(),
                url,
                external_id: card
                    .value()
                    .attr("data-track-product-sku")
                    .map(str::to_string),
                fetched_at: ctx.fetched_at,
                metadata: None,
            });
        }

        if ctx.page == 1 && offers.is_empty() && !has_any(&document, &[&CARD, &PAGINATION]) {
            return Err(FetchError::parse(ctx.url, "unrecognized catalog page structure"));
        }

        Ok(ParsedPage {
            offers,
            last_page: last_page_number(&document, &PAGINATION),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const CATALOG: &str = "https://www.nuuvem.com/br-pt/catalog/platforms/pc/types/games";

    #[test]
    fn page_urls_use_path_segment() {
        let adapter = NuuvemAdapter::new("BRL");
        let entry = CatalogEntry::Url(format!("{CATALOG}/page/7"));
        assert_eq!(
            adapter.page_url(&entry, 2).unwrap(),
            format!("{CATALOG}/page/2")
        );

        let entry = CatalogEntry::Id("portal 2".into());
        assert_eq!(
            adapter.page_url(&entry, 1).unwrap(),
            "https://www.nuuvem.com/br-pt/catalog/search/portal%202/page/1"
        );
    }

    #[test]
    fn parses_product_cards() {
        let body = r#"
          <div class="products-items">
            <div data-component="product-card" data-track-product-sku="12345">
              <a class="product-card--wrapper" title="Hades" href="/br-pt/item/hades">
                <span class="product-discount">-50%</span>
                <span class="product-button__label">R$ 23,49</span>
              </a>
            </div>
            <div data-component="product-card" data-track-product-sku="777">
              <a class="product-card--wrapper" title="Portal 2" href="/br-pt/item/portal-2">
                <span class="product-button__label">Indisponível</span>
              </a>
            </div>
            <div data-component="product-card" data-track-product-sku="888">
              <a class="product-card--wrapper" href="/br-pt/item/unknown"></a>
            </div>
          </div>
          <div class="pagination"><a>1</a><a>2</a><a>42</a><a>Próxima</a></div>
        "#;
        let entry = CatalogEntry::Url(CATALOG.into());
        let url = format!("{CATALOG}/page/1");
        let ctx = PageContext {
            url: &url,
            entry: &entry,
            page: 1,
            currency: "BRL",
            fetched_at: Utc::now(),
        };

        let page = NuuvemAdapter::new("BRL").parse_page(body, &ctx).unwrap();

        assert_eq!(page.last_page, Some(42));
        assert_eq!(page.offers.len(), 2);

        let hades = &page.offers[0];
        assert_eq!(hades.external_id.as_deref(), Some("12345"));
        assert_eq!(hades.url, "https://www.nuuvem.com/br-pt/item/hades");
        assert_eq!(hades.price.discounted, Some(RawAmount::Text("R$ 23,49".into())));
        assert_eq!(hades.price.discount, Some(RawAmount::Text("-50%".into())));

        assert!(page.offers[1].price.is_missing());
    }

    #[test]
    fn redesigned_first_page_is_a_parse_error() {
        let entry = CatalogEntry::Url(CATALOG.into());
        let ctx = |page| PageContext {
            url: CATALOG,
            entry: &entry,
            page,
            currency: "BRL",
            fetched_at: Utc::now(),
        };
        let adapter = NuuvemAdapter::new("BRL");
        let body = "<h1>We redesigned our store!</h1>";

        let err = adapter.parse_page(body, &ctx(1)).unwrap_err();
        assert_eq!(err.reason(), "parse");

        // Past the first page an empty body just ends the walk.
        assert!(adapter.parse_page(body, &ctx(3)).unwrap().offers.is_empty());
    }

    #[test]
    fn app_list_entries_are_rejected() {
        let entry = CatalogEntry::AppList(Default::default());
        assert!(matches!(
            NuuvemAdapter::new("BRL").page_url(&entry, 1),
            Err(FetchError::Parse { .. })
        ));
    }

    #[test]
    fn free_label_counts_as_price() {
        assert_eq!(
            price_label(Some("Grátis".into())),
            Some(RawAmount::Text("Grátis".into()))
        );
        assert_eq!(price_label(Some("Em breve".into())), None);
    }
}
