//! Adapter pagination and fetch behaviour against local mock storefronts.

use bytebargains::config::{AppListOptions, CatalogEntry};
use bytebargains::error::FetchError;
use bytebargains::infrastructure::{
    fetch_entry, CancelSignal, GamersGateAdapter, GogAdapter, NuuvemAdapter, OfferPages,
    PageFetcher, RetryPolicy, SteamAdapter, StorefrontAdapter,
};
use std::time::Duration;
use bytebargains::services::TitleFilter;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(max_retries: u32) -> PageFetcher {
    fetcher_with(max_retries, CancelSignal::new())
}

fn fetcher_with(max_retries: u32, cancel: CancelSignal) -> PageFetcher {
    let policy = RetryPolicy {
        max_retries,
        backoff_base_ms: 0,
        max_delay_ms: 0,
    };
    PageFetcher::new(reqwest::Client::new(), policy, cancel)
}

fn gog_page(pages: u32, titles: &[&str]) -> serde_json::Value {
    let products: Vec<_> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            json!({
                "id": format!("{}", 1000 + i),
                "title": title,
                "slug": title.to_lowercase().replace(' ', "_"),
                "price": {
                    "discount": null,
                    "baseMoney": {"amount": "9.99", "currency": "USD"},
                    "finalMoney": {"amount": "9.99", "currency": "USD"}
                }
            })
        })
        .collect();
    json!({"pages": pages, "products": products})
}

fn gamersgate_page(titles: &[&str], last_page: u32) -> String {
    let items: String = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            format!(
                r#"<div class="column catalog-item product--item" data-id="{i}">
                     <div class="catalog-item--title"><a title="{title}" href="/product/{i}/">{title}</a></div>
                     <div class="catalog-item--price"><span>$4.99</span></div>
                   </div>"#
            )
        })
        .collect();
    let pager: String = (1..=last_page).map(|p| format!("<li>{p}</li>")).collect();
    format!(r#"<div>{items}</div><ul class="catalog-paginator">{pager}</ul>"#)
}

fn steam_search_page(title: &str, last_page: u32) -> String {
    let pager: String = (1..=last_page).map(|p| format!("<a>{p}</a>")).collect();
    format!(
        r#"<a class="search_result_row" data-ds-appid="1" href="/app/1/">
             <span class="title">{title}</span>
             <div class="discount_block" data-price-final="999"><div class="discount_final_price">$9.99</div></div>
           </a>
           <div class="search_pagination_right">{pager}</div>"#
    )
}

#[tokio::test]
async fn gog_entry_follows_reported_page_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/catalog"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gog_page(2, &["Portal 2"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/catalog"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gog_page(2, &["Half-Life 2"])))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = GogAdapter::new("US", "USD").with_base_url(&server.uri());
    let entry = CatalogEntry::Url(format!("{}/v1/catalog?limit=48", server.uri()));

    let fetched = fetch_entry(&adapter, &fetcher(0), &entry, 50, &TitleFilter::allow_all()).await;

    assert!(fetched.error.is_none(), "unexpected error: {:?}", fetched.error);
    let titles: Vec<_> = fetched.offers.iter().map(|o| o.title.as_str()).collect();
    assert_eq!(titles, vec!["Portal 2", "Half-Life 2"]);
}

#[tokio::test]
async fn empty_page_ends_the_sequence_early() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/games/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gamersgate_page(&["Portal 2"], 5)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/games/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gamersgate_page(&[], 5)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/games/"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gamersgate_page(&["Late"], 5)))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = GamersGateAdapter::new("USD");
    let entry = CatalogEntry::Url(format!("{}/games/?sort=alphabetically", server.uri()));

    let fetched = fetch_entry(&adapter, &fetcher(0), &entry, 50, &TitleFilter::allow_all()).await;

    assert_eq!(fetched.offers.len(), 1);
    assert!(fetched.error.is_none());
}

#[tokio::test]
async fn max_pages_bounds_enumeration() {
    let server = MockServer::start().await;
    for page in ["1", "2"] {
        Mock::given(method("GET"))
            .and(path("/search/results/"))
            .and(query_param("page", page))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(steam_search_page("Portal", 10)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/search/results/"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(steam_search_page("Portal", 10)))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = SteamAdapter::new("US", "USD");
    let entry = CatalogEntry::Url(format!("{}/search/results/?term=portal", server.uri()));

    let fetched = fetch_entry(&adapter, &fetcher(0), &entry, 2, &TitleFilter::allow_all()).await;

    assert_eq!(fetched.offers.len(), 2);
}

#[tokio::test]
async fn page_sequence_is_lazy_and_restartable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/catalog"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gog_page(1, &["Portal 2"])))
        .expect(2)
        .mount(&server)
        .await;

    let adapter = GogAdapter::new("US", "USD").with_base_url(&server.uri());
    let fetcher = fetcher(0);
    let entry = CatalogEntry::Url(format!("{}/v1/catalog", server.uri()));
    let mut pages = OfferPages::new(&adapter, &fetcher, &entry, 10);

    assert!(!pages.is_finished());
    let first = pages.next_page().await.unwrap().unwrap();
    assert_eq!(first.len(), 1);
    assert!(pages.next_page().await.is_none());
    assert!(pages.is_finished());

    pages.restart();
    let again = pages.next_page().await.unwrap().unwrap();
    assert_eq!(again[0].title, first[0].title);
    assert_eq!(again[0].url, first[0].url);
}

#[tokio::test]
async fn three_consecutive_failures_surface_as_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/catalog"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let adapter = GogAdapter::new("US", "USD");
    let entry = CatalogEntry::Url(format!("{}/v1/catalog", server.uri()));

    let fetched = fetch_entry(&adapter, &fetcher(2), &entry, 10, &TitleFilter::allow_all()).await;

    match fetched.error {
        Some(FetchError::Network { status, .. }) => assert_eq!(status, Some(503)),
        other => panic!("expected network error, got {other:?}"),
    }
    assert!(fetched.offers.is_empty());
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/appdetails"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = SteamAdapter::new("US", "USD").with_base_url(&server.uri());
    let entry = CatalogEntry::Id("999999".into());

    let result = fetch_entry(&adapter, &fetcher(3), &entry, 10, &TitleFilter::allow_all())
        .await
        .into_result();

    assert!(matches!(result, Err(FetchError::NotFound { .. })));
}

#[tokio::test]
async fn failed_page_keeps_offers_collected_so_far() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/games/"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(gamersgate_page(&["Portal 2", "Hades"], 3)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/games/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let adapter = GamersGateAdapter::new("USD");
    let entry = CatalogEntry::Url(format!("{}/games/", server.uri()));

    let fetched = fetch_entry(&adapter, &fetcher(0), &entry, 10, &TitleFilter::allow_all()).await;

    assert_eq!(fetched.offers.len(), 2);
    assert_eq!(fetched.error.map(|e| e.reason()), Some("network"));
}

#[tokio::test]
async fn cancelled_run_fetches_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gog_page(1, &["Portal 2"])))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancelSignal::new();
    cancel.cancel();
    let adapter = GogAdapter::new("US", "USD");
    let entry = CatalogEntry::Url(format!("{}/v1/catalog", server.uri()));

    let fetched = fetch_entry(
        &adapter,
        &fetcher_with(0, cancel),
        &entry,
        10,
        &TitleFilter::allow_all(),
    )
    .await;

    assert!(fetched.cancelled);
    assert!(fetched.offers.is_empty());
    assert!(fetched.error.is_none());
}

#[tokio::test]
async fn excluded_titles_are_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/catalog"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(gog_page(1, &["Portal 2", "Portal 2 Demo", "Hades Soundtrack"])),
        )
        .mount(&server)
        .await;

    let adapter = GogAdapter::new("US", "USD");
    let entry = CatalogEntry::Url(format!("{}/v1/catalog", server.uri()));
    let filter = TitleFilter::new(&["demo".to_string(), "soundtrack".to_string()]).unwrap();

    let fetched = fetch_entry(&adapter, &fetcher(0), &entry, 10, &filter).await;

    assert_eq!(fetched.offers.len(), 1);
    assert_eq!(fetched.offers[0].platform, adapter.platform());
}

fn steam_prices(ids: &[&str]) -> serde_json::Value {
    let envelope: serde_json::Map<String, serde_json::Value> = ids
        .iter()
        .map(|id| {
            (
                id.to_string(),
                json!({"success": true, "data": {"price_overview":
                    {"currency": "USD", "initial": 999, "final": 499, "discount_percent": 50}}}),
            )
        })
        .collect();
    serde_json::Value::Object(envelope)
}

#[tokio::test]
async fn app_list_is_merged_filtered_and_priced_in_batches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ISteamApps/GetAppList/v0002/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"applist": {"apps": [
            {"appid": 220, "name": "Half-Life 2"},
            {"appid": 620, "name": "Portal 2"},
            {"appid": 621, "name": "Portal 2 Demo"}
        ]}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ISteamApps/GetAppList/v2/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"applist": {"apps": [
            {"appid": 620, "name": "Portal 2"},
            {"appid": 400, "name": "Portal"}
        ]}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/appdetails"))
        .and(query_param("appids", "220,620"))
        .and(query_param("filters", "price_overview"))
        .respond_with(ResponseTemplate::new(200).set_body_json(steam_prices(&["220", "620"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/appdetails"))
        .and(query_param("appids", "400"))
        .respond_with(ResponseTemplate::new(200).set_body_json(steam_prices(&["400"])))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = SteamAdapter::new("US", "USD").with_base_url(&server.uri());
    let entry = CatalogEntry::AppList(AppListOptions { batch_size: 2 });
    let filter = TitleFilter::new(&["demo".to_string()]).unwrap();

    let fetched = fetch_entry(&adapter, &fetcher(0), &entry, 10, &filter).await;

    assert!(fetched.error.is_none(), "unexpected error: {:?}", fetched.error);
    let titles: Vec<_> = fetched.offers.iter().map(|o| o.title.as_str()).collect();
    assert_eq!(titles, vec!["Half-Life 2", "Portal 2", "Portal"]);
    assert_eq!(fetched.offers[2].external_id.as_deref(), Some("400"));
}

#[tokio::test]
async fn failed_app_index_is_recorded_but_the_other_still_counts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ISteamApps/GetAppList/v0002/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ISteamApps/GetAppList/v2/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"applist": {"apps": [
            {"appid": 620, "name": "Portal 2"}
        ]}})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/appdetails"))
        .and(query_param("appids", "620"))
        .respond_with(ResponseTemplate::new(200).set_body_json(steam_prices(&["620"])))
        .mount(&server)
        .await;

    let adapter = SteamAdapter::new("US", "USD").with_base_url(&server.uri());
    let entry = CatalogEntry::AppList(AppListOptions::default());

    let fetched = fetch_entry(&adapter, &fetcher(0), &entry, 10, &TitleFilter::allow_all()).await;

    assert_eq!(fetched.offers.len(), 1);
    assert_eq!(fetched.error.map(|e| e.reason()), Some("network"));
}

#[tokio::test]
async fn app_list_needs_an_index() {
    let adapter = GogAdapter::new("US", "USD");
    let entry = CatalogEntry::AppList(AppListOptions::default());

    let fetched = fetch_entry(&adapter, &fetcher(0), &entry, 10, &TitleFilter::allow_all()).await;

    assert!(matches!(fetched.error, Some(FetchError::Parse { .. })));
}

#[tokio::test]
async fn unrecognized_first_page_fails_the_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/br-pt/catalog/page/1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<h1>We redesigned our store!</h1>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let adapter = NuuvemAdapter::new("BRL");
    let entry = CatalogEntry::Url(format!("{}/br-pt/catalog", server.uri()));

    let fetched = fetch_entry(&adapter, &fetcher(0), &entry, 10, &TitleFilter::allow_all()).await;

    assert!(fetched.offers.is_empty());
    assert_eq!(fetched.error.map(|e| e.reason()), Some("parse"));
}

#[tokio::test]
async fn cancel_during_backoff_is_not_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/catalog"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let cancel = CancelSignal::new();
    let policy = RetryPolicy {
        max_retries: 3,
        backoff_base_ms: 60_000,
        max_delay_ms: 60_000,
    };
    let fetcher = PageFetcher::new(reqwest::Client::new(), policy, cancel.clone());
    let adapter = GogAdapter::new("US", "USD");
    let entry = CatalogEntry::Url(format!("{}/v1/catalog", server.uri()));

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });
    let fetched = tokio::time::timeout(
        Duration::from_secs(10),
        fetch_entry(&adapter, &fetcher, &entry, 10, &TitleFilter::allow_all()),
    )
    .await
    .expect("backoff should end on cancel");

    assert!(fetched.cancelled);
    assert!(fetched.error.is_none(), "got {:?}", fetched.error);
}
