use crate::config::cli::Args;
use crate::domain::Platform;
use crate::error::{AppError, Result};
use crate::infrastructure::{RetryPolicy, StaticRates};
use clap::Parser;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod cli;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Keywords that mark a store entry as something other than a full game.
pub const DEFAULT_EXCLUDED_KEYWORDS: [&str; 9] = [
    "demo",
    "trial",
    "playtest",
    "beta",
    "dlc",
    "soundtrack",
    "trailer",
    "movie",
    "server",
];

pub const DEFAULT_APP_BATCH_SIZE: usize = 100;

/// What a storefront should enumerate for one catalog line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogEntry {
    /// A listing page, followed through its pagination.
    Url(String),
    /// A single known title or search term.
    Id(String),
    /// The storefront's full application index, priced in batches.
    AppList(AppListOptions),
    /// One batch of apps out of an index. Built by the fetcher, rarely configured by hand.
    Apps(Vec<AppRef>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppListOptions {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for AppListOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_APP_BATCH_SIZE,
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_APP_BATCH_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppRef {
    pub id: String,
    pub name: String,
}

impl CatalogEntry {
    pub fn as_str(&self) -> &str {
        match self {
            CatalogEntry::Url(s) | CatalogEntry::Id(s) => s,
            CatalogEntry::AppList(_) => "app_list",
            CatalogEntry::Apps(_) => "apps",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformCatalog {
    pub platform: Platform,
    pub entries: Vec<CatalogEntry>,
    /// Overrides the storefront's default quoting currency.
    #[serde(default)]
    pub currency: Option<String>,
    /// Country code for storefronts that price by region (Steam, Gog).
    #[serde(default)]
    pub country: Option<String>,
}

impl PlatformCatalog {
    pub fn currency(&self) -> String {
        self.currency
            .clone()
            .unwrap_or_else(|| self.platform.default_currency().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub platforms: Vec<PlatformCatalog>,
    /// Title key -> canonical title key.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    /// Title key -> display title, overriding first-seen titles.
    #[serde(default)]
    pub display_titles: HashMap<String, String>,
    #[serde(default = "default_excluded_keywords")]
    pub excluded_keywords: Vec<String>,
}

fn default_excluded_keywords() -> Vec<String> {
    DEFAULT_EXCLUDED_KEYWORDS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for platform in &self.platforms {
            if !seen.insert(platform.platform) {
                return Err(AppError::Config(format!(
                    "platform '{}' is listed more than once",
                    platform.platform
                )));
            }
            for entry in &platform.entries {
                validate_entry(platform.platform, entry)?;
            }
        }
        Ok(())
    }
}

fn validate_entry(platform: Platform, entry: &CatalogEntry) -> Result<()> {
    match entry {
        CatalogEntry::Url(url) => {
            reqwest::Url::parse(url).map_err(|e| {
                AppError::Config(format!("{platform} entry '{url}' is not an absolute URL: {e}"))
            })?;
        }
        CatalogEntry::Id(term) if term.trim().is_empty() => {
            return Err(AppError::Config(format!("{platform} has an empty id entry")));
        }
        CatalogEntry::AppList(_) | CatalogEntry::Apps(_) if platform != Platform::Steam => {
            return Err(AppError::Config(format!(
                "{platform} has no application index, '{}' entries are Steam only",
                entry.as_str()
            )));
        }
        CatalogEntry::AppList(options) if options.batch_size == 0 => {
            return Err(AppError::Config("app_list batch_size must be positive".into()));
        }
        _ => {}
    }
    Ok(())
}

/// Knobs of a single pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub retry: RetryPolicy,
    pub persist_retries: u32,
    pub max_pages: u32,
    pub concurrent: bool,
    pub stale_grace: chrono::Duration,
    pub export_manifest: bool,
    /// Detail requests per platform and run; cached details are free.
    pub max_detail_lookups: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            persist_retries: 3,
            max_pages: 500,
            concurrent: true,
            stale_grace: chrono::Duration::zero(),
            export_manifest: true,
            max_detail_lookups: 200,
        }
    }
}

impl From<&Args> for PipelineOptions {
    fn from(args: &Args) -> Self {
        Self {
            retry: RetryPolicy {
                max_retries: args.max_retries,
                backoff_base_ms: args.backoff_ms,
                ..RetryPolicy::default()
            },
            persist_retries: args.persist_retries,
            max_pages: args.max_pages,
            concurrent: !args.sequential,
            stale_grace: chrono::Duration::hours(args.stale_grace_hours.max(0)),
            export_manifest: !args.no_manifest,
            max_detail_lookups: args.max_detail_lookups,
        }
    }
}

pub struct Config {
    pub args: Args,
    pub catalog: Catalog,
    pub rates: StaticRates,
    pub options: PipelineOptions,
    pub http_client: Client,
}

impl Config {
    pub fn new() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        let catalog = Catalog::load(&args.catalog_file)?;
        let rates = StaticRates::load(&args.rates_file)?;
        let options = PipelineOptions::from(&args);

        let http_client = Client::builder()
            .timeout(Duration::from_secs(args.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            args,
            catalog,
            rates,
            options,
            http_client,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        if !self.args.data_dir.exists() {
            std::fs::create_dir_all(&self.args.data_dir)?;
        }

        info!("Data dir {:?} exists", self.args.data_dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_entries() {
        let json = r#"{
            "platforms": [
                {"platform": "steam", "entries": [{"id": "620"}], "country": "US"},
                {"platform": "nuuvem", "entries": [{"url": "https://www.nuuvem.com/br-pt/catalog"}]}
            ],
            "aliases": {"portal-2-goty": "portal-2"}
        }"#;
        let catalog: Catalog = serde_json::from_str(json).unwrap();

        assert_eq!(catalog.platforms.len(), 2);
        assert_eq!(catalog.platforms[0].entries[0], CatalogEntry::Id("620".into()));
        assert_eq!(catalog.platforms[1].currency(), "BRL");
        assert_eq!(catalog.excluded_keywords.len(), DEFAULT_EXCLUDED_KEYWORDS.len());
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn rejects_duplicate_platforms() {
        let json = r#"{"platforms": [
            {"platform": "gog", "entries": []},
            {"platform": "gog", "entries": []}
        ]}"#;
        let catalog: Catalog = serde_json::from_str(json).unwrap();

        assert!(matches!(catalog.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn rejects_relative_urls() {
        let json = r#"{"platforms": [
            {"platform": "gamersgate", "entries": [{"url": "/games/?sort=alphabetically"}]}
        ]}"#;
        let catalog: Catalog = serde_json::from_str(json).unwrap();

        let err = catalog.validate().unwrap_err();
        assert!(matches!(&err, AppError::Config(msg) if msg.contains("/games/")));
    }

    #[test]
    fn app_list_entries_are_steam_only() {
        let json = r#"{"platforms": [
            {"platform": "steam", "entries": [{"app_list": {}}, {"apps": [{"id": "620", "name": "Portal 2"}]}]}
        ]}"#;
        let catalog: Catalog = serde_json::from_str(json).unwrap();
        assert!(catalog.validate().is_ok());
        assert_eq!(
            catalog.platforms[0].entries[0],
            CatalogEntry::AppList(AppListOptions { batch_size: 100 })
        );

        let json = r#"{"platforms": [{"platform": "gog", "entries": [{"app_list": {"batch_size": 10}}]}]}"#;
        let catalog: Catalog = serde_json::from_str(json).unwrap();
        assert!(matches!(catalog.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn options_follow_cli_flags() {
        let args = Args::parse_from([
            "bytebargains",
            "--sequential",
            "--max-retries",
            "5",
            "--stale-grace-hours",
            "48",
            "--max-detail-lookups",
            "0",
        ]);
        let options = PipelineOptions::from(&args);

        assert!(!options.concurrent);
        assert_eq!(options.retry.max_retries, 5);
        assert_eq!(options.stale_grace, chrono::Duration::hours(48));
        assert_eq!(options.max_detail_lookups, 0);
    }
}
