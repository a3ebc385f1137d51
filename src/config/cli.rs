use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to the storefront catalog configuration
    #[arg(long, default_value = "catalog.json")]
    pub catalog_file: PathBuf,

    /// Path to the exchange-rate table
    #[arg(long, default_value = "rates.json")]
    pub rates_file: PathBuf,

    /// Directory holding the listing store and run reports
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Retries per page fetch on transient HTTP failures
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Base delay of the exponential fetch backoff, in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub backoff_ms: u64,

    /// Retries per listing when the store reports a conflict or is unavailable
    #[arg(long, default_value_t = 3)]
    pub persist_retries: u32,

    /// Upper bound on pages enumerated per catalog entry
    #[arg(long, default_value_t = 500)]
    pub max_pages: u32,

    /// Run the storefront adapters one after another instead of concurrently
    #[arg(long)]
    pub sequential: bool,

    /// Hours an unseen offer is kept fresh before it is marked stale
    #[arg(long, default_value_t = 0)]
    pub stale_grace_hours: i64,

    /// Skip writing the all_games.json export
    #[arg(long)]
    pub no_manifest: bool,

    /// Uncached store detail lookups per platform and run
    #[arg(long, default_value_t = 200)]
    pub max_detail_lookups: usize,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 20)]
    pub timeout_secs: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "BYTEBARGAINS_LOG", default_value = "info")]
    pub log_level: String,
}
