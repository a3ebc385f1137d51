use bytebargains::config::Config;
use bytebargains::error::Result;
use bytebargains::infrastructure::{CancelSignal, FileSystemStore};
use bytebargains::services::run_pipeline;
use std::sync::Arc;
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::new()?;

    let level = config
        .args
        .log_level
        .parse::<Level>()
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    config.ensure_directories()?;
    let store = Arc::new(FileSystemStore::new(&config.args.data_dir));

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with what was collected so far");
            on_interrupt.cancel();
        }
    });

    let report = run_pipeline(
        config.catalog,
        config.options,
        config.http_client,
        Arc::new(config.rates),
        store.clone(),
        cancel,
    )
    .await?;

    store.save_report(&report)?;
    info!(
        "Run {} with {} listings stored and {} failures, report in {:?}",
        report.state,
        report.succeeded,
        report.failed.len(),
        store.data_dir()
    );

    for failure in &report.failed {
        warn!(subject = ?failure.subject, reason = %failure.reason, "{}", failure.detail);
    }
    Ok(())
}
