use tracing::info;

use stayline::compactor;
use stayline::config::Config;
use stayline::store::WalStore;

/// Maintenance pass over a period WAL: replay it, report what each listing
/// holds, and compact the log if enough appends have piled up.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    stayline::observability::init_logging(&config.log_level, config.log_format);
    stayline::observability::init_metrics(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let wal_path = config.wal_path();
    info!("stayline maintenance");
    info!("  wal: {}", wal_path.display());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let store = WalStore::open(wal_path)?;
    let summaries = store.listing_summaries().await;
    for (listing_id, rates, open) in &summaries {
        info!(%listing_id, rate_periods = rates, open_periods = open, "listing");
    }
    info!(listings = summaries.len(), "replay complete");

    if compactor::compact_if_due(&store, config.compact_threshold).await? {
        info!("WAL compacted");
    } else {
        info!(
            appends = store.appends_since_compact().await,
            "WAL below compaction threshold"
        );
    }

    info!("stayline maintenance done");
    Ok(())
}
