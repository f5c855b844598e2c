use config::shared::ReplicatorConfig;
use consolidator::change::LoggedChange;
use consolidator::store::postgres::PostgresChangeLogStore;
use tracing::{info, warn};

use crate::migrations::migrate_change_log;

pub async fn migrate(config: &ReplicatorConfig) -> anyhow::Result<()> {
    let store = PostgresChangeLogStore::new(&config.source, &config.change_log);

    migrate_change_log(&store).await
}

/// Prints the time of the oldest pending change, or nothing if the change log is empty.
pub async fn print_oldest_change_time(config: &ReplicatorConfig) -> anyhow::Result<()> {
    let store = PostgresChangeLogStore::new(&config.source, &config.change_log);
    let change = LoggedChange::new(store, &config.tables, config.change_log.side);

    match change.oldest_change_time().await? {
        Some(time) => println!("{}", time.to_rfc3339()),
        None => info!(side = %config.change_log.side, "change log is empty"),
    }

    Ok(())
}

/// Consolidates pending changes oldest first and prints each as a JSON line.
///
/// Stops once the change log is exhausted, `limit` changes were printed or Ctrl+C is received.
/// Every printed change has already been consumed from the change log.
pub async fn drain_changes(config: &ReplicatorConfig, limit: Option<usize>) -> anyhow::Result<()> {
    let store = PostgresChangeLogStore::new(&config.source, &config.change_log);
    let mut change = LoggedChange::new(store, &config.tables, config.change_log.side);

    let mut drained = 0;
    loop {
        if limit.is_some_and(|limit| drained >= limit) {
            break;
        }

        let loaded = tokio::select! {
            loaded = change.load_oldest() => loaded?,
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!("failed to listen for ctrl+c: {err}");
                }
                info!("ctrl+c received, stopping drain");
                break;
            }
        };

        if !loaded {
            break;
        }

        println!("{}", serde_json::to_string(&change)?);
        drained += 1;
    }

    info!(side = %config.change_log.side, drained, "drained change log");

    Ok(())
}
