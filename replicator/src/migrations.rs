use consolidator::store::postgres::PostgresChangeLogStore;
use tracing::info;

/// Creates the change log table and its scan index when they are missing.
pub async fn migrate_change_log(store: &PostgresChangeLogStore) -> anyhow::Result<()> {
    store.create_change_log_table().await?;
    info!("change log table is up to date");

    Ok(())
}
