use chrono::Duration;
use consolidator::change::LoggedChange;
use consolidator::store::memory::MemoryChangeLogStore;
use consolidator::test_utils::change_log::{ChangeLogWriter, test_tables};
use consolidator::types::{NewChange, ReplicationSide};

#[tokio::test]
async fn oldest_change_time_is_none_without_changes() {
    let change = LoggedChange::new(
        MemoryChangeLogStore::new(),
        test_tables(),
        ReplicationSide::Left,
    );

    assert_eq!(change.oldest_change_time().await.unwrap(), None);
}

#[tokio::test]
async fn oldest_change_time_returns_the_earliest_change_without_consuming_it() {
    let store = MemoryChangeLogStore::new();
    let writer = ChangeLogWriter::new(store.clone());
    let time = writer.now();
    writer
        .record_at(NewChange::insert("dummy_table", "id|2", time + Duration::seconds(100)))
        .await;
    writer
        .record_at(NewChange::insert("dummy_table", "id|1", time))
        .await;
    let change = LoggedChange::new(store.clone(), test_tables(), ReplicationSide::Left);

    assert_eq!(change.oldest_change_time().await.unwrap(), Some(time));
    assert_eq!(change.oldest_change_time().await.unwrap(), Some(time));
    assert_eq!(store.len().await, 2);
    assert!(!change.is_loaded());
}
