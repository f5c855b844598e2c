use config::shared::TablesConfig;
use consolidator::change::LoggedChange;
use consolidator::error::ErrorKind;
use consolidator::key::CompositeKey;
use consolidator::store::memory::MemoryChangeLogStore;
use consolidator::test_utils::change_log::{ChangeLogWriter, test_tables};
use consolidator::test_utils::fault_store::{
    ChangeLogMethod, FaultConfig, FaultInjectingChangeLogStore,
};
use consolidator::types::{ChangeType, NewChange, ReplicationSide};
use telemetry::init_test_tracing;

fn key(serialized: &str) -> Option<CompositeKey> {
    Some(CompositeKey::parse(serialized).unwrap())
}

fn setup() -> (
    ChangeLogWriter<MemoryChangeLogStore>,
    LoggedChange<MemoryChangeLogStore, TablesConfig>,
) {
    let store = MemoryChangeLogStore::new();
    let change = LoggedChange::new(store.clone(), test_tables(), ReplicationSide::Right);

    (ChangeLogWriter::new(store), change)
}

#[tokio::test]
async fn load_oldest_does_not_walk_an_empty_change_log() {
    init_test_tracing();
    let store =
        FaultInjectingChangeLogStore::wrap(MemoryChangeLogStore::new(), FaultConfig::default());
    let mut change = LoggedChange::new(store.clone(), test_tables(), ReplicationSide::Left);

    assert!(!change.load_oldest().await.unwrap());

    assert!(!change.is_loaded());
    assert_eq!(store.calls(ChangeLogMethod::OldestChange).await, 1);
    assert_eq!(store.calls(ChangeLogMethod::NextChange).await, 0);
    assert_eq!(store.calls(ChangeLogMethod::DeleteChanges).await, 0);
}

#[tokio::test]
async fn load_oldest_loads_the_oldest_change() {
    let (mut writer, mut change) = setup();
    writer.insert("dummy_table", "id|1").await;
    writer.insert("dummy_table", "id|2").await;

    assert!(change.load_oldest().await.unwrap());

    assert_eq!(change.table(), Some("dummy_table"));
    assert_eq!(change.key().cloned(), key("id|1"));
    assert_eq!(writer.store().len().await, 1);
}

#[tokio::test]
async fn load_oldest_orders_across_tables() {
    let (mut writer, mut change) = setup();
    let later = writer.now() + chrono::Duration::seconds(30);
    writer
        .record_at(NewChange::insert("dummy_table", "id|1", later))
        .await;
    writer.delete("left_table", "id|9").await;

    assert!(change.load_oldest().await.unwrap());

    assert_eq!(change.table(), Some("left_table"));
    assert_eq!(change.change_type(), Some(ChangeType::Delete));
}

#[tokio::test]
async fn load_oldest_skips_changes_cancelling_each_other_out() {
    let (mut writer, mut change) = setup();
    writer.insert("dummy_table", "id|1").await;
    writer.delete("dummy_table", "id|1").await;
    writer.insert("dummy_table", "id|2").await;

    assert!(change.load_oldest().await.unwrap());

    assert_eq!(change.key().cloned(), key("id|2"));
    assert!(writer.store().is_empty().await);
}

#[tokio::test]
async fn load_oldest_reports_nothing_when_every_change_cancels_out() {
    let (mut writer, mut change) = setup();
    writer.insert("dummy_table", "id|1").await;
    writer.insert("left_table", "id|1").await;
    writer.delete("dummy_table", "id|1").await;
    writer.delete("left_table", "id|1").await;

    assert!(!change.load_oldest().await.unwrap());
    assert!(writer.store().is_empty().await);
}

#[tokio::test]
async fn load_oldest_loads_a_change_recorded_again_at_a_cancelled_key() {
    let (mut writer, mut change) = setup();
    writer.insert("dummy_table", "id|1").await;
    writer.update("dummy_table", "id|1", "id|2").await;
    writer.delete("dummy_table", "id|2").await;
    writer.insert("dummy_table", "id|1").await;

    assert!(change.load_oldest().await.unwrap());

    assert_eq!(change.change_type(), Some(ChangeType::Insert));
    assert_eq!(change.key().cloned(), key("id|1"));
    assert_eq!(change.consumed(), 1);
    assert!(writer.store().is_empty().await);
}

#[tokio::test]
async fn load_oldest_prefers_an_earlier_change_at_a_cancelled_key() {
    let (mut writer, mut change) = setup();
    writer.insert("dummy_table", "id|1").await;
    writer.update("dummy_table", "id|1", "id|2").await;
    writer.delete("dummy_table", "id|2").await;
    writer.insert("dummy_table", "id|1").await;
    writer.insert("dummy_table", "id|9").await;

    assert!(change.load_oldest().await.unwrap());
    assert_eq!(change.key().cloned(), key("id|1"));

    assert!(change.load_oldest().await.unwrap());
    assert_eq!(change.key().cloned(), key("id|9"));
    assert!(writer.store().is_empty().await);
}

#[tokio::test]
async fn draining_yields_changes_in_chronological_order() {
    let (mut writer, mut change) = setup();
    writer.insert("dummy_table", "id|1").await;
    writer.update("left_table", "id|4", "id|5").await;
    writer.delete("dummy_table", "id|1").await;
    writer.delete("scanner_records", "id|3").await;
    writer.insert("dummy_table", "id|2").await;

    let mut drained = Vec::new();
    while change.load_oldest().await.unwrap() {
        drained.push((
            change.table().map(str::to_owned),
            change.change_type(),
            change.current_key().map(CompositeKey::serialize),
        ));
    }

    assert_eq!(
        drained,
        vec![
            (Some("left_table".to_owned()), Some(ChangeType::Update), Some("id|5".to_owned())),
            (Some("scanner_records".to_owned()), Some(ChangeType::Delete), Some("id|3".to_owned())),
            (Some("dummy_table".to_owned()), Some(ChangeType::Insert), Some("id|2".to_owned())),
        ]
    );
    assert!(writer.store().is_empty().await);
}

#[tokio::test]
async fn load_oldest_fails_for_tables_without_primary_key_configuration() {
    let (mut writer, mut change) = setup();
    writer.insert("unknown_table", "id|1").await;

    let err = change.load_oldest().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert_eq!(writer.store().len().await, 1);
}
