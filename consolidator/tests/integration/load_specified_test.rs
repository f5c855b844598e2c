use std::collections::HashMap;

use chrono::Duration;
use config::shared::TablesConfig;
use consolidator::change::LoggedChange;
use consolidator::error::ErrorKind;
use consolidator::key::CompositeKey;
use consolidator::store::memory::MemoryChangeLogStore;
use consolidator::test_utils::change_log::{ChangeLogWriter, composite_key_tables, test_tables};
use consolidator::types::{ChangeType, NewChange, ReplicationSide};
use telemetry::init_test_tracing;

fn key(serialized: &str) -> Option<CompositeKey> {
    Some(CompositeKey::parse(serialized).unwrap())
}

fn setup(
    tables: TablesConfig,
) -> (
    ChangeLogWriter<MemoryChangeLogStore>,
    LoggedChange<MemoryChangeLogStore, TablesConfig>,
) {
    let store = MemoryChangeLogStore::new();
    let change = LoggedChange::new(store.clone(), tables, ReplicationSide::Left);

    (ChangeLogWriter::new(store), change)
}

#[tokio::test]
async fn new_change_is_not_loaded() {
    let (_, change) = setup(test_tables());

    assert!(!change.is_loaded());
    assert_eq!(change.side(), ReplicationSide::Left);
    assert_eq!(change.change_type(), None);
    assert_eq!(change.consumed(), 0);
}

#[tokio::test]
async fn load_specified_loads_only_the_specified_change() {
    init_test_tracing();
    let (mut writer, mut change) = setup(test_tables());
    writer.insert("dummy_table", "id|1").await;
    writer.update("wrong_table", "id|2", "id|2").await;
    writer.insert("dummy_table", "id|2").await;

    assert!(change.load_specified("dummy_table", "id|2").await.unwrap());

    assert_eq!(change.table(), Some("dummy_table"));
    assert_eq!(change.change_type(), Some(ChangeType::Insert));
    assert_eq!(change.key().cloned(), key("id|2"));
    assert_eq!(change.new_key(), None);

    let store = writer.store();
    assert_eq!(store.changes_for("dummy_table", "id|1").await.len(), 1);
    assert_eq!(store.changes_for("wrong_table", "id|2").await.len(), 1);
    assert!(store.changes_for("dummy_table", "id|2").await.is_empty());
}

#[tokio::test]
async fn load_specified_accepts_column_values() {
    let (mut writer, mut change) = setup(composite_key_tables());
    writer.insert("scanner_records", "id1|1|id2|2").await;

    let loaded = change
        .load_specified("scanner_records", [("id2", 2), ("id1", 1)])
        .await
        .unwrap();

    assert!(loaded);
    assert_eq!(change.change_type(), Some(ChangeType::Insert));
    assert_eq!(
        change.key().map(CompositeKey::to_map),
        Some(HashMap::from([
            ("id1".to_owned(), "1".to_owned()),
            ("id2".to_owned(), "2".to_owned()),
        ]))
    );
    assert!(writer.store().is_empty().await);
}

#[tokio::test]
async fn load_specified_deletes_the_consumed_changes() {
    let (mut writer, mut change) = setup(test_tables());
    writer.insert("dummy_table", "id|1").await;
    writer.update("dummy_table", "id|1", "id|2").await;
    writer.update("dummy_table", "id|2", "id|3").await;

    assert!(change.load_specified("dummy_table", "id|1").await.unwrap());
    assert_eq!(change.consumed(), 3);
    assert!(writer.store().is_empty().await);

    // A second walk over the same key finds nothing left to consolidate.
    assert!(!change.load_specified("dummy_table", "id|1").await.unwrap());
    assert_eq!(change.consumed(), 0);
}

#[tokio::test]
async fn load_specified_sets_first_and_last_change_times() {
    let (mut writer, mut change) = setup(test_tables());
    let first = writer.now();
    writer.insert("dummy_table", "id|1").await;
    let last = first + Duration::seconds(10);
    writer
        .record_at(NewChange::update("dummy_table", "id|1", "id|1", last))
        .await;

    assert!(change.load_specified("dummy_table", "id|1").await.unwrap());

    assert_eq!(change.first_changed_at(), Some(first));
    assert_eq!(change.last_changed_at(), Some(last));
    assert_eq!(change.change_type(), Some(ChangeType::Insert));
}

#[tokio::test]
async fn load_specified_follows_primary_key_updates() {
    let (mut writer, mut change) = setup(test_tables());
    writer.update("dummy_table", "id|1", "id|2").await;
    writer.update("dummy_table", "id|2", "id|3").await;

    assert!(change.load_specified("dummy_table", "id|1").await.unwrap());

    assert_eq!(change.change_type(), Some(ChangeType::Update));
    assert_eq!(change.key().cloned(), key("id|1"));
    assert_eq!(change.new_key().cloned(), key("id|3"));
}

#[tokio::test]
async fn long_rename_chains_fold_into_one_update() {
    let (mut writer, mut change) = setup(test_tables());
    for id in 1..20 {
        writer
            .update("dummy_table", &format!("id|{id}"), &format!("id|{}", id + 1))
            .await;
    }

    assert!(change.load_specified("dummy_table", "id|1").await.unwrap());

    assert_eq!(change.change_type(), Some(ChangeType::Update));
    assert_eq!(change.new_key().cloned(), key("id|20"));
    assert_eq!(change.consumed(), 19);
}

#[tokio::test]
async fn changes_cancelling_each_other_out_are_consumed() {
    let (mut writer, mut change) = setup(test_tables());
    writer.insert("dummy_table", "id|1").await;
    writer.update("dummy_table", "id|1", "id|2").await;
    writer.delete("dummy_table", "id|2").await;

    assert!(!change.load_specified("dummy_table", "id|1").await.unwrap());

    assert!(!change.is_loaded());
    assert!(writer.store().is_empty().await);
}

#[tokio::test]
async fn insert_then_delete_cancels() {
    let (mut writer, mut change) = setup(test_tables());
    writer.insert("dummy_table", "id|1").await;
    writer.delete("dummy_table", "id|1").await;

    assert!(!change.load_specified("dummy_table", "id|1").await.unwrap());
    assert!(writer.store().is_empty().await);
}

#[tokio::test]
async fn recreated_and_renamed_row_is_an_insert() {
    let (mut writer, mut change) = setup(test_tables());
    writer.insert("dummy_table", "id|1").await;
    writer.delete("dummy_table", "id|1").await;
    writer.insert("dummy_table", "id|1").await;
    writer.update("dummy_table", "id|1", "id|2").await;

    assert!(change.load_specified("dummy_table", "id|1").await.unwrap());

    assert_eq!(change.change_type(), Some(ChangeType::Insert));
    assert_eq!(change.key().cloned(), key("id|2"));
    assert_eq!(change.consumed(), 4);
}

#[tokio::test]
async fn delete_then_insert_is_an_update() {
    let (mut writer, mut change) = setup(test_tables());
    writer.delete("dummy_table", "id|5").await;
    writer.insert("dummy_table", "id|5").await;

    assert!(change.load_specified("dummy_table", "id|5").await.unwrap());

    assert_eq!(change.change_type(), Some(ChangeType::Update));
    assert_eq!(change.key().cloned(), key("id|5"));
    assert_eq!(change.new_key().cloned(), key("id|5"));
}

#[tokio::test]
async fn renamed_then_deleted_row_is_a_delete_of_the_original_key() {
    let (mut writer, mut change) = setup(test_tables());
    writer.update("dummy_table", "id|1", "id|2").await;
    writer.delete("dummy_table", "id|2").await;

    assert!(change.load_specified("dummy_table", "id|1").await.unwrap());

    assert_eq!(change.change_type(), Some(ChangeType::Delete));
    assert_eq!(change.key().cloned(), key("id|1"));
    assert_eq!(change.new_key(), None);
}

#[tokio::test]
async fn changes_at_the_same_time_fold_in_recording_order() {
    let (writer, mut change) = setup(test_tables());
    let at = writer.now();
    writer
        .record_at(NewChange::insert("dummy_table", "id|1", at))
        .await;
    writer
        .record_at(NewChange::delete("dummy_table", "id|1", at))
        .await;
    writer
        .record_at(NewChange::insert("dummy_table", "id|1", at))
        .await;

    assert!(change.load_specified("dummy_table", "id|1").await.unwrap());

    assert_eq!(change.change_type(), Some(ChangeType::Insert));
    assert_eq!(change.first_changed_at(), Some(at));
    assert_eq!(change.last_changed_at(), Some(at));
}

#[tokio::test]
async fn changes_at_other_keys_are_left_untouched() {
    let (mut writer, mut change) = setup(test_tables());
    writer.insert("dummy_table", "id|1").await;
    writer.update("dummy_table", "id|1", "id|2").await;
    writer.insert("dummy_table", "id|1").await;
    writer.insert("dummy_table", "id|3").await;

    assert!(change.load_specified("dummy_table", "id|1").await.unwrap());

    // The walk moved on to `id|2`, so the row recreated at `id|1` afterwards is not part of it.
    assert_eq!(change.key().cloned(), key("id|2"));
    assert_eq!(writer.store().changes_for("dummy_table", "id|1").await.len(), 1);
    assert_eq!(writer.store().changes_for("dummy_table", "id|3").await.len(), 1);
}

#[tokio::test]
async fn load_specified_replaces_the_loaded_change() {
    let (mut writer, mut change) = setup(test_tables());
    writer.insert("dummy_table", "id|1").await;
    writer.delete("left_table", "id|7").await;

    assert!(change.load_specified("dummy_table", "id|1").await.unwrap());
    assert!(change.load_specified("left_table", "id|7").await.unwrap());

    assert_eq!(change.table(), Some("left_table"));
    assert_eq!(change.change_type(), Some(ChangeType::Delete));
    assert_eq!(change.consumed(), 1);
}

#[tokio::test]
async fn unknown_table_is_a_configuration_error() {
    let (mut writer, mut change) = setup(test_tables());
    writer.insert("unknown_table", "id|1").await;

    let err = change
        .load_specified("unknown_table", "id|1")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert_eq!(writer.store().len().await, 1);
}

#[tokio::test]
async fn malformed_key_is_rejected_before_reading() {
    let (mut writer, mut change) = setup(test_tables());
    writer.insert("dummy_table", "id|1").await;

    for malformed in ["id", "id|1|name", "name|1"] {
        let err = change
            .load_specified("dummy_table", malformed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKeyFormat, "key `{malformed}`");
    }
    assert_eq!(writer.store().len().await, 1);
}

#[test]
fn key_to_hash_parses_serialized_keys() {
    let key = LoggedChange::<MemoryChangeLogStore, TablesConfig>::key_to_hash("a|1|b|2").unwrap();

    assert_eq!(
        key.to_map(),
        HashMap::from([
            ("a".to_owned(), "1".to_owned()),
            ("b".to_owned(), "2".to_owned()),
        ])
    );
    assert_eq!(key.iter().collect::<Vec<_>>(), vec![("a", "1"), ("b", "2")]);
}
