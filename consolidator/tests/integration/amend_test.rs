use config::shared::TablesConfig;
use consolidator::change::LoggedChange;
use consolidator::error::ErrorKind;
use consolidator::key::CompositeKey;
use consolidator::store::memory::MemoryChangeLogStore;
use consolidator::test_utils::change_log::{ChangeLogWriter, test_tables};
use consolidator::test_utils::fault_store::{
    ChangeLogMethod, FaultConfig, FaultInjectingChangeLogStore,
};
use consolidator::types::{ChangeType, ReplicationSide};

fn key(serialized: &str) -> Option<CompositeKey> {
    Some(CompositeKey::parse(serialized).unwrap())
}

fn setup() -> (
    ChangeLogWriter<MemoryChangeLogStore>,
    LoggedChange<MemoryChangeLogStore, TablesConfig>,
) {
    let store = MemoryChangeLogStore::new();
    let change = LoggedChange::new(store.clone(), test_tables(), ReplicationSide::Left);

    (ChangeLogWriter::new(store), change)
}

#[tokio::test]
async fn amend_folds_a_later_delete() {
    let (mut writer, mut change) = setup();
    writer.update("left_table", "id|1", "id|1").await;
    assert!(change.load_specified("left_table", "id|1").await.unwrap());

    writer.delete("left_table", "id|1").await;
    assert!(change.amend().await.unwrap());

    assert_eq!(change.table(), Some("left_table"));
    assert_eq!(change.change_type(), Some(ChangeType::Delete));
    assert_eq!(change.key().cloned(), key("id|1"));
    assert_eq!(change.consumed(), 2);
    assert!(writer.store().is_empty().await);
}

#[tokio::test]
async fn amend_follows_primary_key_updates() {
    let (mut writer, mut change) = setup();
    writer.update("left_table", "id|1", "id|2").await;
    assert!(change.load_specified("left_table", "id|1").await.unwrap());
    let first_changed_at = change.first_changed_at();

    let last = writer.now();
    writer.update("left_table", "id|2", "id|3").await;
    assert!(change.amend().await.unwrap());

    assert_eq!(change.change_type(), Some(ChangeType::Update));
    assert_eq!(change.key().cloned(), key("id|1"));
    assert_eq!(change.new_key().cloned(), key("id|3"));
    assert_eq!(change.first_changed_at(), first_changed_at);
    assert_eq!(change.last_changed_at(), Some(last));
}

#[tokio::test]
async fn amend_extends_an_insert() {
    let (mut writer, mut change) = setup();
    writer.insert("dummy_table", "id|1").await;
    assert!(change.load_specified("dummy_table", "id|1").await.unwrap());

    writer.update("dummy_table", "id|1", "id|2").await;
    assert!(change.amend().await.unwrap());

    assert_eq!(change.change_type(), Some(ChangeType::Insert));
    assert_eq!(change.key().cloned(), key("id|2"));
    assert_eq!(change.new_key(), None);
}

#[tokio::test]
async fn amend_turns_a_delete_followed_by_an_insert_into_an_update() {
    let (mut writer, mut change) = setup();
    writer.delete("dummy_table", "id|4").await;
    assert!(change.load_specified("dummy_table", "id|4").await.unwrap());

    writer.insert("dummy_table", "id|4").await;
    assert!(change.amend().await.unwrap());

    assert_eq!(change.change_type(), Some(ChangeType::Update));
    assert_eq!(change.key().cloned(), key("id|4"));
    assert_eq!(change.new_key().cloned(), key("id|4"));
}

#[tokio::test]
async fn amend_unloads_a_change_that_cancels_out() {
    let (mut writer, mut change) = setup();
    writer.insert("dummy_table", "id|1").await;
    assert!(change.load_specified("dummy_table", "id|1").await.unwrap());

    writer.delete("dummy_table", "id|1").await;
    assert!(!change.amend().await.unwrap());

    assert!(!change.is_loaded());
    assert_eq!(change.consumed(), 0);
    assert!(writer.store().is_empty().await);

    let err = change.amend().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn amend_without_new_changes_keeps_the_change() {
    let store =
        FaultInjectingChangeLogStore::wrap(MemoryChangeLogStore::new(), FaultConfig::default());
    let mut writer = ChangeLogWriter::new(store.get_inner().clone());
    writer.update("dummy_table", "id|1", "id|2").await;
    writer.insert("dummy_table", "id|1").await;
    let mut change = LoggedChange::new(store.clone(), test_tables(), ReplicationSide::Left);
    assert!(change.load_specified("dummy_table", "id|1").await.unwrap());
    let loaded = change.change().cloned();

    // The row recreated at the original key is not part of the renamed row's history.
    assert!(change.amend().await.unwrap());

    assert_eq!(change.change().cloned(), loaded);
    assert_eq!(change.consumed(), 1);
    assert_eq!(store.calls(ChangeLogMethod::DeleteChanges).await, 1);
    assert_eq!(store.get_inner().len().await, 1);
}

#[tokio::test]
async fn amend_requires_a_loaded_change() {
    let (_, mut change) = setup();

    let err = change.amend().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
}
