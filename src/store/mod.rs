// Device-local progress store: one namespaced key/value table holding per-item
// reading state plus the bookmark list, with a change-broadcast channel.

use std::collections::BTreeMap;

use chrono::Utc;
use entities::{LocalRecord, local_record};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    sea_query::OnConflict,
};
use tokio::sync::broadcast;

use crate::domain::{mapping, models::ProgressRecord};

const PROGRESS_PREFIX: &str = "progress:";
const BOOKMARKS_KEY: &str = "bookmarks";

/// Logical resource name carried on the change channel. The signal carries the
/// changed key only, never the value; consumers re-read the store on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKey {
    Progress(String),
    Bookmarks,
}

impl StoreKey {
    pub fn storage_key(&self) -> String {
        match self {
            StoreKey::Progress(item_id) => format!("{PROGRESS_PREFIX}{item_id}"),
            StoreKey::Bookmarks => BOOKMARKS_KEY.to_string(),
        }
    }
}

pub struct ProgressStore {
    db: DatabaseConnection,
    events: broadcast::Sender<StoreKey>,
}

impl ProgressStore {
    pub fn new(db: DatabaseConnection) -> Self {
        let (events, _) = broadcast::channel(64);
        ProgressStore { db, events }
    }

    /// Subscribe to change notifications. Every successful write or delete
    /// publishes the logical key it touched.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreKey> {
        self.events.subscribe()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get(&self, item_id: &str) -> anyhow::Result<Option<ProgressRecord>> {
        let key = StoreKey::Progress(item_id.to_string()).storage_key();
        let Some(raw) = self.read_raw(&key).await? else {
            return Ok(None);
        };
        let record = mapping::parse_progress(item_id, &raw);
        if record.is_none() {
            tracing::warn!(%item_id, "unreadable progress payload; treating as absent");
        }
        Ok(record)
    }

    /// Whole-record overwrite, insert-or-update on the storage key.
    #[tracing::instrument(level = "debug", skip(self, record))]
    pub async fn put(&self, item_id: &str, record: &ProgressRecord) -> anyhow::Result<()> {
        let key = StoreKey::Progress(item_id.to_string());
        self.write_raw(&key.storage_key(), mapping::progress_to_json(record)?)
            .await?;
        self.publish(key);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn remove(&self, item_id: &str) -> anyhow::Result<()> {
        let key = StoreKey::Progress(item_id.to_string());
        LocalRecord::delete_by_id(key.storage_key())
            .exec(&self.db)
            .await?;
        self.publish(key);
        Ok(())
    }

    /// All readable progress records keyed by item id. Malformed entries are
    /// skipped silently.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_all(&self) -> anyhow::Result<BTreeMap<String, ProgressRecord>> {
        let rows = LocalRecord::find()
            .filter(local_record::Column::Key.starts_with(PROGRESS_PREFIX))
            .all(&self.db)
            .await?;

        let mut records = BTreeMap::new();
        for row in rows {
            let Some(item_id) = row.key.strip_prefix(PROGRESS_PREFIX) else {
                continue;
            };
            match mapping::parse_progress(item_id, &row.value) {
                Some(record) => {
                    records.insert(item_id.to_string(), record);
                }
                None => {
                    tracing::warn!(item_id, "skipping unreadable progress payload");
                }
            }
        }
        Ok(records)
    }

    /// Bookmark list, most-recently-added first. Malformed storage reads as empty.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_list(&self) -> anyhow::Result<Vec<String>> {
        let Some(raw) = self.read_raw(BOOKMARKS_KEY).await? else {
            return Ok(Vec::new());
        };
        match mapping::parse_bookmark_list(&raw) {
            Some(ids) => Ok(ids),
            None => {
                tracing::warn!("unreadable bookmark list; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, ids))]
    pub async fn set_list(&self, ids: &[String]) -> anyhow::Result<()> {
        self.write_raw(BOOKMARKS_KEY, mapping::bookmark_list_to_json(ids)?)
            .await?;
        self.publish(StoreKey::Bookmarks);
        Ok(())
    }

    /// Remove every progress record ("clear history"). The bookmark list is
    /// left untouched.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn clear_progress(&self) -> anyhow::Result<usize> {
        let item_ids: Vec<String> = self.list_all().await?.into_keys().collect();
        LocalRecord::delete_many()
            .filter(local_record::Column::Key.starts_with(PROGRESS_PREFIX))
            .exec(&self.db)
            .await?;
        let cleared = item_ids.len();
        for item_id in item_ids {
            self.publish(StoreKey::Progress(item_id));
        }
        Ok(cleared)
    }

    async fn read_raw(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = LocalRecord::find_by_id(key).one(&self.db).await?;
        Ok(row.map(|r| r.value))
    }

    async fn write_raw(&self, key: &str, value: String) -> anyhow::Result<()> {
        let model = local_record::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value),
            updated_at: Set(Utc::now()),
        };
        LocalRecord::insert(model)
            .on_conflict(
                OnConflict::column(local_record::Column::Key)
                    .update_columns([
                        local_record::Column::Value,
                        local_record::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    fn publish(&self, key: StoreKey) {
        // No receivers is fine; the session may not be watching yet.
        let _ = self.events.send(key);
    }
}

#[cfg(test)]
pub(crate) async fn memory_store() -> ProgressStore {
    use migration::MigratorTrait;
    use sea_orm::{ConnectOptions, Database};

    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    ProgressStore::new(db)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn record(item_id: &str) -> ProgressRecord {
        let mut record = ProgressRecord::new(item_id);
        record.completed_segment_ids.insert("seg-1".to_string());
        record.last_segment_index = 0;
        record.last_read_at = Some(Utc::now());
        record
    }

    #[tokio::test]
    async fn get_returns_absent_for_unknown_items() {
        let store = memory_store().await;
        assert!(store.get("never-saved").await.unwrap().is_none());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_then_get_round_trips_and_broadcasts() {
        let store = memory_store().await;
        let mut events = store.subscribe();

        let saved = record("book-1");
        store.put("book-1", &saved).await.unwrap();

        assert_eq!(store.get("book-1").await.unwrap(), Some(saved));
        assert_eq!(
            events.try_recv().unwrap(),
            StoreKey::Progress("book-1".to_string())
        );
    }

    #[tokio::test]
    async fn put_overwrites_whole_record() {
        let store = memory_store().await;
        store.put("book-1", &record("book-1")).await.unwrap();

        let mut replacement = ProgressRecord::new("book-1");
        replacement.is_completed = true;
        store.put("book-1", &replacement).await.unwrap();

        let loaded = store.get("book-1").await.unwrap().unwrap();
        assert!(loaded.is_completed);
        assert!(loaded.completed_segment_ids.is_empty());
    }

    #[tokio::test]
    async fn remove_deletes_and_broadcasts() {
        let store = memory_store().await;
        store.put("book-1", &record("book-1")).await.unwrap();

        let mut events = store.subscribe();
        store.remove("book-1").await.unwrap();

        assert!(store.get("book-1").await.unwrap().is_none());
        assert_eq!(
            events.try_recv().unwrap(),
            StoreKey::Progress("book-1".to_string())
        );
    }

    #[tokio::test]
    async fn corrupt_record_does_not_hide_valid_ones() {
        let store = memory_store().await;
        store.put("book-1", &record("book-1")).await.unwrap();
        store
            .write_raw("progress:book-2", "{{{ not json".to_string())
            .await
            .unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("book-1"));
        assert!(store.get("book-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bookmark_list_round_trips_and_tolerates_corruption() {
        let store = memory_store().await;
        assert!(store.get_list().await.unwrap().is_empty());

        let mut events = store.subscribe();
        let ids = vec!["b".to_string(), "a".to_string()];
        store.set_list(&ids).await.unwrap();
        assert_eq!(store.get_list().await.unwrap(), ids);
        assert_eq!(events.try_recv().unwrap(), StoreKey::Bookmarks);

        store
            .write_raw(BOOKMARKS_KEY, "not a list".to_string())
            .await
            .unwrap();
        assert!(store.get_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_progress_keeps_bookmarks() {
        let store = memory_store().await;
        store.put("book-1", &record("book-1")).await.unwrap();
        store.put("book-2", &record("book-2")).await.unwrap();
        store.set_list(&["book-3".to_string()]).await.unwrap();

        assert_eq!(store.clear_progress().await.unwrap(), 2);
        assert!(store.list_all().await.unwrap().is_empty());
        assert_eq!(store.get_list().await.unwrap(), vec!["book-3"]);
    }
}
