// Session layer over the local store and the remote library: derived lists,
// mutation entry points, pending debounced writes, and the one-shot sign-in
// reconciliation. Everything is scoped to one session instance; there are no
// module-level singletons to reset.

use std::{
    cmp::Ordering as CmpOrdering,
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

use crate::{
    auth::AuthHandle,
    domain::models::{LibraryUpsert, ProgressRecord},
    library_client::RemoteLibrary,
    store::ProgressStore,
    sync,
};

/// Coalescing window for debounced saves. Bursts of reader events inside the
/// window collapse into a single store write.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// Outcome of one fire-and-forget remote push, for telemetry only. Callers
/// must never await these for correctness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    pub content_id: String,
    pub ok: bool,
}

#[derive(Debug, Default, Clone)]
struct DerivedLists {
    in_progress: Vec<String>,
    completed: Vec<String>,
    bookmarks: Vec<String>,
    loaded: bool,
}

pub struct ProgressSession {
    store: Arc<ProgressStore>,
    remote: Arc<dyn RemoteLibrary>,
    auth: AuthHandle,
    derived: RwLock<DerivedLists>,
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
    synced: AtomicBool,
    debounce: Duration,
    push_observer: Mutex<Option<mpsc::UnboundedSender<PushReport>>>,
}

impl ProgressSession {
    pub fn new(
        store: Arc<ProgressStore>,
        remote: Arc<dyn RemoteLibrary>,
        auth: AuthHandle,
    ) -> Arc<Self> {
        Self::with_debounce(store, remote, auth, DEBOUNCE_WINDOW)
    }

    pub fn with_debounce(
        store: Arc<ProgressStore>,
        remote: Arc<dyn RemoteLibrary>,
        auth: AuthHandle,
        debounce: Duration,
    ) -> Arc<Self> {
        Arc::new(ProgressSession {
            store,
            remote,
            auth,
            derived: RwLock::new(DerivedLists::default()),
            pending: Mutex::new(HashMap::new()),
            synced: AtomicBool::new(false),
            debounce,
            push_observer: Mutex::new(None),
        })
    }

    /// Register a telemetry observer for remote push outcomes.
    pub fn set_push_observer(&self, observer: mpsc::UnboundedSender<PushReport>) {
        *lock(&self.push_observer) = Some(observer);
    }

    /// Watch the store change channel and the auth stream. Store changes
    /// recompute the derived lists; a sign-in edge runs the one-shot
    /// reconciliation.
    pub fn spawn_watchers(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        let mut events = session.store.subscribe();
        let mut auth_rx = session.auth.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(key) => {
                            tracing::debug!(?key, "store change received");
                            session.refresh_logged().await;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "store change channel lagged; re-reading");
                            session.refresh_logged().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    changed = auth_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        auth_rx.borrow_and_update();
                        session.handle_auth_change().await;
                    }
                }
            }
        })
    }

    /// React to the current auth state: reconcile once per sign-in, reset the
    /// one-shot flag on sign-out. A failed reconciliation leaves the flag
    /// unset so the next sign-in retries; local state stays authoritative.
    pub async fn handle_auth_change(&self) {
        let Some(user_id) = self.auth.current() else {
            self.synced.store(false, Ordering::SeqCst);
            return;
        };
        if self.synced.load(Ordering::SeqCst) {
            tracing::debug!(%user_id, "library already reconciled this session");
            return;
        }
        match sync::reconcile(&self.store, self.remote.as_ref(), user_id).await {
            Ok(outcome) => {
                self.synced.store(true, Ordering::SeqCst);
                tracing::info!(
                    %user_id,
                    pulled = outcome.pulled,
                    pushed = outcome.pushed,
                    "sign-in reconciliation complete"
                );
                if let Err(err) = self.prune_missing().await {
                    tracing::warn!(error = %err, "content cleanup skipped");
                }
                self.refresh_logged().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "library reconciliation failed; keeping local state");
            }
        }
    }

    pub fn has_reconciled(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// Re-derive all lists from the store.
    pub async fn refresh(&self) -> anyhow::Result<()> {
        let records = self.store.list_all().await?;
        let bookmarks = self.store.get_list().await?;

        let mut in_progress = Vec::new();
        let mut completed = Vec::new();
        for (item_id, record) in records {
            let entry = (item_id, record.last_read_at);
            if record.is_completed {
                completed.push(entry);
            } else {
                in_progress.push(entry);
            }
        }
        sort_recent_first(&mut in_progress);
        sort_recent_first(&mut completed);

        let mut derived = write_lock(&self.derived);
        derived.in_progress = in_progress.into_iter().map(|(id, _)| id).collect();
        derived.completed = completed.into_iter().map(|(id, _)| id).collect();
        derived.bookmarks = bookmarks;
        derived.loaded = true;
        Ok(())
    }

    pub fn in_progress_ids(&self) -> Vec<String> {
        read_lock(&self.derived).in_progress.clone()
    }

    pub fn completed_ids(&self) -> Vec<String> {
        read_lock(&self.derived).completed.clone()
    }

    pub fn bookmarked_ids(&self) -> Vec<String> {
        read_lock(&self.derived).bookmarks.clone()
    }

    pub fn is_loaded(&self) -> bool {
        read_lock(&self.derived).loaded
    }

    pub fn is_bookmarked(&self, item_id: &str) -> bool {
        read_lock(&self.derived)
            .bookmarks
            .iter()
            .any(|id| id == item_id)
    }

    pub async fn get_progress(&self, item_id: &str) -> anyhow::Result<Option<ProgressRecord>> {
        self.store.get(item_id).await
    }

    /// Full-overwrite save: write-through locally, broadcast, push remote.
    /// Supersedes any pending debounced write for the same item.
    pub async fn save_progress(
        &self,
        item_id: &str,
        mut record: ProgressRecord,
    ) -> anyhow::Result<()> {
        record.item_id = item_id.to_string();
        self.cancel_pending(item_id);
        self.store.put(item_id, &record).await?;
        self.refresh().await?;
        self.push_remote(LibraryUpsert::set_progress(record));
        Ok(())
    }

    /// Schedule a save behind the coalescing window. Only one pending write
    /// exists per item id; scheduling a new one cancels the prior task, which
    /// then never fires.
    pub fn save_progress_debounced(self: &Arc<Self>, item_id: &str, mut record: ProgressRecord) {
        record.item_id = item_id.to_string();
        let session = Arc::clone(self);
        let window = self.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let item_id = record.item_id.clone();
            if let Err(err) = session.commit_pending(record).await {
                tracing::warn!(error = %err, %item_id, "debounced save failed");
            }
        });
        if let Some(prior) = lock(&self.pending).insert(item_id.to_string(), task) {
            prior.abort();
        }
    }

    async fn commit_pending(&self, record: ProgressRecord) -> anyhow::Result<()> {
        let item_id = record.item_id.clone();
        self.store.put(&item_id, &record).await?;
        self.refresh().await?;
        self.push_remote(LibraryUpsert::set_progress(record));
        lock(&self.pending).remove(&item_id);
        Ok(())
    }

    /// Delete the local record and push a remote progress clear.
    pub async fn remove_progress(&self, item_id: &str) -> anyhow::Result<()> {
        self.cancel_pending(item_id);
        self.store.remove(item_id).await?;
        self.refresh().await?;
        self.push_remote(LibraryUpsert::clear_progress(item_id));
        Ok(())
    }

    /// Wipe all local progress records. Bookmarks and remote rows are untouched.
    pub async fn clear_history(&self) -> anyhow::Result<usize> {
        for (_, task) in lock(&self.pending).drain() {
            task.abort();
        }
        let cleared = self.store.clear_progress().await?;
        self.refresh().await?;
        Ok(cleared)
    }

    /// Add to the bookmark list (prepends; most-recent-first). Returns false
    /// if the item was already bookmarked.
    pub async fn add_bookmark(&self, item_id: &str) -> anyhow::Result<bool> {
        let list = self.store.get_list().await?;
        if list.iter().any(|id| id == item_id) {
            return Ok(false);
        }
        let mut next = Vec::with_capacity(list.len() + 1);
        next.push(item_id.to_string());
        next.extend(list);
        self.store.set_list(&next).await?;
        self.refresh().await?;
        self.push_remote(LibraryUpsert::bookmark(item_id, true));
        Ok(true)
    }

    /// Remove from the bookmark list. Returns false if the item was absent.
    pub async fn remove_bookmark(&self, item_id: &str) -> anyhow::Result<bool> {
        let list = self.store.get_list().await?;
        let was_present = list.iter().any(|id| id == item_id);
        let next: Vec<String> = list.into_iter().filter(|id| id != item_id).collect();
        self.store.set_list(&next).await?;
        self.refresh().await?;
        self.push_remote(LibraryUpsert::bookmark(item_id, false));
        Ok(was_present)
    }

    /// Flip bookmark membership. Returns the new state.
    pub async fn toggle_bookmark(&self, item_id: &str) -> anyhow::Result<bool> {
        let list = self.store.get_list().await?;
        if list.iter().any(|id| id == item_id) {
            self.remove_bookmark(item_id).await?;
            Ok(false)
        } else {
            self.add_bookmark(item_id).await?;
            Ok(true)
        }
    }

    /// Self-healing cleanup: drop local records whose content item no longer
    /// exists upstream.
    pub async fn prune_missing(&self) -> anyhow::Result<usize> {
        let records = self.store.list_all().await?;
        if records.is_empty() {
            return Ok(0);
        }
        let item_ids: Vec<String> = records.into_keys().collect();
        let existing = self.remote.batch_lookup(&item_ids).await?;
        let mut removed = 0;
        for item_id in item_ids {
            if !existing.contains(&item_id) {
                self.store.remove(&item_id).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "dropped progress for deleted content");
            self.refresh().await?;
        }
        Ok(removed)
    }

    fn cancel_pending(&self, item_id: &str) {
        if let Some(task) = lock(&self.pending).remove(item_id) {
            task.abort();
        }
    }

    /// Fire-and-forget push to the remote table; a no-op without a signed-in
    /// user. Failures are logged and reported to the observer only.
    fn push_remote(&self, patch: LibraryUpsert) {
        let Some(user_id) = self.auth.current() else {
            tracing::debug!(content_id = %patch.content_id, "no active session; skipping library push");
            return;
        };
        let remote = Arc::clone(&self.remote);
        let observer = lock(&self.push_observer).clone();
        tokio::spawn(async move {
            let content_id = patch.content_id.clone();
            let ok = match remote.upsert(user_id, patch).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(error = %err, %content_id, "library push failed");
                    false
                }
            };
            if let Some(observer) = observer {
                let _ = observer.send(PushReport { content_id, ok });
            }
        });
    }

    async fn refresh_logged(&self) {
        if let Err(err) = self.refresh().await {
            tracing::warn!(error = %err, "failed to refresh derived lists");
        }
    }
}

/// Most recent first; records without a timestamp sort last.
fn sort_recent_first(entries: &mut [(String, Option<DateTime<Utc>>)]) {
    entries.sort_by(|a, b| match (&a.1, &b.1) {
        (Some(left), Some(right)) => right.cmp(left),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    });
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_lock<'a>(lock: &'a RwLock<DerivedLists>) -> std::sync::RwLockReadGuard<'a, DerivedLists> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<'a>(lock: &'a RwLock<DerivedLists>) -> std::sync::RwLockWriteGuard<'a, DerivedLists> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
