// One-shot reconciliation between the device-local store and the remote
// library, run on sign-in. Last-write-wins by timestamp per item; the local
// bookmark list and the remote bookmarked set are unioned.

use std::collections::HashSet;

use uuid::Uuid;

use crate::{
    domain::models::{LibraryRow, LibraryUpsert, ProgressRecord},
    library_client::RemoteLibrary,
    store::ProgressStore,
};

/// Counts for logging and assertions; the pass itself is best-effort beyond
/// the initial fetch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Remote records written into local storage.
    pub pulled: usize,
    /// Local records or bookmarks pushed to the remote table.
    pub pushed: usize,
    /// Remote bookmarks appended to the local list.
    pub bookmarks_merged: usize,
    /// Individual upserts that failed and were skipped.
    pub push_failures: usize,
}

/// Merge local and remote state for the given user.
///
/// A failure of the initial row fetch aborts the whole pass with an error and
/// writes nothing; local state stays authoritative until the next sign-in.
/// Individual upsert failures are logged and do not stop the remaining steps.
#[tracing::instrument(level = "debug", skip(store, remote))]
pub async fn reconcile(
    store: &ProgressStore,
    remote: &dyn RemoteLibrary,
    user_id: Uuid,
) -> anyhow::Result<ReconcileOutcome> {
    use anyhow::Context;

    let rows = remote
        .select_all(user_id)
        .await
        .context("failed to fetch user library rows")?;
    let local = store.list_all().await?;
    let remote_ids: HashSet<&str> = rows.iter().map(|row| row.content_id.as_str()).collect();

    let mut outcome = ReconcileOutcome::default();

    // Per-item merge for rows that carry a progress payload.
    for row in &rows {
        let Some(remote_progress) = &row.progress else {
            continue;
        };
        match local.get(&row.content_id) {
            Some(local_record) if local_wins(local_record, row) => {
                // Remote catches up; local storage is not touched.
                push(
                    remote,
                    user_id,
                    LibraryUpsert::set_progress(local_record.clone()),
                    &mut outcome,
                )
                .await;
            }
            _ => {
                store.put(&row.content_id, remote_progress).await?;
                outcome.pulled += 1;
            }
        }
    }

    // Progress made offline or before sign-in, never seen by the remote table.
    for (item_id, record) in &local {
        if !remote_ids.contains(item_id.as_str()) {
            push(
                remote,
                user_id,
                LibraryUpsert::set_progress(record.clone()),
                &mut outcome,
            )
            .await;
        }
    }

    let local_list = store.get_list().await?;
    for item_id in &local_list {
        if !remote_ids.contains(item_id.as_str()) {
            push(
                remote,
                user_id,
                LibraryUpsert::bookmark(item_id.clone(), true),
                &mut outcome,
            )
            .await;
        }
    }

    // Union: local order is preserved, remote-only bookmarks are appended.
    // Remote never removes a local bookmark during this pass.
    let mut merged = local_list.clone();
    for row in &rows {
        if row.is_bookmarked && !merged.iter().any(|id| id == &row.content_id) {
            merged.push(row.content_id.clone());
            outcome.bookmarks_merged += 1;
        }
    }
    if merged != local_list {
        store.set_list(&merged).await?;
    }

    tracing::info!(
        pulled = outcome.pulled,
        pushed = outcome.pushed,
        bookmarks_merged = outcome.bookmarks_merged,
        push_failures = outcome.push_failures,
        "library reconciliation finished"
    );
    Ok(outcome)
}

/// Local wins only with a strictly newer timestamp, or when the remote row has
/// no timestamp at all to compare against. A local record without a timestamp
/// has nothing meaningful to lose and defers to remote.
fn local_wins(local: &ProgressRecord, row: &LibraryRow) -> bool {
    match (local.last_read_at, row.last_interacted_at) {
        (Some(local_at), Some(remote_at)) => local_at > remote_at,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

async fn push(
    remote: &dyn RemoteLibrary,
    user_id: Uuid,
    patch: LibraryUpsert,
    outcome: &mut ReconcileOutcome,
) {
    let content_id = patch.content_id.clone();
    match remote.upsert(user_id, patch).await {
        Ok(()) => outcome.pushed += 1,
        Err(err) => {
            tracing::warn!(error = %err, %content_id, "library upsert failed; continuing");
            outcome.push_failures += 1;
        }
    }
}
