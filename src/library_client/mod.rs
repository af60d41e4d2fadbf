// Client for the hosted library service: user_library rows with composite-key
// upsert semantics, plus the content batch-lookup endpoint.

use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::domain::{
    mapping,
    models::{LibraryRow, LibraryUpsert, ProgressPatch},
};

/// Content batch endpoint accepts at most this many ids per request.
const CONTENT_BATCH_LIMIT: usize = 50;

/// Remote persistence seam the reconciler and session depend on.
#[async_trait::async_trait]
pub trait RemoteLibrary: Send + Sync {
    /// All library rows for the given user.
    async fn select_all(&self, user_id: Uuid) -> anyhow::Result<Vec<LibraryRow>>;

    /// Partial insert-or-update on conflict of (user, content item). Fields
    /// omitted from the patch must not overwrite existing remote values.
    async fn upsert(&self, user_id: Uuid, patch: LibraryUpsert) -> anyhow::Result<()>;

    /// Which of the given content ids still exist.
    async fn batch_lookup(&self, ids: &[String]) -> anyhow::Result<Vec<String>>;
}

#[derive(Clone, Debug)]
pub struct LibraryClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LibraryClient {
    /// Create a new client with the given base URL (e.g. "https://flux.example.com").
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        let base_url_str = base_url.into();
        tracing::debug!(base_url = %base_url_str, "creating LibraryClient");
        Ok(LibraryClient {
            base_url: base_url_str.trim_end_matches('/').to_string(),
            api_key: None,
            client,
        })
    }

    /// Return a client with the provided API key set (Bearer)
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn auth_header(&self) -> Option<(String, String)> {
        self.api_key
            .as_ref()
            .map(|k| ("Authorization".to_string(), format!("Bearer {}", k)))
    }

    /// GET /status (no auth required)
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_status(&self) -> anyhow::Result<StatusResponse> {
        let url = self.url("/status");
        tracing::debug!(%url, "GET status");
        let mut req = self.client.get(&url);
        if let Some((k, v)) = self.auth_header() {
            req = req.header(&k, &v);
        }
        let resp = req.send().await?;
        let status = resp.error_for_status()?;
        let body = status.text().await?;
        let parsed: StatusResponse = serde_json::from_str(&body)?;
        Ok(parsed)
    }
}

#[async_trait::async_trait]
impl RemoteLibrary for LibraryClient {
    /// GET /api/library?userId=...
    #[tracing::instrument(level = "debug", skip(self))]
    async fn select_all(&self, user_id: Uuid) -> anyhow::Result<Vec<LibraryRow>> {
        let url = self.url("/api/library");
        tracing::debug!(%url, %user_id, "GET user library");
        let req = self.client.get(&url);
        let req = if let Some((k, v)) = self.auth_header() {
            req.header(&k, &v)
        } else {
            req
        };
        let req = req.query(&[("userId", user_id.to_string())]);

        let resp = req.send().await?;
        let status = resp.error_for_status()?;
        let body = status.text().await?;
        match serde_json::from_str::<Vec<LibraryRowDto>>(&body) {
            Ok(rows) => Ok(rows.into_iter().map(LibraryRowDto::into_row).collect()),
            Err(e) => {
                let snippet_len = body.len().min(2000);
                let snippet = &body[..snippet_len];
                tracing::error!(error = %e, body_snippet = %snippet, "failed to parse library rows");
                Err(e.into())
            }
        }
    }

    /// POST /api/library/upsert, conflict target (user_id, content_id)
    #[tracing::instrument(level = "debug", skip(self, patch))]
    async fn upsert(&self, user_id: Uuid, patch: LibraryUpsert) -> anyhow::Result<()> {
        let url = self.url("/api/library/upsert");
        tracing::debug!(%url, %user_id, content_id = %patch.content_id, "POST library upsert");
        let body = upsert_body(user_id, &patch)?;
        let req = self.client.post(&url).json(&body);
        let req = if let Some((k, v)) = self.auth_header() {
            req.header(&k, &v)
        } else {
            req
        };
        let resp = req.send().await?;
        resp.error_for_status()?;
        Ok(())
    }

    /// POST /api/content/batch {ids} -> existing items. The endpoint caps each
    /// request at 50 ids, so larger lookups are chunked here.
    #[tracing::instrument(level = "debug", skip(self, ids))]
    async fn batch_lookup(&self, ids: &[String]) -> anyhow::Result<Vec<String>> {
        let url = self.url("/api/content/batch");
        let mut existing = Vec::new();
        for chunk in ids.chunks(CONTENT_BATCH_LIMIT) {
            tracing::debug!(%url, chunk_len = chunk.len(), "POST content batch");
            let req = self.client.post(&url).json(&json!({ "ids": chunk }));
            let req = if let Some((k, v)) = self.auth_header() {
                req.header(&k, &v)
            } else {
                req
            };
            let resp = req.send().await?;
            let status = resp.error_for_status()?;
            let body = status.text().await?;
            let items: Vec<ContentItemDto> = serde_json::from_str(&body)?;
            existing.extend(items.into_iter().map(|item| item.id));
        }
        Ok(existing)
    }
}

/// Build the upsert body. Untouched fields are omitted entirely; a progress
/// clear is an explicit JSON null (distinct from omission).
fn upsert_body(user_id: Uuid, patch: &LibraryUpsert) -> anyhow::Result<Value> {
    let mut body = serde_json::Map::new();
    body.insert("userId".to_string(), json!(user_id));
    body.insert("contentId".to_string(), json!(patch.content_id));
    if let Some(bookmarked) = patch.is_bookmarked {
        body.insert("isBookmarked".to_string(), json!(bookmarked));
    }
    match &patch.progress {
        Some(ProgressPatch::Set(record)) => {
            body.insert("progress".to_string(), serde_json::to_value(record)?);
        }
        Some(ProgressPatch::Clear) => {
            body.insert("progress".to_string(), Value::Null);
        }
        None => {}
    }
    body.insert(
        "lastInteractedAt".to_string(),
        json!(patch.last_interacted_at),
    );
    Ok(Value::Object(body))
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub app: Option<String>,
    #[serde(rename = "serverVersion")]
    pub server_version: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LibraryRowDto {
    pub content_id: String,
    #[serde(default)]
    pub is_bookmarked: bool,
    /// Raw progress payload; decoded tolerantly so one bad row does not fail
    /// the whole fetch.
    #[serde(default)]
    pub progress: Option<Value>,
    #[serde(default)]
    pub last_interacted_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, Value>,
}

impl LibraryRowDto {
    fn into_row(self) -> LibraryRow {
        let progress = self
            .progress
            .as_ref()
            .and_then(|value| mapping::parse_progress_value(&self.content_id, value));
        LibraryRow {
            content_id: self.content_id,
            is_bookmarked: self.is_bookmarked,
            progress,
            last_interacted_at: self.last_interacted_at,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct ContentItemDto {
    pub id: String,
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, Value>,
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use uuid::Uuid;

    use super::RemoteLibrary;
    use crate::domain::models::{LibraryRow, LibraryUpsert};

    /// Scripted in-memory remote for reconciler and session tests.
    #[derive(Default)]
    pub struct MockRemote {
        pub rows: Mutex<Vec<LibraryRow>>,
        pub upserts: Mutex<Vec<(Uuid, LibraryUpsert)>>,
        /// None means every looked-up content id still exists.
        pub existing: Mutex<Option<Vec<String>>>,
        pub fail_select: AtomicBool,
        pub fail_upserts: AtomicBool,
        pub select_calls: AtomicUsize,
    }

    impl MockRemote {
        pub fn empty() -> Arc<Self> {
            Arc::new(MockRemote::default())
        }

        pub fn with_rows(rows: Vec<LibraryRow>) -> Arc<Self> {
            let mock = MockRemote::default();
            *mock.rows.lock().unwrap() = rows;
            Arc::new(mock)
        }

        pub fn recorded_upserts(&self) -> Vec<(Uuid, LibraryUpsert)> {
            self.upserts.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl RemoteLibrary for MockRemote {
        async fn select_all(&self, _user_id: Uuid) -> anyhow::Result<Vec<LibraryRow>> {
            self.select_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_select.load(Ordering::SeqCst) {
                anyhow::bail!("library fetch refused");
            }
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn upsert(&self, user_id: Uuid, patch: LibraryUpsert) -> anyhow::Result<()> {
            if self.fail_upserts.load(Ordering::SeqCst) {
                anyhow::bail!("library upsert refused");
            }
            self.upserts.lock().unwrap().push((user_id, patch));
            Ok(())
        }

        async fn batch_lookup(&self, ids: &[String]) -> anyhow::Result<Vec<String>> {
            match self.existing.lock().unwrap().as_ref() {
                None => Ok(ids.to_vec()),
                Some(existing) => Ok(ids
                    .iter()
                    .filter(|id| existing.contains(id))
                    .cloned()
                    .collect()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::models::ProgressRecord;

    #[test]
    fn status_deserialize() {
        let json = r#"{ "app": "flux", "serverVersion": "1.4.2" }"#;
        let s: StatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(s.app.unwrap(), "flux");
        assert_eq!(s.server_version.unwrap(), "1.4.2");
    }

    #[test]
    fn library_rows_deserialize_example() {
        let json = r#"
            [
                {
                    "contentId": "book-1",
                    "isBookmarked": true,
                    "progress": null,
                    "lastInteractedAt": "2024-03-01T08:00:00Z"
                },
                {
                    "contentId": "book-2",
                    "isBookmarked": false,
                    "progress": {
                        "itemId": "book-2",
                        "completed": ["seg-1"],
                        "lastSegmentIndex": 1,
                        "lastReadAt": "2024-02-28T21:15:00Z",
                        "isCompleted": false
                    },
                    "lastInteractedAt": "2024-02-28T21:15:00Z",
                    "userId": "ignored-extra-field"
                }
            ]
        "#;

        let rows: Vec<LibraryRow> = serde_json::from_str::<Vec<LibraryRowDto>>(json)
            .unwrap()
            .into_iter()
            .map(LibraryRowDto::into_row)
            .collect();

        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_bookmarked);
        assert!(rows[0].progress.is_none());
        let progress = rows[1].progress.as_ref().unwrap();
        assert_eq!(progress.item_id, "book-2");
        assert!(progress.completed_segment_ids.contains("seg-1"));
        assert_eq!(
            rows[1].last_interacted_at,
            Some(Utc.with_ymd_and_hms(2024, 2, 28, 21, 15, 0).unwrap())
        );
    }

    #[test]
    fn corrupt_progress_payload_keeps_the_row() {
        let json = r#"[{ "contentId": "book-3", "isBookmarked": true, "progress": "garbage" }]"#;
        let rows: Vec<LibraryRowDto> = serde_json::from_str(json).unwrap();
        let row = rows.into_iter().next().unwrap().into_row();
        assert_eq!(row.content_id, "book-3");
        assert!(row.is_bookmarked);
        assert!(row.progress.is_none());
    }

    #[test]
    fn upsert_body_omits_untouched_fields() {
        let user_id = Uuid::new_v4();
        let body = upsert_body(user_id, &LibraryUpsert::bookmark("book-1", true)).unwrap();

        assert_eq!(body["contentId"], "book-1");
        assert_eq!(body["isBookmarked"], true);
        assert!(body.get("progress").is_none());
        assert!(body.get("lastInteractedAt").is_some());
    }

    #[test]
    fn upsert_body_clear_is_explicit_null() {
        let user_id = Uuid::new_v4();
        let body = upsert_body(user_id, &LibraryUpsert::clear_progress("book-1")).unwrap();
        assert!(body["progress"].is_null());
        assert!(body.get("isBookmarked").is_none());
    }

    #[test]
    fn upsert_body_serializes_progress_record() {
        let user_id = Uuid::new_v4();
        let mut record = ProgressRecord::new("book-2");
        record.completed_segment_ids.insert("seg-1".to_string());
        record.last_segment_index = 1;
        record.last_read_at = Some(Utc.with_ymd_and_hms(2024, 2, 28, 21, 15, 0).unwrap());
        let body = upsert_body(user_id, &LibraryUpsert::set_progress(record)).unwrap();

        assert_eq!(body["progress"]["itemId"], "book-2");
        assert_eq!(body["progress"]["completed"][0], "seg-1");
        assert_eq!(body["lastInteractedAt"], "2024-02-28T21:15:00Z");
    }
}
