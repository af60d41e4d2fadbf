use std::sync::Arc;

use poem_openapi::{
    OpenApi,
    param::{Path, Query},
    payload::{Json, PlainText},
};

use super::models::{
    BookmarkStateResponseDto, BookmarksResponseDto, ClearHistoryResponseDto,
    ProgressDeleteResponseDto, ProgressGetResponseDto, ProgressListsResponseDto,
    ProgressPutResponseDto, SaveProgressDto, SessionResponseDto, SignInRequestDto,
};
use super::services::{
    bookmarks::BookmarkService, health::HealthService, progress::ProgressService,
    session::SessionService,
};
use crate::{auth::AuthHandle, library_client::LibraryClient, session::ProgressSession};

pub struct FluxApi {
    pub session: Arc<ProgressSession>,
    pub client: Arc<LibraryClient>,
    pub auth: AuthHandle,
}

#[OpenApi]
impl FluxApi {
    /// Service and upstream library health
    #[oai(path = "/status", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn status(&self) -> PlainText<String> {
        tracing::debug!("handling /status");
        HealthService::new(&self.client).status_text().await
    }

    /// Derived reading lists: in-progress, completed, bookmarks
    #[oai(path = "/v1/progress", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn progress_lists(&self) -> ProgressListsResponseDto {
        ProgressService::new(&self.session).lists().await
    }

    /// Reading state for a single content item
    #[oai(path = "/v1/progress/:item_id", method = "get")]
    #[tracing::instrument(level = "debug", skip(self, item_id))]
    async fn get_progress(&self, item_id: Path<String>) -> ProgressGetResponseDto {
        ProgressService::new(&self.session).get(&item_id.0).await
    }

    /// Full-overwrite save of reading state
    #[oai(path = "/v1/progress/:item_id", method = "put")]
    #[tracing::instrument(level = "debug", skip(self, item_id, debounce, body))]
    async fn put_progress(
        &self,
        item_id: Path<String>,
        /// Coalesce this write behind the debounce window
        Query(debounce): Query<Option<bool>>,
        body: Json<SaveProgressDto>,
    ) -> ProgressPutResponseDto {
        ProgressService::new(&self.session)
            .save(&item_id.0, body.0, debounce.unwrap_or(false))
            .await
    }

    /// Remove reading state for a single content item
    #[oai(path = "/v1/progress/:item_id", method = "delete")]
    #[tracing::instrument(level = "debug", skip(self, item_id))]
    async fn delete_progress(&self, item_id: Path<String>) -> ProgressDeleteResponseDto {
        ProgressService::new(&self.session).remove(&item_id.0).await
    }

    /// Clear all local reading history
    #[oai(path = "/v1/progress", method = "delete")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn clear_history(&self) -> ClearHistoryResponseDto {
        ProgressService::new(&self.session).clear_history().await
    }

    /// Bookmark list, most-recently-added first
    #[oai(path = "/v1/bookmarks", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_bookmarks(&self) -> BookmarksResponseDto {
        BookmarkService::new(&self.session).list().await
    }

    /// Add a bookmark (idempotent)
    #[oai(path = "/v1/bookmarks/:item_id", method = "put")]
    #[tracing::instrument(level = "debug", skip(self, item_id))]
    async fn add_bookmark(&self, item_id: Path<String>) -> BookmarkStateResponseDto {
        BookmarkService::new(&self.session).add(&item_id.0).await
    }

    /// Remove a bookmark (idempotent)
    #[oai(path = "/v1/bookmarks/:item_id", method = "delete")]
    #[tracing::instrument(level = "debug", skip(self, item_id))]
    async fn remove_bookmark(&self, item_id: Path<String>) -> BookmarkStateResponseDto {
        BookmarkService::new(&self.session).remove(&item_id.0).await
    }

    /// Flip bookmark membership
    #[oai(path = "/v1/bookmarks/:item_id/toggle", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, item_id))]
    async fn toggle_bookmark(&self, item_id: Path<String>) -> BookmarkStateResponseDto {
        BookmarkService::new(&self.session).toggle(&item_id.0).await
    }

    /// Current session state
    #[oai(path = "/v1/session", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn session_state(&self) -> SessionResponseDto {
        SessionService::new(&self.session, &self.auth).current().await
    }

    /// Sign a user in; triggers the one-shot library reconciliation
    #[oai(path = "/v1/session/sign-in", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn sign_in(&self, body: Json<SignInRequestDto>) -> SessionResponseDto {
        SessionService::new(&self.session, &self.auth)
            .sign_in(body.0.user_id)
            .await
    }

    /// Sign the current user out; resets the one-shot reconciliation flag
    #[oai(path = "/v1/session/sign-out", method = "post")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn sign_out(&self) -> SessionResponseDto {
        SessionService::new(&self.session, &self.auth).sign_out().await
    }
}
