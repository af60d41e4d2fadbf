use std::sync::Arc;

use poem_openapi::payload::Json;

use crate::{
    api::models::{BookmarkStateDto, BookmarkStateResponseDto, BookmarksResponseDto, ErrorDto},
    session::ProgressSession,
};

pub struct BookmarkService<'a> {
    pub session: &'a Arc<ProgressSession>,
}

impl<'a> BookmarkService<'a> {
    pub fn new(session: &'a Arc<ProgressSession>) -> Self {
        Self { session }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list(&self) -> BookmarksResponseDto {
        BookmarksResponseDto::Ok(Json(self.session.bookmarked_ids()))
    }

    #[tracing::instrument(level = "debug", skip(self, item_id))]
    pub async fn add(&self, item_id: &str) -> BookmarkStateResponseDto {
        match self.session.add_bookmark(item_id).await {
            Ok(_) => BookmarkStateResponseDto::Ok(Json(BookmarkStateDto { bookmarked: true })),
            Err(e) => self.store_error(item_id, e),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, item_id))]
    pub async fn remove(&self, item_id: &str) -> BookmarkStateResponseDto {
        match self.session.remove_bookmark(item_id).await {
            Ok(_) => BookmarkStateResponseDto::Ok(Json(BookmarkStateDto { bookmarked: false })),
            Err(e) => self.store_error(item_id, e),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, item_id))]
    pub async fn toggle(&self, item_id: &str) -> BookmarkStateResponseDto {
        match self.session.toggle_bookmark(item_id).await {
            Ok(bookmarked) => {
                BookmarkStateResponseDto::Ok(Json(BookmarkStateDto { bookmarked }))
            }
            Err(e) => self.store_error(item_id, e),
        }
    }

    fn store_error(&self, item_id: &str, e: anyhow::Error) -> BookmarkStateResponseDto {
        tracing::error!(error = %format!("{:?}", e), %item_id, "bookmark mutation failed");
        BookmarkStateResponseDto::InternalError(Json(ErrorDto {
            message: format!("store error: {}", e),
        }))
    }
}
