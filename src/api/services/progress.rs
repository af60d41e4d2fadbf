use std::sync::Arc;

use poem_openapi::payload::Json;

use crate::{
    api::models::{
        ClearHistoryResponseDto, ClearedDto, ErrorDto, LibraryListsDto,
        ProgressDeleteResponseDto, ProgressGetResponseDto, ProgressListsResponseDto,
        ProgressPutResponseDto, SaveProgressDto,
    },
    session::ProgressSession,
};

pub struct ProgressService<'a> {
    pub session: &'a Arc<ProgressSession>,
}

impl<'a> ProgressService<'a> {
    pub fn new(session: &'a Arc<ProgressSession>) -> Self {
        Self { session }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn lists(&self) -> ProgressListsResponseDto {
        if !self.session.is_loaded() {
            if let Err(e) = self.session.refresh().await {
                tracing::error!(error = %format!("{:?}", e), "failed to load derived lists");
                return ProgressListsResponseDto::InternalError(Json(ErrorDto {
                    message: format!("store error: {}", e),
                }));
            }
        }
        ProgressListsResponseDto::Ok(Json(LibraryListsDto {
            in_progress: self.session.in_progress_ids(),
            completed: self.session.completed_ids(),
            bookmarks: self.session.bookmarked_ids(),
        }))
    }

    #[tracing::instrument(level = "debug", skip(self, item_id))]
    pub async fn get(&self, item_id: &str) -> ProgressGetResponseDto {
        match self.session.get_progress(item_id).await {
            Ok(Some(record)) => ProgressGetResponseDto::Ok(Json(record.into())),
            Ok(None) => ProgressGetResponseDto::NotFound(Json(ErrorDto {
                message: format!("no reading state for {}", item_id),
            })),
            Err(e) => {
                tracing::error!(error = %format!("{:?}", e), %item_id, "failed to read progress");
                ProgressGetResponseDto::InternalError(Json(ErrorDto {
                    message: format!("store error: {}", e),
                }))
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, item_id, body))]
    pub async fn save(
        &self,
        item_id: &str,
        body: SaveProgressDto,
        debounce: bool,
    ) -> ProgressPutResponseDto {
        let record = body.into_record(item_id);
        if debounce {
            self.session.save_progress_debounced(item_id, record);
            return ProgressPutResponseDto::Accepted;
        }
        match self.session.save_progress(item_id, record.clone()).await {
            Ok(()) => ProgressPutResponseDto::Ok(Json(record.into())),
            Err(e) => {
                tracing::error!(error = %format!("{:?}", e), %item_id, "failed to save progress");
                ProgressPutResponseDto::InternalError(Json(ErrorDto {
                    message: format!("store error: {}", e),
                }))
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, item_id))]
    pub async fn remove(&self, item_id: &str) -> ProgressDeleteResponseDto {
        match self.session.remove_progress(item_id).await {
            Ok(()) => ProgressDeleteResponseDto::NoContent,
            Err(e) => {
                tracing::error!(error = %format!("{:?}", e), %item_id, "failed to remove progress");
                ProgressDeleteResponseDto::InternalError(Json(ErrorDto {
                    message: format!("store error: {}", e),
                }))
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn clear_history(&self) -> ClearHistoryResponseDto {
        match self.session.clear_history().await {
            Ok(cleared) => ClearHistoryResponseDto::Ok(Json(ClearedDto {
                cleared: cleared as i64,
            })),
            Err(e) => {
                tracing::error!(error = %format!("{:?}", e), "failed to clear history");
                ClearHistoryResponseDto::InternalError(Json(ErrorDto {
                    message: format!("store error: {}", e),
                }))
            }
        }
    }
}
