use chrono::{DateTime, Utc};
use poem_openapi::{ApiResponse, Object, payload::Json};
use uuid::Uuid;

use crate::domain::models::ProgressRecord;

#[derive(Debug, Clone, Object)]
pub struct ErrorDto {
    /// Human-readable error message
    pub message: String,
}

impl From<String> for ErrorDto {
    fn from(message: String) -> Self {
        ErrorDto { message }
    }
}

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct ProgressRecordDto {
    pub item_id: String,
    pub completed: Vec<String>,
    pub last_segment_index: i64,
    pub last_read_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub total_segments: Option<i64>,
}

impl From<ProgressRecord> for ProgressRecordDto {
    fn from(record: ProgressRecord) -> Self {
        ProgressRecordDto {
            item_id: record.item_id,
            completed: record.completed_segment_ids.into_iter().collect(),
            last_segment_index: record.last_segment_index,
            last_read_at: record.last_read_at,
            is_completed: record.is_completed,
            total_segments: record.total_segments,
        }
    }
}

/// Save payload; the item id comes from the path.
#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct SaveProgressDto {
    pub completed: Vec<String>,
    pub last_segment_index: i64,
    pub last_read_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub total_segments: Option<i64>,
}

impl SaveProgressDto {
    pub fn into_record(self, item_id: &str) -> ProgressRecord {
        ProgressRecord {
            item_id: item_id.to_string(),
            completed_segment_ids: self.completed.into_iter().collect(),
            last_segment_index: self.last_segment_index,
            last_read_at: self.last_read_at,
            is_completed: self.is_completed,
            total_segments: self.total_segments,
        }
    }
}

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct LibraryListsDto {
    pub in_progress: Vec<String>,
    pub completed: Vec<String>,
    pub bookmarks: Vec<String>,
}

#[derive(Debug, Clone, Object)]
pub struct BookmarkStateDto {
    pub bookmarked: bool,
}

#[derive(Debug, Clone, Object)]
pub struct ClearedDto {
    pub cleared: i64,
}

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct SessionStateDto {
    pub user_id: Option<Uuid>,
    pub reconciled: bool,
}

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct SignInRequestDto {
    pub user_id: Uuid,
}

#[derive(ApiResponse)]
pub enum ProgressListsResponseDto {
    /// Derived lists successfully computed
    #[oai(status = 200)]
    Ok(Json<LibraryListsDto>),

    /// Local store error
    #[oai(status = 500)]
    InternalError(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum ProgressGetResponseDto {
    /// Reading state for the item
    #[oai(status = 200)]
    Ok(Json<ProgressRecordDto>),

    /// No readable record for the item
    #[oai(status = 404)]
    NotFound(Json<ErrorDto>),

    /// Local store error
    #[oai(status = 500)]
    InternalError(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum ProgressPutResponseDto {
    /// Record persisted
    #[oai(status = 200)]
    Ok(Json<ProgressRecordDto>),

    /// Write scheduled behind the coalescing window
    #[oai(status = 202)]
    Accepted,

    /// Local store error
    #[oai(status = 500)]
    InternalError(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum ProgressDeleteResponseDto {
    /// Empty 204 response
    #[oai(status = 204)]
    NoContent,

    /// Local store error
    #[oai(status = 500)]
    InternalError(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum ClearHistoryResponseDto {
    /// Number of records removed
    #[oai(status = 200)]
    Ok(Json<ClearedDto>),

    /// Local store error
    #[oai(status = 500)]
    InternalError(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum BookmarksResponseDto {
    /// Bookmark list, most-recently-added first
    #[oai(status = 200)]
    Ok(Json<Vec<String>>),

    /// Local store error
    #[oai(status = 500)]
    InternalError(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum BookmarkStateResponseDto {
    /// Resulting membership state
    #[oai(status = 200)]
    Ok(Json<BookmarkStateDto>),

    /// Local store error
    #[oai(status = 500)]
    InternalError(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum SessionResponseDto {
    /// Current session state
    #[oai(status = 200)]
    Ok(Json<SessionStateDto>),
}
