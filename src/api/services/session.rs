use std::sync::Arc;

use poem_openapi::payload::Json;
use uuid::Uuid;

use crate::{
    api::models::{SessionResponseDto, SessionStateDto},
    auth::AuthHandle,
    session::ProgressSession,
};

pub struct SessionService<'a> {
    pub session: &'a Arc<ProgressSession>,
    pub auth: &'a AuthHandle,
}

impl<'a> SessionService<'a> {
    pub fn new(session: &'a Arc<ProgressSession>, auth: &'a AuthHandle) -> Self {
        Self { session, auth }
    }

    fn state(&self) -> SessionResponseDto {
        SessionResponseDto::Ok(Json(SessionStateDto {
            user_id: self.auth.current(),
            reconciled: self.session.has_reconciled(),
        }))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn current(&self) -> SessionResponseDto {
        self.state()
    }

    /// The reconciliation itself runs on the session's auth watcher; the
    /// response reflects whatever state it has reached so far.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn sign_in(&self, user_id: Uuid) -> SessionResponseDto {
        self.auth.sign_in(user_id);
        self.state()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn sign_out(&self) -> SessionResponseDto {
        self.auth.sign_out();
        self.state()
    }
}
