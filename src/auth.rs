// Session identity provider: current user plus a change stream. The session
// layer only depends on "is a user signed in" and on sign-in/sign-out edges.

use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

#[derive(Clone)]
pub struct AuthHandle {
    state: Arc<watch::Sender<Option<Uuid>>>,
}

impl AuthHandle {
    /// Starts signed out.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        AuthHandle {
            state: Arc::new(tx),
        }
    }

    pub fn sign_in(&self, user_id: Uuid) {
        tracing::info!(%user_id, "user signed in");
        self.state.send_replace(Some(user_id));
    }

    pub fn sign_out(&self) {
        tracing::info!("user signed out");
        self.state.send_replace(None);
    }

    pub fn current(&self) -> Option<Uuid> {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Uuid>> {
        self.state.subscribe()
    }
}

impl Default for AuthHandle {
    fn default() -> Self {
        AuthHandle::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_signed_out_and_tracks_changes() {
        let auth = AuthHandle::new();
        assert!(auth.current().is_none());

        let user_id = Uuid::new_v4();
        auth.sign_in(user_id);
        assert_eq!(auth.current(), Some(user_id));

        auth.sign_out();
        assert!(auth.current().is_none());
    }

    #[tokio::test]
    async fn subscribers_see_sign_in_edges() {
        let auth = AuthHandle::new();
        let mut rx = auth.subscribe();

        let user_id = Uuid::new_v4();
        auth.sign_in(user_id);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(user_id));
    }
}
