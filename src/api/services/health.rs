use poem_openapi::payload::PlainText;

use crate::library_client::LibraryClient;

pub struct HealthService<'a> {
    pub client: &'a LibraryClient,
}

impl<'a> HealthService<'a> {
    pub fn new(client: &'a LibraryClient) -> Self {
        Self { client }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn status_text(&self) -> PlainText<String> {
        match self.client.get_status().await {
            Ok(s) => PlainText(format!(
                "library app={} version={}",
                s.app.unwrap_or_default(),
                s.server_version.unwrap_or_default()
            )),
            Err(e) => PlainText(format!("error: {}", e)),
        }
    }
}
