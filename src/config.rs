use anyhow::Context;
use uuid::Uuid;

#[derive(Debug)]
pub struct Config {
    pub library_api_key: String,
    pub library_base_url: String,
    pub db_connection_string: String,
    pub bind_addr: String,
    /// Optional boot-time identity; when set, the service signs in at startup
    /// and runs the sign-in reconciliation immediately.
    pub session_user_id: Option<Uuid>,
}

const DEFAULT_DB_CONNECTION_STRING: &str = "sqlite://flux.sqlite?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let library_api_key = std::env::var("LIBRARY_API_KEY").unwrap_or_default();
        let library_base_url = std::env::var("LIBRARY_BASE_URL").unwrap_or_default();
        let db_connection_string =
            std::env::var("DB_CONNECTION_STRING").unwrap_or(DEFAULT_DB_CONNECTION_STRING.into());
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or(DEFAULT_BIND_ADDR.into());
        let session_user_id = match std::env::var("SESSION_USER_ID") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                Uuid::parse_str(raw.trim())
                    .with_context(|| format!("Invalid SESSION_USER_ID: {}", raw))?,
            ),
            _ => None,
        };
        Ok(Config {
            library_api_key,
            library_base_url,
            db_connection_string,
            bind_addr,
            session_user_id,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.library_api_key.is_empty() {
            return Err("LIBRARY_API_KEY is missing".into());
        }
        if self.library_base_url.is_empty() {
            return Err("LIBRARY_BASE_URL is missing".into());
        }
        Ok(())
    }
}
