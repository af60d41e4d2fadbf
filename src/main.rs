mod api;
mod auth;
mod config;
mod domain;
mod library_client;
mod session;
mod store;
mod sync;

use std::{path::Path, sync::Arc};

use anyhow::Context;
use api::FluxApi;
use auth::AuthHandle;
use config::Config;
use library_client::{LibraryClient, RemoteLibrary};
use migration::MigratorTrait;
use poem::{
    EndpointExt, Route, Server,
    listener::TcpListener,
    middleware::{Cors, Tracing as PoemTracing},
};
use poem_openapi::OpenApiService;
use sea_orm::Database;
use session::ProgressSession;
use store::ProgressStore;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt::SubscriberBuilder, prelude::*};

type FluxSyncResult<T> = anyhow::Result<T>;

#[tokio::main]
async fn main() -> FluxSyncResult<()> {
    // Initialize tracing (logs). Respect RUST_LOG if set, default to info for our crate and warn for deps.
    let default_filter = format!(
        "{}=info,poem=info,reqwest=warn,h2=warn",
        env!("CARGO_PKG_NAME")
    );
    let env_filter = std::env::var("RUST_LOG").unwrap_or(default_filter);
    SubscriberBuilder::default()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .with_level(true)
        .pretty()
        .finish()
        .with(ErrorLayer::default())
        .init();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting Flux Sync");
    // Load environment variables from .env files
    if Path::new(".env.local").exists() {
        dotenvy::from_filename(".env.local")?;
    } else if Path::new(".env").exists() {
        dotenvy::from_filename(".env")?;
    };
    let config = Config::load()?;
    match config.validate() {
        Ok(_) => {}
        Err(e) => {
            return Err(anyhow::anyhow!(e));
        }
    }

    let db_conn = Database::connect(&config.db_connection_string)
        .await
        .with_context(|| "Failed to connect to database")?;

    migration::Migrator::up(&db_conn, None)
        .await
        .with_context(|| "Failed to run database migrations")?;

    let client = Arc::new(
        LibraryClient::new(&config.library_base_url)?.with_api_key(&config.library_api_key),
    );
    let has_api_key = !config.library_api_key.is_empty();
    tracing::info!(library_base = %config.library_base_url, has_api_key, "configured library client");

    let store = Arc::new(ProgressStore::new(db_conn));
    let auth = AuthHandle::new();
    let remote: Arc<dyn RemoteLibrary> = client.clone();
    let session = ProgressSession::new(store, remote, auth.clone());
    session.refresh().await?;
    session.spawn_watchers();

    // Boot-time identity: reconciliation runs on the sign-in edge.
    if let Some(user_id) = config.session_user_id {
        auth.sign_in(user_id);
    }

    run_poem(session, client, auth, Arc::new(config)).await?;
    Ok(())
}

pub async fn run_poem(
    session: Arc<ProgressSession>,
    client: Arc<LibraryClient>,
    auth: AuthHandle,
    config: Arc<Config>,
) -> FluxSyncResult<()> {
    let version = env!("CARGO_PKG_VERSION");
    let api = FluxApi {
        session,
        client,
        auth,
    };
    let api_service =
        OpenApiService::new(api, "Flux Sync API", version).server("http://localhost:3000");
    let ui = api_service.rapidoc();
    let spec = api_service.spec();
    let route = Route::new()
        .nest("/", api_service)
        .nest("/ui", ui)
        .nest("/spec", poem::endpoint::make_sync(move |_| spec.clone()))
        .with(Cors::new())
        .with(PoemTracing);

    let bind_addr = config.bind_addr.clone();
    tracing::info!(%bind_addr, "starting HTTP server");
    Server::new(TcpListener::bind(bind_addr)).run(route).await?;
    Ok(())
}
