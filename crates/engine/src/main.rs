//! Wayfinder Engine - real-time experience server for location-based AR play
//!
//! The engine is the backend server that:
//! - Accepts authenticated WebSocket connections from AR clients
//! - Streams each player a version-tracked projection of the game world
//! - Routes actions to fast in-process handlers or the external interpreter
//! - Owns the persisted world and player-view documents

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wayfinder_engine::api;
use wayfinder_engine::app::App;
use wayfinder_engine::infrastructure::auth::JwtAuthenticator;
use wayfinder_engine::infrastructure::bus::InMemoryBus;
use wayfinder_engine::infrastructure::clock::SystemClock;
use wayfinder_engine::infrastructure::config::AppConfig;
use wayfinder_engine::infrastructure::interpreter::HttpInterpreter;
use wayfinder_engine::infrastructure::ports::InterpreterPort;
use wayfinder_engine::infrastructure::store::FsDocumentStore;
use wayfinder_engine::infrastructure::templates::FsTemplateSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wayfinder_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Wayfinder Engine");

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Content root: {}", config.content_root.display());
    match &config.interpreter.url {
        Some(url) => tracing::info!("  Interpreter: {url}"),
        None => tracing::info!("  Interpreter: disabled (unknown actions -> not_implemented)"),
    }

    // Wire up infrastructure adapters
    let store = Arc::new(FsDocumentStore::new(config.content_root.clone()));
    let bus = Arc::new(InMemoryBus::new());
    let templates = Arc::new(FsTemplateSource::new(config.content_root.clone()));
    let auth = Arc::new(JwtAuthenticator::new(&config.auth_secret));
    let interpreter: Option<Arc<dyn InterpreterPort>> = match &config.interpreter.url {
        Some(url) => Some(Arc::new(
            HttpInterpreter::new(
                url.clone(),
                Duration::from_secs(config.interpreter.timeout_seconds),
            )
            .map_err(|e| anyhow::anyhow!("interpreter client: {e}"))?,
        )),
        None => None,
    };

    let server_port = config.server_port;
    let cors = cors_layer(&config.cors_allowed_origins)?;

    let app = Arc::new(App::new(
        config,
        store,
        bus,
        templates,
        interpreter,
        auth,
        Arc::new(SystemClock::new()),
    ));
    tracing::info!("Application state initialized");

    // Build the router
    let router = api::router(app)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], server_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, router);

    // Run until the process is told to stop
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn cors_layer(allowed_origins: &[String]) -> anyhow::Result<CorsLayer> {
    if allowed_origins.iter().any(|origin| origin == "*") {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }
    let origins = allowed_origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any))
}
