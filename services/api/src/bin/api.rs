//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, FileKv, OpenAiFeedbackAdapter, UnconfiguredOracle},
    config::Config,
    error::ApiError,
    web::{build_router, rest::ApiDoc, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use case_tutor_core::{
    ports::{FeedbackOracle, RemoteStore},
    store::DualModeStore,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Storage Tiers ---
    // The remote tier is optional: any failure here leaves the service on the local mirror.
    let remote: Option<Arc<dyn RemoteStore>> = match &config.remote {
        Some(settings) => match DbAdapter::connect(settings).await {
            Ok(adapter) => Some(Arc::new(adapter)),
            Err(e) => {
                warn!("Remote database unavailable, running local-only: {}", e);
                None
            }
        },
        None => {
            info!("DATABASE_URL not set, running local-only.");
            None
        }
    };
    let local = FileKv::open(&config.local_store_path).await?;
    info!("Local mirror at {}", local.root().display());
    let store = Arc::new(DualModeStore::new(remote, Arc::new(local)));
    if store.is_remote_enabled() {
        info!("Storage: remote database with local mirror fallback.");
    } else {
        warn!("Storage: local mirror only; data is not shared between devices.");
    }

    // --- 3. Initialize the Feedback Oracle ---
    let oracle: Arc<dyn FeedbackOracle> = match &config.openai_api_key {
        Some(key) => {
            let openai_client = Client::with_config(OpenAIConfig::new().with_api_key(key));
            Arc::new(OpenAiFeedbackAdapter::new(
                openai_client,
                config.feedback_model.clone(),
            ))
        }
        None => {
            warn!("OPENAI_API_KEY not set; every answer will receive degraded feedback.");
            Arc::new(UnconfiguredOracle)
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(store, oracle, config.clone()));

    let allowed_origin = config.allowed_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!(
            "Invalid ALLOWED_ORIGIN '{}': {}",
            config.allowed_origin, e
        ))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(build_router(app_state))
        .layer(cors)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutdown signal received.");
            shutdown.cancel();
        }
    });

    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Server stopped.");
    Ok(())
}
