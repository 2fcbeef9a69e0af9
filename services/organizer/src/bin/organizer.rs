//! services/organizer/src/bin/organizer.rs

use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use organizer_lib::{
    adapters::{FirebaseAuthAdapter, FirestoreAdapter, LocalFallbackStore},
    config::Config,
    error::ApiError,
    sync::{Backend, OrganizerSession},
    web::{self, rest::ApiDoc, state::AppState},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;
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
    info!("Configuration loaded. Starting organizer...");

    // --- 2. Choose the Backing Store ---
    let backend = match &config.store {
        Some(store) => {
            info!(
                "Using shared store project '{}' under app '{}'",
                store.project_id, config.app_id
            );
            let client = reqwest::Client::builder().build()?;
            let auth = FirebaseAuthAdapter::new(client.clone(), store.api_key.clone());
            let documents = FirestoreAdapter::new(
                client,
                &store.project_id,
                &config.app_id,
                config.poll_interval,
                auth.id_token(),
            );
            Backend::Remote {
                store: Arc::new(documents),
                auth: Arc::new(auth),
            }
        }
        None => Backend::Local(Arc::new(LocalFallbackStore::new())),
    };

    // --- 3. Establish the Session ---
    let session = OrganizerSession::connect(backend, config.auth_token.as_deref()).await;

    // --- 4. Build the Shared AppState ---
    let shutdown = CancellationToken::new();
    let app_state = Arc::new(AppState {
        config: config.clone(),
        collaborator: session.collaborator().clone(),
        coordinator: session.coordinator(),
        view: session.view(),
        shutdown: shutdown.clone(),
    });

    let ui_origin = config.ui_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid UI_ORIGIN '{}': {}", config.ui_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(ui_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for the shutdown signal: {}", e);
            }
            info!("Shutdown signal received.");
            shutdown.cancel();
        })
        .await?;

    // --- 7. Close the Live Subscriptions ---
    session.shutdown().await;
    info!("Organizer stopped.");
    Ok(())
}
