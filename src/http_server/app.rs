use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{delete, get, post, put},
};
use color_eyre::eyre::{Context, eyre};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
#[cfg(not(debug_assertions))]
use tower_http::cors::{AllowMethods, AllowOrigin};
use tower_http::trace::TraceLayer;

use crate::{
    config::Config,
    database::Database,
    http_server::{routes, state::AppState},
    providers::ProviderRegistry,
};

async fn root() -> &'static str {
    "Hello, World!"
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub struct HttpServerConfig {
    pub port: u16,
    pub database: Database,
    pub config: Config,
}

pub async fn start(server_config: HttpServerConfig) -> color_eyre::Result<()> {
    let registry = ProviderRegistry::from_config(&server_config.config);
    if registry.kinds().is_empty() {
        log::warn!("No music providers configured; import/export will be unavailable");
    }

    let app_state = Arc::new(AppState::new(
        server_config.database,
        server_config.config,
        registry,
    ));

    #[cfg(debug_assertions)]
    let cors_layer = CorsLayer::permissive();

    #[cfg(not(debug_assertions))]
    // TODO: restrict the origin to the deployed client once it is known
    let cors_layer = CorsLayer::new()
        .allow_methods(AllowMethods::any())
        .allow_origin(AllowOrigin::any());

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/music/search", get(routes::music::search))
        .route("/music/match", post(routes::music::match_song))
        .route("/music/import", post(routes::music::import))
        .route(
            "/playlists",
            get(routes::playlists::list).post(routes::playlists::create),
        )
        .route("/playlists/shared", get(routes::playlists::list_shared))
        .route(
            "/playlists/{id}",
            get(routes::playlists::get)
                .put(routes::playlists::update)
                .delete(routes::playlists::delete),
        )
        .route("/playlists/{id}/share", post(routes::playlists::share))
        .route("/playlists/{id}/export", post(routes::playlists::export))
        .route("/jobs/{id}", get(routes::jobs::get))
        .route("/jobs/{id}/cancel", post(routes::jobs::cancel))
        .route("/notifications", get(routes::notifications::list))
        .route(
            "/notifications/read-all",
            put(routes::notifications::mark_all_read),
        )
        .route(
            "/notifications/{id}/read",
            put(routes::notifications::mark_read),
        )
        .route("/notifications/{id}", delete(routes::notifications::delete))
        .route("/connections", get(routes::connections::list))
        .route(
            "/connections/{provider}",
            post(routes::connections::connect).delete(routes::connections::disconnect),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port))
        .await
        .wrap_err_with(|| eyre!("Failed to bind to port {}", server_config.port))?;
    log::info!("Listening on 0.0.0.0:{}", server_config.port);
    axum::serve(listener, app)
        .await
        .wrap_err("Failed to start HTTP server")?;

    Ok(())
}
