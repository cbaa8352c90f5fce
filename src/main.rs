//! Store Directory
//!
//! A server-rendered store directory with SQLite persistence, Tantivy
//! full-text search and cookie sessions.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod geo;
mod images;
mod models;
mod pages;
mod search;
mod session;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use search::SearchIndex;

/// Largest accepted request body; store forms carry a photo.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<SearchIndex>,
    pub config: Arc<Config>,
    pub sessions: SqliteStore,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting store directory");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Uploads directory: {:?}", config.uploads_dir);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Initialize database and the session table
    let pool = db::init_database(&config.db_path).await?;
    let sessions = session::init_store(&pool).await?;
    let repo = Arc::new(Repository::new(pool));

    tokio::fs::create_dir_all(&config.uploads_dir).await?;

    // Build the search index from the database
    let search = Arc::new(SearchIndex::open(&config.index_path)?);
    tracing::info!("Building search index...");
    let stores = repo.list_all_stores().await?;
    search.rebuild(&stores).await?;

    let state = AppState {
        repo,
        search,
        config: Arc::new(config.clone()),
        sessions,
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let session_layer = session::create_session_layer(state.sessions.clone(), &state.config);

    // JSON API
    let api_routes = Router::new()
        .route("/search", get(api::search_stores))
        .route("/stores/near", get(api::stores_near))
        .route("/stores/{id}/heart", post(api::heart_store));

    // Server-rendered pages
    let page_routes = Router::new()
        // Stores
        .route("/", get(pages::list_stores))
        .route("/stores", get(pages::list_stores))
        .route("/stores/pages/{page}", get(pages::list_stores_page))
        .route("/add", get(pages::add_store_form).post(pages::create_store))
        .route("/add/{id}", post(pages::update_store))
        .route("/stores/{store}/edit", get(pages::edit_store_form))
        .route("/stores/{store}", get(pages::store_page))
        .route("/map", get(pages::map_page))
        .route("/hearts", get(pages::hearted_stores))
        .route("/top", get(pages::top_stores))
        // Tags
        .route("/tags", get(pages::tags_page))
        .route("/tags/{tag}", get(pages::tag_page))
        // Reviews
        .route("/reviews/{store}", post(pages::add_review))
        // Users
        .route("/login", get(pages::login_form).post(pages::login))
        .route("/register", get(pages::register_form).post(pages::register))
        .route("/logout", get(pages::logout))
        .route("/account", get(pages::account_form).post(pages::update_account))
        .route("/account/forgot", post(pages::forgot_password))
        .route(
            "/account/reset/{token}",
            get(pages::reset_form).post(pages::reset_password),
        );

    // Health check
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(page_routes)
        .nest("/api", api_routes)
        .merge(health_routes)
        .nest_service("/uploads", ServeDir::new(&state.config.uploads_dir))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(errors::render_error_pages))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(session_layer),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

/// Resolve when the process receives Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down");
}
