//! signin-starter - A server-rendered starter site with NextAuth-compatible sign-in
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    HTTP Layer (Axum)                         │
//! │  - Auth route dispatcher (/api/auth/*)                       │
//! │  - Index page, static assets, 404 page                       │
//! │  - Health and metrics endpoints                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Session Layer                            │
//! │  - Cookie header parsing                                     │
//! │  - Encrypted session token decoding                          │
//! │  - Session claim validation                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     OAuth Providers                          │
//! │  - GitHub                                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `session`: Cookie parsing, token decoding, claim validation, request loader
//! - `auth`: Auth route recognition and the NextAuth-compatible handler
//! - `page`: Server-side page rendering and development reloads
//! - `api`: Operational endpoints (Prometheus)
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod page;
pub mod session;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request; everything behind it is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Page loader session source
    pub sessions: session::SessionLoader,

    /// Handler for recognized `/api/auth/*` routes
    pub auth: Arc<dyn auth::AuthHandler>,

    /// Active page build
    pub build: Arc<page::BuildHandle>,
}

impl AppState {
    /// Initialize application state with the GitHub provider
    ///
    /// # Errors
    /// Returns error if the HTTP client or the page build cannot be created
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("signin-starter/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let github: Arc<dyn auth::OAuthProvider> = Arc::new(auth::GitHubProvider::new(
            &config.auth.github,
            http_client,
        ));

        Self::with_providers(config, vec![github])
    }

    /// Initialize application state with an explicit provider list
    ///
    /// # Errors
    /// Returns error if the page build cannot be loaded
    pub fn with_providers(
        config: config::AppConfig,
        providers: Vec<Arc<dyn auth::OAuthProvider>>,
    ) -> Result<Self, error::AppError> {
        let codec = Arc::new(session::JweSessionCodec::default());
        let secure = config.should_use_secure_cookies();

        let sessions = session::SessionLoader::new(codec.clone(), config.auth.secret.clone(), secure);
        let auth: Arc<dyn auth::AuthHandler> =
            Arc::new(auth::NextAuthHandler::new(&config, codec, providers));

        let build = page::BuildHandle::load(config.page.clone())?;
        tracing::info!(
            template = ?config.page.template,
            secure_cookies = secure,
            "Application state initialized successfully"
        );

        Ok(Self {
            config: Arc::new(config),
            sessions,
            auth,
            build: Arc::new(build),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{
        Router,
        http::{HeaderValue, header::CACHE_CONTROL},
        middleware,
        routing::{any, get},
    };
    use tower::ServiceBuilder;
    use tower_http::{
        compression::CompressionLayer, services::ServeDir, set_header::SetResponseHeaderLayer,
        trace::TraceLayer,
    };

    let public_dir = &state.config.assets.public_dir;

    // Fingerprinted build output never changes under the same name
    let build_assets = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=31536000, immutable"),
        ))
        .service(ServeDir::new(public_dir.join("build")));

    // Also wraps the 404 fallback; `page::not_found` sets `no-store` itself,
    // which `if_not_present` leaves in place
    let public_assets = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=3600"),
        ))
        .service(
            ServeDir::new(public_dir)
                .call_fallback_on_method_not_allowed(true)
                .fallback(any(page::not_found).with_state(state.clone())),
        );

    Router::new()
        .route("/", get(page::index))
        .route("/health", get(health_check))
        .nest_service("/build", build_assets)
        .fallback_service(public_assets)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_dispatch,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
