//! Auth route recognition
//!
//! The accepted action set is spelled out as an enum so it can be audited
//! in one place. Only GET and POST are dispatched; any other request passes
//! through to the rest of the router.

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::metrics::AUTH_ACTIONS_TOTAL;

/// Path prefix of all auth routes
pub const AUTH_PATH_PREFIX: &str = "/api/auth/";

/// A recognized auth route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    /// `session`
    Session,
    /// `signin`, `signin/` or `signin/<provider>`
    Signin(Option<String>),
    /// `signout`
    Signout,
    /// `csrf`
    Csrf,
    /// `providers`
    Providers,
    /// `callback/<provider>`
    Callback(String),
    /// `_log`
    Log,
}

impl AuthAction {
    /// Match a request path against the auth route set
    pub fn from_path(path: &str) -> Option<Self> {
        let rest = path.strip_prefix(AUTH_PATH_PREFIX)?;
        let segments: Vec<&str> = rest.split('/').collect();

        match segments.as_slice() {
            ["session"] => Some(Self::Session),
            ["signin"] | ["signin", ""] => Some(Self::Signin(None)),
            ["signin", provider] if is_provider_id(provider) => {
                Some(Self::Signin(Some((*provider).to_string())))
            }
            ["signout"] => Some(Self::Signout),
            ["csrf"] => Some(Self::Csrf),
            ["providers"] => Some(Self::Providers),
            ["callback", provider] if is_provider_id(provider) => {
                Some(Self::Callback((*provider).to_string()))
            }
            ["_log"] => Some(Self::Log),
            _ => None,
        }
    }

    /// Match a request; only GET and POST are considered
    pub fn recognize(method: &Method, path: &str) -> Option<Self> {
        if *method != Method::GET && *method != Method::POST {
            return None;
        }
        Self::from_path(path)
    }

    /// Stable label for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Signin(_) => "signin",
            Self::Signout => "signout",
            Self::Csrf => "csrf",
            Self::Providers => "providers",
            Self::Callback(_) => "callback",
            Self::Log => "_log",
        }
    }
}

fn is_provider_id(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Middleware forwarding recognized auth routes to the configured handler
pub async fn auth_dispatch(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(action) = AuthAction::recognize(request.method(), request.uri().path()) else {
        return next.run(request).await;
    };

    tracing::debug!(
        action = action.name(),
        method = %request.method(),
        "Dispatching auth route"
    );
    AUTH_ACTIONS_TOTAL
        .with_label_values(&[action.name()])
        .inc();

    state.auth.handle(action, request).await
}
