//! Per-request session loading
//!
//! Cookie header → cookie map → token decode → claim validation.
//! Missing input and decode failures mean "no session"; claims that
//! decode but fail validation fail the request.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header::COOKIE, request::Parts},
};
use serde::Serialize;
use std::sync::Arc;

use super::cookie::parse_cookie_header;
use super::schema::{Session, validate_claims};
use super::token::TokenDecoder;
use crate::AppState;
use crate::error::AppError;
use crate::metrics::SESSION_LOADS_TOTAL;

/// Session cookie name
pub const SESSION_COOKIE: &str = "next-auth.session-token";

/// Session cookie name when served over HTTPS
pub const SECURE_SESSION_COOKIE: &str = "__Secure-next-auth.session-token";

/// Render-time payload for the index page
#[derive(Debug, Clone, Serialize)]
pub struct PageData {
    pub session: Option<Session>,
}

/// Loads the current session from request headers
#[derive(Clone)]
pub struct SessionLoader {
    decoder: Arc<dyn TokenDecoder>,
    secret: String,
    cookie_name: &'static str,
}

impl SessionLoader {
    pub fn new(decoder: Arc<dyn TokenDecoder>, secret: impl Into<String>, secure: bool) -> Self {
        Self {
            decoder,
            secret: secret.into(),
            cookie_name: if secure {
                SECURE_SESSION_COOKIE
            } else {
                SESSION_COOKIE
            },
        }
    }

    /// Run the loader state machine against one request's headers
    ///
    /// # Errors
    /// Returns `AppError::InvalidSession` when the token decodes but its
    /// claims fail validation
    pub fn load(&self, headers: &HeaderMap) -> Result<Option<Session>, AppError> {
        // HTTP/2 clients may split cookies across several header fields
        let fields: Vec<&str> = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        if fields.is_empty() {
            SESSION_LOADS_TOTAL.with_label_values(&["no_cookie"]).inc();
            return Ok(None);
        }

        let cookies = parse_cookie_header(&fields.join("; "));
        let Some(token) = cookies
            .get(self.cookie_name)
            .filter(|token| !token.is_empty())
        else {
            SESSION_LOADS_TOTAL.with_label_values(&["no_token"]).inc();
            return Ok(None);
        };

        let claims = match self.decoder.decode(token, &self.secret) {
            Ok(claims) => claims,
            Err(error) => {
                tracing::debug!(%error, "Session token rejected");
                SESSION_LOADS_TOTAL
                    .with_label_values(&["decode_failed"])
                    .inc();
                return Ok(None);
            }
        };

        match validate_claims(&claims) {
            Ok(session) => {
                SESSION_LOADS_TOTAL.with_label_values(&["ok"]).inc();
                Ok(Some(session))
            }
            Err(errors) => {
                tracing::warn!(%errors, "Session claims failed validation");
                SESSION_LOADS_TOTAL.with_label_values(&["invalid"]).inc();
                Err(AppError::InvalidSession(errors))
            }
        }
    }

    /// Load the session and wrap it as the page payload
    pub fn page_data(&self, headers: &HeaderMap) -> Result<PageData, AppError> {
        Ok(PageData {
            session: self.load(headers)?,
        })
    }
}

/// Extractor for the loader-derived session
///
/// `None` when the request carries no usable token; rejects with
/// `AppError::InvalidSession` when the claims are invalid.
#[derive(Debug, Clone)]
pub struct LoadedSession(pub Option<Session>);

#[async_trait]
impl<S> FromRequestParts<S> for LoadedSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<LoadedSession>() {
            return Ok(session.clone());
        }

        let state = AppState::from_ref(state);
        let session = LoadedSession(state.sessions.load(&parts.headers)?);
        parts.extensions.insert(session.clone());

        Ok(session)
    }
}
