//! Auth route handling
//!
//! `NextAuthHandler` serves the `/api/auth/*` REST surface with the same
//! cookies, token format and response shapes as NextAuth.js, so browser
//! code written against that surface keeps working.

use axum::{
    Json,
    async_trait,
    extract::Request,
    http::{HeaderMap, Method, header::CONTENT_TYPE, request::Parts},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use rand::RngCore;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use super::csrf::CsrfToken;
use super::dispatch::AuthAction;
use super::pages;
use super::provider::{OAuthProvider, ProviderInfo, callback_url};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::metrics::SIGNINS_TOTAL;
use crate::session::token::hex;
use crate::session::{
    Claims, SECURE_SESSION_COOKIE, SESSION_COOKIE, TokenDecoder, TokenEncoder, validate_claims,
};

const MAX_FORM_BYTES: usize = 64 * 1024;
const STATE_MAX_AGE_SECS: i64 = 15 * 60;

/// Handles requests recognized by the auth route dispatcher
#[async_trait]
pub trait AuthHandler: Send + Sync {
    async fn handle(&self, action: AuthAction, request: Request) -> Response;
}

/// Session token codec used by the handler
pub trait SessionCodec: TokenDecoder + TokenEncoder {}

impl<T: TokenDecoder + TokenEncoder> SessionCodec for T {}

/// Cookie names, prefixed when served over HTTPS
#[derive(Debug, Clone)]
struct CookieNames {
    session: &'static str,
    csrf: &'static str,
    callback_url: &'static str,
    state: &'static str,
    secure: bool,
}

impl CookieNames {
    fn new(secure: bool) -> Self {
        if secure {
            Self {
                session: SECURE_SESSION_COOKIE,
                csrf: "__Host-next-auth.csrf-token",
                callback_url: "__Secure-next-auth.callback-url",
                state: "__Secure-next-auth.state",
                secure,
            }
        } else {
            Self {
                session: SESSION_COOKIE,
                csrf: "next-auth.csrf-token",
                callback_url: "next-auth.callback-url",
                state: "next-auth.state",
                secure,
            }
        }
    }
}

/// NextAuth-compatible handler backed by OAuth providers
pub struct NextAuthHandler {
    base_url: String,
    secret: String,
    session_max_age: i64,
    cookies: CookieNames,
    codec: Arc<dyn SessionCodec>,
    providers: Vec<Arc<dyn OAuthProvider>>,
}

impl NextAuthHandler {
    pub fn new(
        config: &AppConfig,
        codec: Arc<dyn SessionCodec>,
        providers: Vec<Arc<dyn OAuthProvider>>,
    ) -> Self {
        Self {
            base_url: config.server.base_url().to_string(),
            secret: config.auth.secret.clone(),
            session_max_age: config.auth.session_max_age,
            cookies: CookieNames::new(config.should_use_secure_cookies()),
            codec,
            providers,
        }
    }

    fn provider(&self, id: &str) -> Option<&Arc<dyn OAuthProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    fn signin_path(&self) -> String {
        format!("{}/api/auth/signin", self.base_url)
    }

    fn cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookies.secure)
            .build()
    }

    fn expiring_cookie(&self, name: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
        let mut cookie = self.cookie(name, value);
        cookie.set_max_age(time::Duration::seconds(max_age_secs));
        cookie
    }

    fn removal_cookie(&self, name: &'static str) -> Cookie<'static> {
        let mut cookie = self.cookie(name, String::new());
        cookie.make_removal();
        cookie
    }

    fn csrf_for(&self, jar: &CookieJar) -> CsrfToken {
        CsrfToken::from_cookie(
            jar.get(self.cookies.csrf).map(|c| c.value()),
            &self.secret,
        )
    }

    fn with_csrf_cookie(&self, jar: CookieJar, csrf: &CsrfToken) -> CookieJar {
        match &csrf.new_cookie {
            Some(value) => jar.add(self.cookie(self.cookies.csrf, value.clone())),
            None => jar,
        }
    }

    /// Resolve a user-supplied redirect target to a same-origin absolute URL
    fn safe_redirect(&self, target: Option<&str>) -> String {
        match target {
            Some(url) if url.starts_with('/') && !url.starts_with("//") => {
                format!("{}{}", self.base_url, url)
            }
            Some(url) if same_origin(url, &self.base_url) => url.to_string(),
            _ => self.base_url.clone(),
        }
    }

    /// GET /api/auth/session
    fn session(&self, headers: &HeaderMap) -> Response {
        let jar = CookieJar::from_headers(headers);
        let Some(token) = jar.get(self.cookies.session).map(|c| c.value().to_owned()) else {
            return Json(json!({})).into_response();
        };

        let session = self
            .codec
            .decode(&token, &self.secret)
            .ok()
            .and_then(|claims| validate_claims(&claims).ok());

        match session {
            Some(session) => Json(session).into_response(),
            None => {
                tracing::debug!("Clearing unusable session cookie");
                let jar = jar.remove(self.removal_cookie(self.cookies.session));
                (jar, Json(json!({}))).into_response()
            }
        }
    }

    /// GET /api/auth/csrf
    fn csrf(&self, headers: &HeaderMap) -> Response {
        let jar = CookieJar::from_headers(headers);
        let csrf = self.csrf_for(&jar);
        let jar = self.with_csrf_cookie(jar, &csrf);
        (jar, Json(json!({ "csrfToken": csrf.token }))).into_response()
    }

    fn provider_infos(&self) -> Vec<ProviderInfo> {
        self.providers
            .iter()
            .map(|p| ProviderInfo::describe(p.as_ref(), &self.base_url))
            .collect()
    }

    /// GET /api/auth/providers
    fn providers(&self) -> Response {
        let map: serde_json::Map<String, Value> = self
            .provider_infos()
            .into_iter()
            .filter_map(|info| Some((info.id.clone(), serde_json::to_value(info).ok()?)))
            .collect();
        Json(Value::Object(map)).into_response()
    }

    /// GET /api/auth/signin
    fn signin_page(&self, parts: &Parts) -> Response {
        let query = query_fields(parts);
        let jar = CookieJar::from_headers(&parts.headers);
        let csrf = self.csrf_for(&jar);
        let callback = self.safe_redirect(query.get("callbackUrl").map(String::as_str));

        let html = pages::signin_page(
            &self.provider_infos(),
            &csrf.token,
            &callback,
            query.get("error").map(String::as_str),
        );

        let jar = self.with_csrf_cookie(jar, &csrf);
        (jar, Html(html)).into_response()
    }

    /// POST /api/auth/signin/<provider>
    async fn start_signin(&self, provider_id: &str, request: Request) -> Result<Response, AppError> {
        let (parts, fields) = read_fields(request).await?;
        let jar = CookieJar::from_headers(&parts.headers);

        if !self
            .csrf_for(&jar)
            .verify(fields.get("csrfToken").map(String::as_str))
        {
            tracing::warn!(provider = provider_id, "Sign-in rejected: CSRF token mismatch");
            return Ok(Redirect::to(&format!("{}?csrf=true", self.signin_path())).into_response());
        }

        let Some(provider) = self.provider(provider_id) else {
            tracing::warn!(provider = provider_id, "Sign-in requested for unknown provider");
            return Ok(
                Redirect::to(&format!("{}?error=OAuthSignin", self.signin_path())).into_response(),
            );
        };

        let mut state_bytes = [0_u8; 32];
        rand::thread_rng().fill_bytes(&mut state_bytes);
        let state = hex(&state_bytes);

        let mut state_claims = Claims::new();
        state_claims.insert("value".to_string(), Value::from(state.clone()));
        let sealed_state = self
            .codec
            .encode(state_claims, &self.secret, STATE_MAX_AGE_SECS)
            .map_err(|e| AppError::Encryption(e.to_string()))?;

        let redirect_uri = callback_url(&self.base_url, provider.id());
        let location = provider.authorization_url(&redirect_uri, &state)?;
        let callback = self.safe_redirect(fields.get("callbackUrl").map(String::as_str));

        let jar = jar
            .add(self.expiring_cookie(self.cookies.state, sealed_state, STATE_MAX_AGE_SECS))
            .add(self.cookie(self.cookies.callback_url, callback));

        tracing::info!(provider = provider.id(), "Redirecting to OAuth provider");

        if fields.get("json").is_some_and(|v| v == "true") {
            return Ok((jar, Json(json!({ "url": location }))).into_response());
        }
        Ok((jar, Redirect::to(&location)).into_response())
    }

    /// GET|POST /api/auth/callback/<provider>
    async fn callback(&self, provider_id: &str, request: Request) -> Response {
        let (parts, _body) = request.into_parts();
        let jar = CookieJar::from_headers(&parts.headers);
        let query = query_fields(&parts);

        match self.complete_signin(provider_id, &jar, &query).await {
            Ok(token) => {
                SIGNINS_TOTAL
                    .with_label_values(&[provider_id, "success"])
                    .inc();
                let target = self.safe_redirect(
                    jar.get(self.cookies.callback_url)
                        .map(|c| c.value().to_owned())
                        .as_deref(),
                );
                let jar = jar
                    .remove(self.removal_cookie(self.cookies.state))
                    .add(self.expiring_cookie(self.cookies.session, token, self.session_max_age));
                (jar, Redirect::to(&target)).into_response()
            }
            Err(CallbackFailure { code, error }) => {
                SIGNINS_TOTAL
                    .with_label_values(&[provider_id, "failure"])
                    .inc();
                tracing::warn!(provider = provider_id, %error, code, "OAuth callback failed");
                let jar = jar.remove(self.removal_cookie(self.cookies.state));
                (
                    jar,
                    Redirect::to(&format!("{}?error={}", self.signin_path(), code)),
                )
                    .into_response()
            }
        }
    }

    async fn complete_signin(
        &self,
        provider_id: &str,
        jar: &CookieJar,
        query: &HashMap<String, String>,
    ) -> Result<String, CallbackFailure> {
        let provider = self
            .provider(provider_id)
            .ok_or_else(|| CallbackFailure::oauth("unknown provider"))?;

        if let Some(error) = query.get("error") {
            return Err(CallbackFailure::oauth(format!("provider returned {error}")));
        }

        let expected_state = jar
            .get(self.cookies.state)
            .and_then(|c| self.codec.decode(c.value(), &self.secret).ok())
            .and_then(|claims| claims.get("value").and_then(Value::as_str).map(str::to_owned))
            .ok_or_else(|| CallbackFailure::oauth("state cookie missing or invalid"))?;
        if query.get("state") != Some(&expected_state) {
            return Err(CallbackFailure::oauth("state mismatch"));
        }

        let code = query
            .get("code")
            .ok_or_else(|| CallbackFailure::oauth("authorization code missing"))?;

        let redirect_uri = callback_url(&self.base_url, provider.id());
        let profile = provider
            .exchange(code, &redirect_uri)
            .await
            .map_err(CallbackFailure::callback)?;

        let mut claims = Claims::new();
        claims.insert("name".to_string(), profile.name.map_or(Value::Null, Value::from));
        claims.insert("email".to_string(), profile.email.map_or(Value::Null, Value::from));
        claims.insert("picture".to_string(), profile.image.map_or(Value::Null, Value::from));
        claims.insert("sub".to_string(), Value::from(profile.id));

        // A token the page loader would reject must not be issued
        validate_claims(&claims).map_err(|errors| CallbackFailure::callback(errors.into()))?;

        self.codec
            .encode(claims, &self.secret, self.session_max_age)
            .map_err(|e| CallbackFailure::callback(AppError::Encryption(e.to_string())))
    }

    /// GET /api/auth/signout
    fn signout_page(&self, headers: &HeaderMap) -> Response {
        let jar = CookieJar::from_headers(headers);
        let csrf = self.csrf_for(&jar);
        let html = pages::signout_page(&format!("{}/api/auth/signout", self.base_url), &csrf.token);
        let jar = self.with_csrf_cookie(jar, &csrf);
        (jar, Html(html)).into_response()
    }

    /// POST /api/auth/signout
    async fn signout(&self, request: Request) -> Result<Response, AppError> {
        let (parts, fields) = read_fields(request).await?;
        let jar = CookieJar::from_headers(&parts.headers);

        if !self
            .csrf_for(&jar)
            .verify(fields.get("csrfToken").map(String::as_str))
        {
            tracing::warn!("Sign-out rejected: CSRF token mismatch");
            return Ok(
                Redirect::to(&format!("{}/api/auth/signout?csrf=true", self.base_url))
                    .into_response(),
            );
        }

        let target = self.safe_redirect(fields.get("callbackUrl").map(String::as_str));
        let jar = jar.remove(self.removal_cookie(self.cookies.session));

        tracing::info!("Session cleared");

        if fields.get("json").is_some_and(|v| v == "true") {
            return Ok((jar, Json(json!({ "url": target }))).into_response());
        }
        Ok((jar, Redirect::to(&target)).into_response())
    }

    /// POST /api/auth/_log
    async fn client_log(&self, request: Request) -> Result<Response, AppError> {
        let (_, fields) = read_fields(request).await?;
        let level = fields.get("level").map(String::as_str).unwrap_or("error");
        let code = fields.get("code").map(String::as_str).unwrap_or("");
        let message = fields.get("message").map(String::as_str).unwrap_or("");

        match level {
            "debug" => tracing::debug!(code, message, "Client auth log"),
            _ => tracing::warn!(level, code, message, "Client auth log"),
        }

        Ok(().into_response())
    }
}

#[async_trait]
impl AuthHandler for NextAuthHandler {
    async fn handle(&self, action: AuthAction, request: Request) -> Response {
        let method = request.method().clone();

        let result = match (&method, action) {
            (&Method::GET, AuthAction::Session) => Ok(self.session(request.headers())),
            (&Method::GET, AuthAction::Csrf) => Ok(self.csrf(request.headers())),
            (&Method::GET, AuthAction::Providers) => Ok(self.providers()),
            (&Method::GET, AuthAction::Signin(None)) => {
                let (parts, _body) = request.into_parts();
                Ok(self.signin_page(&parts))
            }
            (&Method::POST, AuthAction::Signin(Some(provider))) => {
                self.start_signin(&provider, request).await
            }
            (_, AuthAction::Callback(provider)) => Ok(self.callback(&provider, request).await),
            (&Method::GET, AuthAction::Signout) => Ok(self.signout_page(request.headers())),
            (&Method::POST, AuthAction::Signout) => self.signout(request).await,
            (&Method::POST, AuthAction::Log) => self.client_log(request).await,
            _ => Ok(Redirect::to(&self.signin_path()).into_response()),
        };

        result.unwrap_or_else(IntoResponse::into_response)
    }
}

/// Why a callback did not produce a session, with the error code shown on the sign-in page
struct CallbackFailure {
    code: &'static str,
    error: AppError,
}

impl CallbackFailure {
    fn oauth(message: impl Into<String>) -> Self {
        Self {
            code: "OAuthCallback",
            error: AppError::OAuth(message.into()),
        }
    }

    fn callback(error: AppError) -> Self {
        Self {
            code: "Callback",
            error,
        }
    }
}

fn same_origin(url: &str, base_url: &str) -> bool {
    match (url::Url::parse(url), url::Url::parse(base_url)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => false,
    }
}

fn query_fields(parts: &Parts) -> HashMap<String, String> {
    url::form_urlencoded::parse(parts.uri.query().unwrap_or("").as_bytes())
        .into_owned()
        .collect()
}

/// Read a urlencoded or JSON request body into string fields
async fn read_fields(request: Request) -> Result<(Parts, HashMap<String, String>), AppError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let is_json = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    let fields = if is_json {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .map(|(key, value)| match value {
                    Value::String(s) => (key, s),
                    other => (key, other.to_string()),
                })
                .collect(),
            _ => HashMap::new(),
        }
    } else {
        url::form_urlencoded::parse(&bytes).into_owned().collect()
    };

    Ok((parts, fields))
}
