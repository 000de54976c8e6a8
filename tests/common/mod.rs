//! Common test utilities for E2E tests

#![allow(dead_code)]

use axum::async_trait;
use serde_json::Value;
use signin_starter::auth::{OAuthProfile, OAuthProvider};
use signin_starter::error::AppError;
use signin_starter::session::{JweSessionCodec, TokenEncoder};
use signin_starter::{AppState, config};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const TEST_SECRET: &str = "test-secret-key-that-is-32-bytes!";
pub const SESSION_COOKIE: &str = "next-auth.session-token";
pub const CSRF_COOKIE: &str = "next-auth.csrf-token";
pub const STATE_COOKIE: &str = "next-auth.state";
pub const CALLBACK_URL_COOKIE: &str = "next-auth.callback-url";

/// Authorization code the fake provider accepts
pub const GOOD_CODE: &str = "good-code";

/// OAuth provider that never leaves the process
pub struct FakeProvider {
    pub profile: OAuthProfile,
}

impl FakeProvider {
    pub fn octocat() -> Self {
        Self {
            profile: OAuthProfile {
                id: "583231".to_string(),
                name: Some("The Octocat".to_string()),
                email: Some("octocat@github.com".to_string()),
                image: Some("https://avatars.githubusercontent.com/u/583231".to_string()),
            },
        }
    }
}

#[async_trait]
impl OAuthProvider for FakeProvider {
    fn id(&self) -> &str {
        "github"
    }

    fn name(&self) -> &str {
        "GitHub"
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, AppError> {
        Ok(format!(
            "https://provider.test/authorize?redirect_uri={}&state={}",
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state)
        ))
    }

    async fn exchange(&self, code: &str, _redirect_uri: &str) -> Result<OAuthProfile, AppError> {
        if code == GOOD_CODE {
            Ok(self.profile.clone())
        } else {
            Err(AppError::OAuth("bad verification code".to_string()))
        }
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    /// Client that does not follow redirects
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_provider(FakeProvider::octocat()).await
    }

    /// Create a test server backed by the given fake provider
    pub async fn with_provider(provider: FakeProvider) -> Self {
        // Static assets live in a temporary public directory
        let temp_dir = TempDir::new().unwrap();
        let public_dir = temp_dir.path().join("public");
        std::fs::create_dir_all(public_dir.join("build")).unwrap();
        std::fs::write(public_dir.join("styles.css"), "body { margin: 0; }").unwrap();
        std::fs::write(public_dir.join("build/entry.abc123.js"), "console.log(1);").unwrap();

        // Bind to random port first so the public URL is known
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: addr.port(),
                public_url: addr_str.clone(),
            },
            auth: config::AuthConfig {
                secret: TEST_SECRET.to_string(),
                session_max_age: 2_592_000,
                github: config::GitHubOAuthConfig {
                    client_id: "test-client-id".to_string(),
                    client_secret: "test-client-secret".to_string(),
                },
            },
            assets: config::AssetsConfig { public_dir },
            page: config::PageConfig {
                template: None,
                title: "New App".to_string(),
                description: "Welcome!".to_string(),
            },
            mode: config::RunMode::Production,
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        signin_starter::metrics::init_metrics();
        let state = AppState::with_providers(config, vec![Arc::new(provider)]).unwrap();

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let app = signin_starter::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Mint a session token the server accepts
    pub fn session_token(&self, claims: Value) -> String {
        let claims = claims.as_object().cloned().expect("claims must be an object");
        JweSessionCodec::default()
            .encode(claims, TEST_SECRET, 3600)
            .expect("Failed to create test token")
    }

    /// Fetch a CSRF token and the cookie that backs it
    pub async fn csrf(&self) -> (String, String) {
        let response = self
            .client
            .get(self.url("/api/auth/csrf"))
            .send()
            .await
            .unwrap();
        let cookie = set_cookie_value(&response, CSRF_COOKIE).expect("csrf cookie");
        let body: Value = response.json().await.unwrap();
        let token = body["csrfToken"].as_str().unwrap().to_string();
        (token, cookie)
    }
}

/// Value of the named cookie in the response's `Set-Cookie` headers
pub fn set_cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    set_cookie_header(response, name).and_then(|header| {
        header
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, value)| value.to_string())
    })
}

/// Full `Set-Cookie` header for the named cookie
pub fn set_cookie_header(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

/// `Location` header of a redirect response
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}
