//! OAuth provider abstraction

use axum::async_trait;
use serde::Serialize;

use crate::error::AppError;

/// Identity returned by a provider after a successful code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    /// Provider-side user id, stored as the token subject
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

/// An OAuth 2.0 authorization-code provider
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Route segment, e.g. `github`
    fn id(&self) -> &str;

    /// Human readable name, e.g. `GitHub`
    fn name(&self) -> &str;

    /// URL the browser is sent to for consent
    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, AppError>;

    /// Exchange an authorization code for the user's profile
    async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<OAuthProfile, AppError>;
}

/// Public description of a provider, as served by the `providers` route
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub signin_url: String,
    pub callback_url: String,
}

impl ProviderInfo {
    pub fn describe(provider: &dyn OAuthProvider, base_url: &str) -> Self {
        Self {
            id: provider.id().to_string(),
            name: provider.name().to_string(),
            kind: "oauth",
            signin_url: format!("{base_url}/api/auth/signin/{}", provider.id()),
            callback_url: callback_url(base_url, provider.id()),
        }
    }
}

/// Redirect URI registered with the provider
pub fn callback_url(base_url: &str, provider_id: &str) -> String {
    format!("{base_url}/api/auth/callback/{provider_id}")
}
