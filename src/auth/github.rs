//! GitHub OAuth provider
//!
//! Implements the OAuth 2.0 authorization code flow with GitHub.

use axum::async_trait;
use serde::Deserialize;

use super::provider::{OAuthProfile, OAuthProvider};
use crate::config::GitHubOAuthConfig;
use crate::error::AppError;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const API_URL: &str = "https://api.github.com";
const SCOPE: &str = "read:user user:email";

/// GitHub token response
#[derive(Debug, Deserialize)]
struct GitHubTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GitHub user info
#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
    id: u64,
    avatar_url: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

/// Entry of `GET /user/emails`
#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

pub struct GitHubProvider {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
}

impl GitHubProvider {
    pub fn new(config: &GitHubOAuthConfig, http: reqwest::Client) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            http,
        }
    }

    async fn fetch_access_token(&self, code: &str, redirect_uri: &str) -> Result<String, AppError> {
        let response: GitHubTokenResponse = self
            .http
            .post(TOKEN_URL)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match (response.access_token, response.error) {
            (Some(token), None) => Ok(token),
            (_, error) => Err(AppError::OAuth(format!(
                "GitHub token exchange failed: {}",
                response
                    .error_description
                    .or(error)
                    .unwrap_or_else(|| "no access token".to_string())
            ))),
        }
    }

    async fn fetch_user(&self, access_token: &str) -> Result<GitHubUser, AppError> {
        Ok(self
            .http
            .get(format!("{API_URL}/user"))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// Primary verified address, for users whose profile email is private
    async fn fetch_primary_email(&self, access_token: &str) -> Result<Option<String>, AppError> {
        let emails: Vec<GitHubEmail> = self
            .http
            .get(format!("{API_URL}/user/emails"))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email))
    }
}

#[async_trait]
impl OAuthProvider for GitHubProvider {
    fn id(&self) -> &str {
        "github"
    }

    fn name(&self) -> &str {
        "GitHub"
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, AppError> {
        let url = url::Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", SCOPE),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::Internal(e.into()))?;
        Ok(url.into())
    }

    async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<OAuthProfile, AppError> {
        let access_token = self.fetch_access_token(code, redirect_uri).await?;
        let user = self.fetch_user(&access_token).await?;

        let email = match user.email {
            Some(email) => Some(email),
            None => self.fetch_primary_email(&access_token).await?,
        };

        tracing::info!(login = %user.login, id = user.id, "GitHub user authenticated");

        Ok(OAuthProfile {
            id: user.id.to_string(),
            name: user.name.or(Some(user.login)),
            email,
            image: user.avatar_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GitHubProvider {
        GitHubProvider::new(
            &GitHubOAuthConfig {
                client_id: "test-client-id".to_string(),
                client_secret: "test-client-secret".to_string(),
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn authorization_url_carries_client_scope_and_state() {
        let url = provider()
            .authorization_url("http://localhost:3000/api/auth/callback/github", "abc123")
            .unwrap();

        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("client_id=test-client-id"));
        assert!(url.contains("scope=read%3Auser+user%3Aemail"));
        assert!(url.contains("state=abc123"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fapi%2Fauth%2Fcallback%2Fgithub"
        ));
    }

    #[test]
    fn user_payload_without_optional_fields_deserializes() {
        let user: GitHubUser =
            serde_json::from_str(r#"{"login":"octocat","id":1,"name":null}"#).unwrap();
        assert_eq!(user.login, "octocat");
        assert!(user.email.is_none());
        assert!(user.avatar_url.is_none());
    }
}
