//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (SIGNIN_STARTER__*)
//! 4. Conventional variables (NEXT_AUTH_SECRET, NEXTAUTH_URL, OAUTH_GITHUB_ID,
//!    OAUTH_GITHUB_SECRET, PORT, NODE_ENV)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub assets: AssetsConfig,
    pub page: PageConfig,
    pub mode: RunMode,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Public base URL of the site, handed to the browser for session bootstrapping
    pub public_url: String,
}

impl ServerConfig {
    /// Public base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret used to derive the session token encryption key
    pub secret: String,
    /// Session max age in seconds (default: 2592000 = 30 days)
    pub session_max_age: i64,
    pub github: GitHubOAuthConfig,
}

/// GitHub OAuth configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Static asset configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    /// Directory served for static files; fingerprinted assets live in `<public_dir>/build`
    pub public_dir: PathBuf,
}

/// Page rendering configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    /// Optional HTML template; the embedded default is used when unset
    pub template: Option<PathBuf>,
    pub title: String,
    pub description: String,
}

/// Run mode
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Development,
    #[default]
    Production,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Errors
    /// Returns error if a required value (secret, public URL) is missing
    /// or the configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let node_env_mode = std::env::var("NODE_ENV").ok().map(|value| {
            if value == "development" {
                "development"
            } else {
                "production"
            }
        });

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("auth.session_max_age", 2_592_000)?
            .set_default("auth.github.client_id", "")?
            .set_default("auth.github.client_secret", "")?
            .set_default("assets.public_dir", "public")?
            .set_default("page.title", "New App")?
            .set_default("page.description", "Welcome!")?
            .set_default("mode", "production")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("SIGNIN_STARTER")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("auth.secret", std::env::var("NEXT_AUTH_SECRET").ok())?
            .set_override_option("server.public_url", std::env::var("NEXTAUTH_URL").ok())?
            .set_override_option(
                "auth.github.client_id",
                std::env::var("OAUTH_GITHUB_ID").ok(),
            )?
            .set_override_option(
                "auth.github.client_secret",
                std::env::var("OAUTH_GITHUB_SECRET").ok(),
            )?
            .set_override_option("server.port", std::env::var("PORT").ok())?
            .set_override_option("mode", node_env_mode)?
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Whether cookies get the `__Secure-` prefix and `Secure` attribute
    pub fn should_use_secure_cookies(&self) -> bool {
        self.server
            .public_url
            .trim()
            .to_ascii_lowercase()
            .starts_with("https://")
    }

    pub fn is_development(&self) -> bool {
        self.mode == RunMode::Development
    }

    pub fn has_github_credentials(&self) -> bool {
        !self.auth.github.client_id.is_empty() && !self.auth.github.client_secret.is_empty()
    }

    /// Default tracing filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> String {
        format!(
            "signin_starter={level},tower_http={level}",
            level = self.logging.level
        )
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SECRET_BYTES: usize = 32;

        if self.auth.secret.as_bytes().len() < MIN_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.secret must be at least {} bytes",
                MIN_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        let url = url::Url::parse(self.server.public_url.trim()).map_err(|e| {
            crate::error::AppError::Config(format!("server.public_url is not a valid URL: {e}"))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(crate::error::AppError::Config(
                "server.public_url must use http or https".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                public_url: "http://localhost:3000/".to_string(),
            },
            auth: AuthConfig {
                secret: "x".repeat(32),
                session_max_age: 2_592_000,
                github: GitHubOAuthConfig {
                    client_id: "github-client-id".to_string(),
                    client_secret: "github-client-secret".to_string(),
                },
            },
            assets: AssetsConfig {
                public_dir: PathBuf::from("public"),
            },
            page: PageConfig {
                template: None,
                title: "New App".to_string(),
                description: "Welcome!".to_string(),
            },
            mode: RunMode::Production,
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_local_http_url() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
        assert_eq!(config.server.base_url(), "http://localhost:3000");
    }

    #[test]
    fn log_filter_follows_configured_level() {
        let mut config = valid_config();
        config.logging.level = "debug".to_string();
        assert_eq!(config.log_filter(), "signin_starter=debug,tower_http=debug");
    }

    #[test]
    fn missing_github_credentials_are_detected() {
        let mut config = valid_config();
        assert!(config.has_github_credentials());
        config.auth.github.client_secret.clear();
        assert!(!config.has_github_credentials());
    }

    #[test]
    fn validate_rejects_short_secret() {
        let mut config = valid_config();
        config.auth.secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("auth.secret")
        ));
    }

    #[test]
    fn validate_rejects_non_http_public_url() {
        let mut config = valid_config();
        config.server.public_url = "ftp://example.com".to_string();

        let error = config
            .validate()
            .expect_err("non-http public URL must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("server.public_url")
        ));
    }

    #[test]
    fn https_public_url_enables_secure_cookies() {
        let mut config = valid_config();
        config.server.public_url = "https://app.example.com".to_string();
        assert!(config.should_use_secure_cookies());
    }
}
