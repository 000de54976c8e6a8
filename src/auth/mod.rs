//! Authentication routes
//!
//! Handles:
//! - Recognition of `/api/auth/*` routes
//! - GitHub OAuth flow
//! - CSRF tokens for sign-in and sign-out forms

mod csrf;
mod dispatch;
mod github;
mod handler;
mod pages;
mod provider;

pub use csrf::CsrfToken;
pub use dispatch::{AUTH_PATH_PREFIX, AuthAction, auth_dispatch};
pub use github::GitHubProvider;
pub use handler::{AuthHandler, NextAuthHandler, SessionCodec};
pub use provider::{OAuthProfile, OAuthProvider, ProviderInfo, callback_url};
