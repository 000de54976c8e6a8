//! Double-submit CSRF tokens
//!
//! The cookie holds `token|sha256(token ‖ secret)`. A POST is accepted when
//! the cookie hash checks out and the submitted `csrfToken` equals `token`.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::session::token::hex;

const CSRF_TOKEN_BYTES: usize = 32;

/// CSRF token for one request
#[derive(Debug, Clone)]
pub struct CsrfToken {
    pub token: String,
    /// Cookie value to set when the token was freshly minted
    pub new_cookie: Option<String>,
}

impl CsrfToken {
    /// Reuse the token from a valid cookie, or mint a new one
    pub fn from_cookie(cookie: Option<&str>, secret: &str) -> Self {
        if let Some((token, hash)) = cookie.and_then(|value| value.split_once('|')) {
            if !token.is_empty() && hash == token_hash(token, secret) {
                return Self {
                    token: token.to_string(),
                    new_cookie: None,
                };
            }
        }

        let mut bytes = [0_u8; CSRF_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex(&bytes);
        let new_cookie = format!("{}|{}", token, token_hash(&token, secret));

        Self {
            token,
            new_cookie: Some(new_cookie),
        }
    }

    /// Whether `submitted` matches a token that came from a valid cookie
    pub fn verify(&self, submitted: Option<&str>) -> bool {
        self.new_cookie.is_none() && submitted == Some(self.token.as_str())
    }
}

fn token_hash(token: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(secret.as_bytes());
    hex(&hasher.finalize())
}
