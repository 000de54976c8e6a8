//! Session handling
//!
//! Sessions live entirely in an encrypted cookie. Nothing is stored
//! server-side; every request rebuilds its session from the `Cookie` header.

pub mod cookie;
mod loader;
mod schema;
pub mod token;

pub use cookie::{CookieMap, parse_cookie_header};
pub use loader::{LoadedSession, PageData, SECURE_SESSION_COOKIE, SESSION_COOKIE, SessionLoader};
pub use schema::{Session, SessionUser, ValidationError, ValidationErrors, validate_claims};
pub use token::{Claims, JweSessionCodec, TokenDecoder, TokenEncoder, TokenError};
