//! Session schema and claim validation
//!
//! `validate_claims` is the only way to build a `Session`. It checks every
//! field and reports all failures at once; nothing is returned unless the
//! whole claim set is valid.

use chrono::{DateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use super::token::Claims;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"(?i)^[A-Z0-9_'+\-.]*[A-Z0-9_+\-]@([A-Z0-9][A-Z0-9\-]*\.)+[A-Z]{2,}$")
            .expect("email regex is valid");
    static ref DATETIME_RE: Regex =
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z$")
            .expect("datetime regex is valid");
}

/// Authenticated user identity plus expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: SessionUser,
    /// ISO-8601 UTC timestamp, or empty when the token carries no `exp`
    pub expires: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A single failed rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Dotted field path, e.g. `user.email`
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every rule that failed for one claim set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join_errors(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }
}

impl ValidationErrors {
    /// Whether some failure is reported for `path`
    pub fn has_path(&self, path: &str) -> bool {
        self.0.iter().any(|error| error.path == path)
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Map raw token claims onto a `Session`
///
/// `name → user.name`, `email → user.email`, `picture → user.image`,
/// `exp` (seconds) → `expires`. A missing or zero `exp` becomes `""`.
pub fn validate_claims(claims: &Claims) -> Result<Session, ValidationErrors> {
    let mut errors = Vec::new();

    let name = required_string(claims.get("name"), "user.name", &mut errors);
    if name.as_deref().is_some_and(str::is_empty) {
        errors.push(ValidationError::new("user.name", "String must not be empty"));
    }

    let email = required_string(claims.get("email"), "user.email", &mut errors);
    if let Some(email) = &email {
        if !is_valid_email(email) {
            errors.push(ValidationError::new("user.email", "Invalid email"));
        }
    }

    let image = match claims.get("picture") {
        None | Some(Value::Null) => None,
        Some(Value::String(url)) => {
            if !is_valid_url(url) {
                errors.push(ValidationError::new("user.image", "Invalid url"));
            }
            Some(url.clone())
        }
        Some(_) => {
            errors.push(ValidationError::new("user.image", "Expected string"));
            None
        }
    };

    let expires = match expires_from_claim(claims.get("exp")) {
        Ok(expires) => expires,
        Err(error) => {
            errors.push(error);
            String::new()
        }
    };
    if !expires.is_empty() && !is_valid_datetime(&expires) {
        errors.push(ValidationError::new("expires", "Invalid datetime"));
    }

    match (name, email) {
        (Some(name), Some(email)) if errors.is_empty() => Ok(Session {
            user: SessionUser { name, email, image },
            expires,
        }),
        _ => Err(ValidationErrors(errors)),
    }
}

fn required_string(
    value: Option<&Value>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<String> {
    match value {
        None | Some(Value::Null) => {
            errors.push(ValidationError::new(path, "Required"));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(ValidationError::new(path, "Expected string"));
            None
        }
    }
}

/// Convert an `exp` claim in seconds to an ISO-8601 millisecond timestamp
fn expires_from_claim(exp: Option<&Value>) -> Result<String, ValidationError> {
    let seconds = match exp {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return Ok(String::new()),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Some(Value::String(s)) if s.is_empty() => return Ok(String::new()),
        Some(Value::String(s)) => leading_integer(s),
        Some(_) => None,
    };

    let seconds = seconds.ok_or_else(|| ValidationError::new("expires", "Invalid exp claim"))?;
    if seconds == 0 {
        return Ok(String::new());
    }

    seconds
        .checked_mul(1000)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or_else(|| ValidationError::new("expires", "exp claim is out of range"))
}

/// Integer prefix of a string, ignoring leading whitespace
fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let digits_end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(s.len(), |(i, _)| i);
    s[..digits_end].parse().ok()
}

fn is_valid_email(email: &str) -> bool {
    !email.starts_with('.') && !email.contains("..") && EMAIL_RE.is_match(email)
}

fn is_valid_url(value: &str) -> bool {
    url::Url::parse(value).is_ok()
}

fn is_valid_datetime(value: &str) -> bool {
    DATETIME_RE.is_match(value) && DateTime::parse_from_rfc3339(value).is_ok()
}
