//! Session token encoding and decoding
//!
//! Tokens use the NextAuth.js default format: a compact JWE with
//! `alg: dir` and `enc: A256GCM`, keyed by HKDF-SHA256 over the
//! configured secret.
//!
//! Token format: `b64(header)..b64(iv).b64(ciphertext).b64(tag)`

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hkdf::Hkdf;
use rand::RngCore;
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

/// Raw decoded key-value payload of a token
pub type Claims = Map<String, Value>;

const AES_256_KEY_BYTES: usize = 32;
const AES_GCM_NONCE_BYTES: usize = 12;
const AES_GCM_TAG_BYTES: usize = 16;
const CLOCK_TOLERANCE_SECS: i64 = 15;

/// HKDF info string used for the session token key
pub const SESSION_KEY_INFO: &str = "NextAuth.js Generated Encryption Key";

/// Token decode failure
///
/// Every variant means "no session" to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not a compact JWE")]
    Malformed,
    #[error("unsupported JWE header")]
    UnsupportedHeader,
    #[error("token decryption failed")]
    Decrypt,
    #[error("token payload is not a JSON object")]
    InvalidPayload,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("token encryption failed")]
    Encrypt,
}

/// Recovers claims from a token
pub trait TokenDecoder: Send + Sync {
    fn decode(&self, token: &str, secret: &str) -> Result<Claims, TokenError>;
}

/// Issues tokens that a matching `TokenDecoder` accepts
pub trait TokenEncoder: Send + Sync {
    /// Encrypt `claims`, stamping `iat`, `exp` (`iat + max_age_secs`) and `jti`
    fn encode(&self, claims: Claims, secret: &str, max_age_secs: i64)
    -> Result<String, TokenError>;
}

/// JWE `dir`/`A256GCM` codec with an HKDF-derived key
#[derive(Debug, Clone)]
pub struct JweSessionCodec {
    info: &'static str,
}

impl Default for JweSessionCodec {
    fn default() -> Self {
        Self {
            info: SESSION_KEY_INFO,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ProtectedHeader {
    alg: String,
    enc: String,
}

impl JweSessionCodec {
    /// Codec deriving its key with a different HKDF info string
    pub fn with_info(info: &'static str) -> Self {
        Self { info }
    }

    fn derive_key(&self, secret: &str) -> [u8; AES_256_KEY_BYTES] {
        let hkdf = Hkdf::<Sha256>::new(Some(b"".as_slice()), secret.as_bytes());
        let mut key = [0_u8; AES_256_KEY_BYTES];
        // 32 bytes is always a valid HKDF-SHA256 output length
        let _ = hkdf.expand(self.info.as_bytes(), &mut key);
        key
    }

    fn cipher(&self, secret: &str) -> Aes256Gcm {
        let key = self.derive_key(secret);
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key))
    }
}

impl TokenDecoder for JweSessionCodec {
    fn decode(&self, token: &str, secret: &str) -> Result<Claims, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        let &[header_b64, encrypted_key, iv_b64, ciphertext_b64, tag_b64] = parts.as_slice() else {
            return Err(TokenError::Malformed);
        };

        // `dir` carries no encrypted key
        if !encrypted_key.is_empty() {
            return Err(TokenError::UnsupportedHeader);
        }

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| TokenError::Malformed)?;
        let header: ProtectedHeader =
            serde_json::from_slice(&header_bytes).map_err(|_| TokenError::Malformed)?;
        if header.alg != "dir" || header.enc != "A256GCM" {
            return Err(TokenError::UnsupportedHeader);
        }

        let iv = URL_SAFE_NO_PAD
            .decode(iv_b64)
            .map_err(|_| TokenError::Malformed)?;
        if iv.len() != AES_GCM_NONCE_BYTES {
            return Err(TokenError::Malformed);
        }
        let mut sealed = URL_SAFE_NO_PAD
            .decode(ciphertext_b64)
            .map_err(|_| TokenError::Malformed)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| TokenError::Malformed)?;
        if tag.len() != AES_GCM_TAG_BYTES {
            return Err(TokenError::Malformed);
        }
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher(secret)
            .decrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &sealed,
                    aad: header_b64.as_bytes(),
                },
            )
            .map_err(|_| TokenError::Decrypt)?;

        let claims = match serde_json::from_slice::<Value>(&plaintext) {
            Ok(Value::Object(claims)) => claims,
            _ => return Err(TokenError::InvalidPayload),
        };

        check_time_claims(&claims, Utc::now().timestamp())?;

        Ok(claims)
    }
}

impl TokenEncoder for JweSessionCodec {
    fn encode(
        &self,
        mut claims: Claims,
        secret: &str,
        max_age_secs: i64,
    ) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        claims.insert("iat".to_string(), Value::from(now));
        claims.insert("exp".to_string(), Value::from(now + max_age_secs));
        claims
            .entry("jti".to_string())
            .or_insert_with(|| Value::from(Uuid::new_v4().to_string()));

        let header = serde_json::to_vec(&ProtectedHeader {
            alg: "dir".to_string(),
            enc: "A256GCM".to_string(),
        })
        .map_err(|_| TokenError::Encrypt)?;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);

        let payload = serde_json::to_vec(&claims).map_err(|_| TokenError::Encrypt)?;

        let mut iv = [0_u8; AES_GCM_NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut sealed = self
            .cipher(secret)
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &payload,
                    aad: header_b64.as_bytes(),
                },
            )
            .map_err(|_| TokenError::Encrypt)?;
        let tag = sealed.split_off(sealed.len() - AES_GCM_TAG_BYTES);

        Ok(format!(
            "{}..{}.{}.{}",
            header_b64,
            URL_SAFE_NO_PAD.encode(iv),
            URL_SAFE_NO_PAD.encode(&sealed),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }
}

fn check_time_claims(claims: &Claims, now: i64) -> Result<(), TokenError> {
    if let Some(exp) = numeric_date(claims, "exp")? {
        if exp <= (now - CLOCK_TOLERANCE_SECS) as f64 {
            return Err(TokenError::Expired);
        }
    }
    if let Some(nbf) = numeric_date(claims, "nbf")? {
        if nbf > (now + CLOCK_TOLERANCE_SECS) as f64 {
            return Err(TokenError::NotYetValid);
        }
    }
    Ok(())
}

/// A registered time claim; present but not a JSON number is an invalid payload
fn numeric_date(claims: &Claims, name: &str) -> Result<Option<f64>, TokenError> {
    match claims.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or(TokenError::InvalidPayload),
    }
}

/// Lowercase hex encoding
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test-secret-key-that-is-32-bytes!!";

    fn claims(value: Value) -> Claims {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn decodes_what_it_encodes() {
        let codec = JweSessionCodec::default();
        let token = codec
            .encode(
                claims(json!({"name": "A", "email": "a@x.com", "sub": "42"})),
                SECRET,
                3600,
            )
            .unwrap();

        assert_eq!(token.split('.').count(), 5);
        assert!(token.contains(".."));

        let decoded = codec.decode(&token, SECRET).unwrap();
        assert_eq!(decoded["email"], "a@x.com");
        assert_eq!(decoded["sub"], "42");
        assert!(decoded["exp"].as_i64().unwrap() > Utc::now().timestamp());
        assert!(Uuid::parse_str(decoded["jti"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn rejects_wrong_secret() {
        let codec = JweSessionCodec::default();
        let token = codec
            .encode(claims(json!({"name": "A"})), SECRET, 3600)
            .unwrap();

        let error = codec
            .decode(&token, "another-secret-that-is-32-bytes-long")
            .unwrap_err();
        assert_eq!(error, TokenError::Decrypt);
    }

    #[test]
    fn rejects_key_derived_with_other_info() {
        let token = JweSessionCodec::with_info("other purpose")
            .encode(claims(json!({"name": "A"})), SECRET, 3600)
            .unwrap();

        assert_eq!(
            JweSessionCodec::default().decode(&token, SECRET),
            Err(TokenError::Decrypt)
        );
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let codec = JweSessionCodec::default();
        let token = codec
            .encode(claims(json!({"name": "A"})), SECRET, 3600)
            .unwrap();

        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        let mut ciphertext = URL_SAFE_NO_PAD.decode(&parts[3]).unwrap();
        ciphertext[0] ^= 0x01;
        parts[3] = URL_SAFE_NO_PAD.encode(ciphertext);

        assert_eq!(
            codec.decode(&parts.join("."), SECRET),
            Err(TokenError::Decrypt)
        );
    }

    #[test]
    fn rejects_malformed_tokens() {
        let codec = JweSessionCodec::default();
        assert_eq!(codec.decode("", SECRET), Err(TokenError::Malformed));
        assert_eq!(
            codec.decode("a.b.c", SECRET),
            Err(TokenError::Malformed)
        );
        assert_eq!(
            codec.decode("!!!..a.b.c", SECRET),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn rejects_unsupported_header() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RSA-OAEP","enc":"A256GCM"}"#);
        let token = format!("{header}..AAAAAAAAAAAAAAAA.AAAA.AAAAAAAAAAAAAAAAAAAAAA");
        assert_eq!(
            JweSessionCodec::default().decode(&token, SECRET),
            Err(TokenError::UnsupportedHeader)
        );
    }

    #[test]
    fn rejects_expired_token() {
        let codec = JweSessionCodec::default();
        let token = codec
            .encode(claims(json!({"name": "A"})), SECRET, -3600)
            .unwrap();

        assert_eq!(codec.decode(&token, SECRET), Err(TokenError::Expired));
    }

    #[test]
    fn time_claims_allow_clock_tolerance() {
        let now = 1_700_000_000;
        assert!(check_time_claims(&claims(json!({"exp": now - 5})), now).is_ok());
        assert_eq!(
            check_time_claims(&claims(json!({"exp": now - 60})), now),
            Err(TokenError::Expired)
        );
        assert!(check_time_claims(&claims(json!({"nbf": now + 5})), now).is_ok());
        assert_eq!(
            check_time_claims(&claims(json!({"nbf": now + 60})), now),
            Err(TokenError::NotYetValid)
        );
        assert!(check_time_claims(&claims(json!({})), now).is_ok());
    }

    #[test]
    fn fractional_time_claims_are_compared_as_numbers() {
        let now = 1_700_000_000;
        assert_eq!(
            check_time_claims(&claims(json!({"exp": (now - 3600) as f64 + 0.5})), now),
            Err(TokenError::Expired)
        );
        assert!(check_time_claims(&claims(json!({"exp": (now + 3600) as f64 + 0.5})), now).is_ok());
        assert_eq!(
            check_time_claims(&claims(json!({"nbf": (now + 3600) as f64 + 0.5})), now),
            Err(TokenError::NotYetValid)
        );
    }

    #[test]
    fn non_numeric_time_claims_are_rejected() {
        let now = 1_700_000_000;
        let stale = (now - 3600).to_string();
        assert_eq!(
            check_time_claims(&claims(json!({"exp": stale})), now),
            Err(TokenError::InvalidPayload)
        );
        assert_eq!(
            check_time_claims(&claims(json!({"exp": null})), now),
            Err(TokenError::InvalidPayload)
        );
        assert_eq!(
            check_time_claims(&claims(json!({"nbf": "soon"})), now),
            Err(TokenError::InvalidPayload)
        );
    }

    #[test]
    fn string_exp_token_does_not_decode() {
        let codec = JweSessionCodec::default();
        let header_b64 = URL_SAFE_NO_PAD.encode(br#"{"alg":"dir","enc":"A256GCM"}"#);
        let payload = serde_json::to_vec(&json!({
            "name": "A",
            "exp": (Utc::now().timestamp() - 3600).to_string()
        }))
        .unwrap();
        let iv = [7_u8; AES_GCM_NONCE_BYTES];
        let mut sealed = codec
            .cipher(SECRET)
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &payload,
                    aad: header_b64.as_bytes(),
                },
            )
            .unwrap();
        let tag = sealed.split_off(sealed.len() - AES_GCM_TAG_BYTES);
        let forged = format!(
            "{}..{}.{}.{}",
            header_b64,
            URL_SAFE_NO_PAD.encode(iv),
            URL_SAFE_NO_PAD.encode(&sealed),
            URL_SAFE_NO_PAD.encode(tag)
        );

        assert_eq!(
            codec.decode(&forged, SECRET),
            Err(TokenError::InvalidPayload)
        );
    }
}
