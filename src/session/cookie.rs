//! `Cookie` request header parsing

use std::collections::HashMap;

/// Cookie name to decoded value
pub type CookieMap = HashMap<String, String>;

/// Parse a raw `Cookie` header into a map of decoded names to decoded values
///
/// Segments are separated by `;` and split on the first `=`. Both sides are
/// trimmed before percent-decoding. Segments without `=`, with an empty
/// name, or that do not decode to UTF-8 are skipped. A repeated name keeps
/// the last value.
pub fn parse_cookie_header(header: &str) -> CookieMap {
    let mut cookies = CookieMap::new();

    for segment in header.split(';') {
        let Some((raw_name, raw_value)) = segment.split_once('=') else {
            if !segment.trim().is_empty() {
                tracing::debug!(segment = %segment.trim(), "Skipping cookie segment without '='");
            }
            continue;
        };

        let (Ok(name), Ok(value)) = (
            urlencoding::decode(raw_name.trim()),
            urlencoding::decode(raw_value.trim()),
        ) else {
            tracing::debug!("Skipping cookie segment that is not valid UTF-8 after decoding");
            continue;
        };

        if name.is_empty() {
            continue;
        }

        cookies.insert(name.into_owned(), value.into_owned());
    }

    cookies
}
