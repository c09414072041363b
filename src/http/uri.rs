//! Downstream URI construction.
//!
//! `/proxy/orders/api/items?id=7` routed to `http://10.0.0.5:8080` becomes
//! `http://10.0.0.5:8080/api/items?id=7`.

use axum::http::Uri;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything but RFC 3986 unreserved characters.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Path left after removing `prefix` and the service segment; `/` when empty.
///
/// `raw_path` is the still-encoded request path, forwarded as is.
pub fn downstream_path(raw_path: &str, prefix: &str) -> String {
    let rest = raw_path.strip_prefix(prefix).unwrap_or(raw_path);
    let rest = rest.trim_start_matches('/');
    match rest.split_once('/') {
        Some((_service, tail)) if !tail.is_empty() => format!("/{tail}"),
        _ => "/".to_string(),
    }
}

/// Re-encode a query string parameter by parameter.
///
/// Pairs are split on `&`, then on the first `=`. Keys and values are trimmed,
/// pairs without `=` or with a blank key are dropped. Returns `None` when no
/// pair survives.
pub fn rebuild_query(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let pairs: Vec<String> = raw
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some(format!("{}={}", encode_component(key), encode_component(value.trim())))
        })
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("&"))
    }
}

/// Decode then encode, keeping `+` as the separator it was sent as.
fn encode_component(raw: &str) -> String {
    raw.split('+')
        .map(|part| {
            let decoded = percent_decode_str(part).decode_utf8_lossy();
            utf8_percent_encode(&decoded, QUERY_COMPONENT).to_string()
        })
        .collect::<Vec<_>>()
        .join("+")
}

/// Full downstream URI for an instance base URL.
pub fn target_uri(
    base_url: &str,
    path: &str,
    query: Option<&str>,
) -> Result<Uri, axum::http::uri::InvalidUri> {
    let base = base_url.trim_end_matches('/');
    let uri = match query {
        Some(q) => format!("{base}{path}?{q}"),
        None => format!("{base}{path}"),
    };
    uri.parse()
}
