//! Header sanitizing for forwarded requests and returned responses.

use axum::http::{header, HeaderMap, HeaderName};

/// Transport-scoped request headers that are never forwarded downstream.
pub const SKIPPED_REQUEST_HEADERS: [HeaderName; 7] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONTENT_ENCODING,
    header::ACCEPT_ENCODING,
    header::CONNECTION,
    header::UPGRADE,
];

/// Hop-by-hop response headers; the framing is re-derived from the buffered body.
const SKIPPED_RESPONSE_HEADERS: [HeaderName; 3] = [
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
];

/// A value containing CR, LF or NUL could split the request when re-serialized.
pub fn is_safe_value(value: &[u8]) -> bool {
    !value.iter().any(|b| matches!(b, b'\r' | b'\n' | b'\0'))
}

/// Copy `inbound` minus transport headers and unsafe values.
pub fn forwardable_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if SKIPPED_REQUEST_HEADERS.contains(name) {
            continue;
        }
        if !is_safe_value(value.as_bytes()) {
            tracing::warn!(header = %name, "Dropping header with control characters");
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

pub fn returnable_response_headers(downstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(downstream.len());
    for (name, value) in downstream {
        if !SKIPPED_RESPONSE_HEADERS.contains(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn strips_transport_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("lb:8080"));
        inbound.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        inbound.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        inbound.append("x-multi", HeaderValue::from_static("a"));
        inbound.append("x-multi", HeaderValue::from_static("b"));

        let out = forwardable_request_headers(&inbound);
        for name in &SKIPPED_REQUEST_HEADERS {
            assert!(!out.contains_key(name), "{name} forwarded");
        }
        assert_eq!(out[header::AUTHORIZATION], "Bearer t");
        assert_eq!(out.get_all("x-multi").iter().count(), 2);
    }

    #[test]
    fn rejects_control_characters() {
        assert!(is_safe_value(b"plain value"));
        assert!(!is_safe_value(b"a\r\nInjected: 1"));
        assert!(!is_safe_value(b"a\nb"));
        assert!(!is_safe_value(b"a\0b"));
    }

    #[test]
    fn response_framing_is_reset() {
        let mut downstream = HeaderMap::new();
        downstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        downstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        downstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let out = returnable_response_headers(&downstream);
        assert_eq!(out.len(), 1);
        assert_eq!(out[header::CONTENT_TYPE], "application/json");
    }
}
