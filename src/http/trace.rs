//! Correlation identifiers.
//!
//! A trace id is 32 lowercase hex digits (128 bits). An inbound id in that
//! format is reused; anything else is replaced by a fresh one.

use std::fmt;

use axum::http::HeaderMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(String);

impl TraceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Reuse `candidate` when it is well formed, otherwise generate.
    pub fn from_candidate(candidate: Option<&str>) -> Self {
        match candidate {
            Some(id) if is_valid(id) => Self(id.to_string()),
            _ => Self::generate(),
        }
    }

    /// Read the id from `header` in `headers`.
    pub fn from_headers(headers: &HeaderMap, header: &str) -> Self {
        Self::from_candidate(headers.get(header).and_then(|v| v.to_str().ok()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn is_valid(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid() {
        let id = TraceId::generate();
        assert!(is_valid(id.as_str()), "{id}");
        assert_ne!(id, TraceId::generate());
    }

    #[test]
    fn reuses_well_formed_ids_only() {
        let good = "4bf92f3577b34da6a3ce929d0e0e4736";
        assert_eq!(TraceId::from_candidate(Some(good)).as_str(), good);

        for bad in ["4BF92F3577B34DA6A3CE929D0E0E4736", "abc", "", "zzf92f3577b34da6a3ce929d0e0e4736"] {
            let id = TraceId::from_candidate(Some(bad));
            assert_ne!(id.as_str(), bad);
            assert!(is_valid(id.as_str()));
        }
    }

    #[test]
    fn reads_configured_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", "0123456789abcdef0123456789abcdef".parse().unwrap());
        assert_eq!(
            TraceId::from_headers(&headers, "X-Trace-Id").as_str(),
            "0123456789abcdef0123456789abcdef"
        );
    }
}
