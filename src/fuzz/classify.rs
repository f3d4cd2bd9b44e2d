use crate::client::RequestOutcome;

/// Header names whose presence on a fuzzed object leaks cache/backend
/// identity information.
pub const CACHE_DISCLOSURE_HEADERS: &[&str] = &["x-cache", "x-cache-hits", "x-served-by"];

/// A fuzzed object that answered with anything other than the expected
/// not-found/forbidden pair is worth a second look. Transport failures are
/// not findings.
pub fn is_interesting(outcome: &RequestOutcome) -> bool {
    match outcome.status {
        Some(status) => status != 404 && status != 403,
        None => false,
    }
}

/// Any cache-disclosure header present, regardless of status.
pub fn discloses_cache_info(outcome: &RequestOutcome) -> bool {
    CACHE_DISCLOSURE_HEADERS.iter().any(|name| outcome.header(name).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn outcome(status: Option<u16>, headers: &[(&str, &str)]) -> RequestOutcome {
        RequestOutcome {
            url: "https://cdn.example.com/x".into(),
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            body: None,
            body_size: 0,
            elapsed_ms: 1,
            error: None,
        }
    }

    #[test]
    fn not_found_and_forbidden_are_expected() {
        assert!(!is_interesting(&outcome(Some(404), &[])));
        assert!(!is_interesting(&outcome(Some(403), &[])));
        assert!(is_interesting(&outcome(Some(200), &[])));
        assert!(is_interesting(&outcome(Some(500), &[])));
    }

    #[test]
    fn transport_failures_are_not_findings() {
        assert!(!is_interesting(&outcome(None, &[])));
    }

    #[test]
    fn cache_headers_detected_case_insensitively() {
        assert!(discloses_cache_info(&outcome(Some(404), &[("X-Cache", "MISS")])));
        assert!(discloses_cache_info(&outcome(Some(200), &[("x-served-by", "cache-fra1")])));
        assert!(!discloses_cache_info(&outcome(Some(200), &[("server", "nginx")])));
    }
}
