//! HTTP clients for the Netatmo API and Google geocoding.

use std::time::Duration;

pub mod google;
pub mod netatmo;

pub use google::GoogleGeocoder;
pub use netatmo::NetatmoClient;

/// Timeout for the token endpoint and geocoding.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for station data calls.
pub const DATA_TIMEOUT: Duration = Duration::from_secs(60);

/// True when `body` is a JSON object carrying an `error` key.
pub(crate) fn has_error_key(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.as_object().map(|obj| obj.contains_key("error")))
        .unwrap_or(false)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let cut = (0..=MAX)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_key_detection() {
        assert!(has_error_key(r#"{"error":"invalid_grant"}"#));
        assert!(has_error_key(r#"{"error":{"code":2,"message":"Invalid access token"}}"#));
        assert!(!has_error_key(r#"{"body":[],"status":"ok"}"#));
        assert!(!has_error_key("not json"));
        assert!(!has_error_key(r#"["error"]"#));
    }

    #[test]
    fn truncate_long_body() {
        let body = "x".repeat(300);
        let out = truncate_body(&body);
        assert_eq!(out.len(), 203);
        assert!(out.ends_with("..."));

        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "é".repeat(150);
        let out = truncate_body(&body);
        assert!(out.ends_with("..."));
    }
}
