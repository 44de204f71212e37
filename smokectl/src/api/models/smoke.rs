use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnNull, serde_as};
use utoipa::ToSchema;

/// Request payload for a smoke run, as submitted by the dashboard.
///
/// Every field except `baseUrl` is optional; `null` and absent are treated the same.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RunRequest {
    /// Absolute URL of the site under test; only its origin is used
    #[schema(example = "https://example.com")]
    pub base_url: Option<String>,
    /// Paths to probe, resolved against the origin. Defaults to `["/"]`
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub paths: Vec<String>,
    /// Per-probe timeout in milliseconds, clamped to `[1000, 30000]`. Defaults to 8000
    pub timeout_ms: Option<f64>,
    /// Case-insensitive text every probed body must contain
    pub expect_contains: Option<String>,
    /// Header names every probed response must carry
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub require_headers: Vec<String>,
    /// Top-level keys every JSON response must have
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub expect_json_keys: Vec<String>,
    /// Latency above which a passing probe gets a warning. Zero or negative means the
    /// default of 1500
    pub warn_over_ms: Option<f64>,
    /// Forwarded as the `Authorization` header on every probe
    pub authorization: Option<String>,
    /// Forwarded as the `Cookie` header on every probe
    pub cookie: Option<String>,
    /// HTTP method for the requested paths. Defaults to `GET`
    pub method: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dashboard_payload_deserializes() {
        let request: RunRequest = serde_json::from_value(json!({
            "baseUrl": "https://example.com",
            "paths": ["/", "/login", "/api/health"],
            "timeoutMs": 5000,
            "expectContains": null,
            "requireHeaders": ["Cache-Control"],
            "expectJsonKeys": [],
            "warnOverMs": 1500,
            "authorization": "Bearer token123",
            "cookie": null
        }))
        .unwrap();

        assert_eq!(request.base_url.as_deref(), Some("https://example.com"));
        assert_eq!(request.paths.len(), 3);
        assert_eq!(request.timeout_ms, Some(5000.0));
        assert_eq!(request.expect_contains, None);
        assert_eq!(request.require_headers, vec!["Cache-Control".to_string()]);
        assert_eq!(request.authorization.as_deref(), Some("Bearer token123"));
        assert_eq!(request.method, None);
    }

    #[test]
    fn test_null_lists_default_to_empty() {
        let request: RunRequest = serde_json::from_value(json!({
            "baseUrl": "https://example.com",
            "paths": null,
            "requireHeaders": null
        }))
        .unwrap();

        assert!(request.paths.is_empty());
        assert!(request.require_headers.is_empty());
        assert!(request.expect_json_keys.is_empty());
    }
}
