//! Data types flowing through a smoke run: what to probe, what came back, what was expected,
//! and the final report.

use chrono::{DateTime, Utc};
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;
use utoipa::ToSchema;

/// Separator used when several failure reasons are reported on one outcome.
pub const ERROR_SEPARATOR: &str = " | ";

/// A single HTTP probe to perform. Built once per path per run.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    /// Path as given by the caller, used to correlate the outcome
    pub endpoint_path: String,
    /// Absolute URL derived from the run's origin and `endpoint_path`
    pub target_url: Url,
    pub method: Method,
    pub timeout: Duration,
    pub headers: HeaderMap,
}

/// Result of one probe, annotated in place by the validator pipeline.
///
/// `errors` keeps every failure reason separately; it is only flattened into a single
/// `error` string when serialized.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    /// The originally requested path
    pub endpoint: String,
    /// True only if the transport succeeded, the status was 2xx and every check passed
    pub ok: bool,
    /// HTTP status code, absent if the request never completed
    pub status: Option<u16>,
    /// Elapsed wall-clock time of the attempt, in milliseconds
    pub time_ms: u64,
    /// Full response body size in bytes
    pub bytes: Option<u64>,
    /// URL after following redirects
    pub final_url: Option<String>,
    #[serde(skip)]
    pub response_headers: BTreeMap<String, String>,
    #[serde(skip)]
    pub body_sample: Option<String>,
    /// Failure reasons joined with `" | "`
    #[serde(
        rename = "error",
        serialize_with = "serialize_errors",
        skip_serializing_if = "Vec::is_empty"
    )]
    #[schema(value_type = Option<String>)]
    pub errors: Vec<String>,
    /// Non-fatal note, e.g. a slow but passing probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ProbeOutcome {
    /// An outcome for a request that never produced a response.
    pub fn transport_failure(endpoint: impl Into<String>, time_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ok: false,
            time_ms,
            errors: vec![reason.into()],
            ..Default::default()
        }
    }

    /// Mark the outcome failed and record why.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.ok = false;
        self.errors.push(reason.into());
    }

    /// All failure reasons as one delimited string, if there are any.
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join(ERROR_SEPARATOR))
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.response_headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

fn serialize_errors<S>(errors: &[String], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&errors.join(ERROR_SEPARATOR))
}

/// Assertions applied to every user-requested probe in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunExpectations {
    /// Case-insensitive substring the body must contain
    pub expect_contains_text: Option<String>,
    /// Lower-cased header names that must be present
    pub required_header_names: Vec<String>,
    /// Top-level keys a JSON body must have, checked in order
    pub expected_json_keys: Vec<String>,
    /// Latency above which a passing probe gets a warning
    pub warn_over_ms: u64,
}

/// The terminal artifact of one run.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Normalized origin of the requested base URL
    pub base_url: String,
    #[schema(value_type = String, format = "date-time")]
    pub started_at: DateTime<Utc>,
    /// Slowest probe's `timeMs`: the wall-clock span of the parallel batch, not a sum
    pub duration_ms: u64,
    /// Requested paths in input order, followed by the auxiliary checks
    pub results: Vec<ProbeOutcome>,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.results.iter().filter(|r| !r.ok)
    }

    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_errors_serialize_as_joined_string() {
        let mut outcome = ProbeOutcome {
            endpoint: "/".to_string(),
            ok: true,
            status: Some(200),
            time_ms: 12,
            bytes: Some(5),
            final_url: Some("http://example.com/".to_string()),
            ..Default::default()
        };
        outcome.fail("missing text: \"health\"");
        outcome.fail("missing header: x-request-id");

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({
                "endpoint": "/",
                "ok": false,
                "status": 200,
                "timeMs": 12,
                "bytes": 5,
                "finalUrl": "http://example.com/",
                "error": "missing text: \"health\" | missing header: x-request-id",
            })
        );
    }

    #[test]
    fn test_transport_failure_serializes_nulls() {
        let outcome = ProbeOutcome::transport_failure("/api", 1000, "timeout 1000ms");

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], json!(null));
        assert_eq!(value["bytes"], json!(null));
        assert_eq!(value["finalUrl"], json!(null));
        assert_eq!(value["error"], json!("timeout 1000ms"));
        assert!(value.get("warning").is_none());
        assert!(value.get("bodySample").is_none());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut outcome = ProbeOutcome::default();
        outcome
            .response_headers
            .insert("content-type".to_string(), "application/json".to_string());

        assert_eq!(outcome.header("Content-Type"), Some("application/json"));
        assert_eq!(outcome.header("x-missing"), None);
    }
}
