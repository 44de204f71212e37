//! Probe execution engine.
//!
//! This module provides the `ProbeExecutor` which performs a single HTTP attempt against a
//! target URL under a timeout, measures how long it took, and normalizes whatever happened
//! into a `ProbeOutcome`. Transport failures never surface as `Err`: they are recorded on the
//! outcome so one bad endpoint cannot affect the rest of a run.

use crate::probes::models::{ProbeOutcome, ProbeRequest};
use bytes::Bytes;
use metrics::counter;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::time::Instant;

/// Executes probes with a shared HTTP client.
///
/// The client follows redirects with reqwest's default policy. Timeouts are enforced per
/// request by the executor, not by the client.
pub struct ProbeExecutor {
    client: Client,
    body_sample_limit: usize,
}

/// A response that was fully received before the deadline.
struct Fetched {
    status: StatusCode,
    final_url: String,
    headers: BTreeMap<String, String>,
    body: Bytes,
}

impl ProbeExecutor {
    pub fn new(client: Client, body_sample_limit: usize) -> Self {
        Self {
            client,
            body_sample_limit,
        }
    }

    /// Execute a probe. Always returns an outcome, whether or not a response arrived.
    ///
    /// The request and the full body read race against `request.timeout`; on expiry the
    /// request future is dropped, which aborts the connection.
    pub async fn execute(&self, request: &ProbeRequest) -> ProbeOutcome {
        let start = Instant::now();

        let fetch = async {
            let response = self
                .client
                .request(request.method.clone(), request.target_url.clone())
                .headers(request.headers.clone())
                .send()
                .await?;

            let status = response.status();
            let final_url = response.url().to_string();
            let headers = normalize_headers(response.headers());
            let body = response.bytes().await?;

            Ok::<_, reqwest::Error>(Fetched {
                status,
                final_url,
                headers,
                body,
            })
        };

        let result = tokio::time::timeout(request.timeout, fetch).await;
        let elapsed = start.elapsed().as_millis() as u64;

        let outcome = match result {
            Err(_) => {
                let reason = format!("timeout {}ms", request.timeout.as_millis());
                tracing::debug!(endpoint = %request.endpoint_path, elapsed_ms = elapsed, "Probe timed out");
                ProbeOutcome::transport_failure(&request.endpoint_path, elapsed, reason)
            }
            Ok(Err(e)) => {
                let reason = describe_error(&e);
                tracing::debug!(endpoint = %request.endpoint_path, error = %reason, "Probe transport failure");
                ProbeOutcome::transport_failure(&request.endpoint_path, elapsed, reason)
            }
            Ok(Ok(fetched)) => {
                let mut outcome = ProbeOutcome {
                    endpoint: request.endpoint_path.clone(),
                    ok: fetched.status.is_success(),
                    status: Some(fetched.status.as_u16()),
                    time_ms: elapsed,
                    bytes: Some(fetched.body.len() as u64),
                    final_url: Some(fetched.final_url),
                    response_headers: fetched.headers,
                    body_sample: Some(decode_sample(&fetched.body, self.body_sample_limit)),
                    errors: Vec::new(),
                    warning: None,
                };
                if !outcome.ok {
                    outcome.errors.push(format!("HTTP {}", fetched.status.as_u16()));
                }
                tracing::debug!(
                    endpoint = %request.endpoint_path,
                    status = fetched.status.as_u16(),
                    elapsed_ms = elapsed,
                    "Probe completed"
                );
                outcome
            }
        };

        let label = if outcome.ok {
            "success"
        } else if outcome.status.is_some() {
            "http_error"
        } else {
            "transport_error"
        };
        counter!("smokectl_probes_total", "outcome" => label).increment(1);

        outcome
    }
}

/// Lower-case header names; repeated headers are joined with `", "`.
fn normalize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut normalized: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        normalized
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    normalized
}

/// Decode at most `limit` bytes of the body as UTF-8.
///
/// A multi-byte sequence cut by the limit is dropped; other invalid bytes become U+FFFD.
fn decode_sample(body: &[u8], limit: usize) -> String {
    let slice = if body.len() > limit {
        trim_partial_char(&body[..limit])
    } else {
        body
    };
    String::from_utf8_lossy(slice).into_owned()
}

/// Drop a trailing multi-byte sequence that is missing its continuation bytes.
fn trim_partial_char(bytes: &[u8]) -> &[u8] {
    for back in 1..=bytes.len().min(3) {
        let start = bytes.len() - back;
        let lead = bytes[start];
        if lead & 0xC0 == 0x80 {
            continue;
        }
        let width = match lead {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { &bytes[..start] } else { bytes };
    }
    bytes
}

/// Render an error with its source chain, e.g. `error sending request: connection refused`.
fn describe_error(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}
