//! Response validation.
//!
//! [`validate`] runs every check against an outcome in a fixed order: content, headers, JSON
//! shape, latency. Checks do not short-circuit each other; each failure is appended to the
//! outcome's error list. The auxiliary validators ([`validate_sitemap`], [`validate_manifest`])
//! are the lighter checks used for the fixed well-known resources.

use crate::probes::models::{ProbeOutcome, RunExpectations};
use serde_json::Value;

/// Marker that must appear in a sitemap body.
const SITEMAP_ROOT_MARKER: &str = "<urlset";

pub const INVALID_JSON: &str = "invalid JSON";

/// Apply every run expectation to `outcome`, in place.
pub fn validate(outcome: &mut ProbeOutcome, expectations: &RunExpectations) {
    check_content(outcome, expectations);
    check_headers(outcome, expectations);
    check_json_shape(outcome, expectations);
    check_latency(outcome, expectations);
}

fn check_content(outcome: &mut ProbeOutcome, expectations: &RunExpectations) {
    let (Some(text), Some(body)) = (&expectations.expect_contains_text, &outcome.body_sample) else {
        return;
    };

    if !body.to_lowercase().contains(&text.to_lowercase()) {
        outcome.fail(format!("missing text: \"{text}\""));
    }
}

fn check_headers(outcome: &mut ProbeOutcome, expectations: &RunExpectations) {
    for name in &expectations.required_header_names {
        if outcome.header(name).is_none() {
            outcome.fail(format!("missing header: {name}"));
        }
    }
}

fn check_json_shape(outcome: &mut ProbeOutcome, expectations: &RunExpectations) {
    if expectations.expected_json_keys.is_empty() {
        return;
    }
    let is_json = outcome
        .header("content-type")
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
    if !is_json {
        return;
    }
    let Some(body) = &outcome.body_sample else {
        return;
    };

    match serde_json::from_str::<Value>(body) {
        Ok(value) => {
            let object = value.as_object();
            for key in &expectations.expected_json_keys {
                if !object.is_some_and(|o| o.contains_key(key)) {
                    outcome.fail(format!("json missing key: {key}"));
                }
            }
        }
        Err(e) => {
            tracing::debug!(endpoint = %outcome.endpoint, error = %e, "Response body is not valid JSON");
            // A parse failure replaces every reason recorded so far
            outcome.ok = false;
            outcome.errors = vec![INVALID_JSON.to_string()];
        }
    }
}

fn check_latency(outcome: &mut ProbeOutcome, expectations: &RunExpectations) {
    if outcome.ok && outcome.time_ms > expectations.warn_over_ms {
        outcome.warning = Some(format!("slow: {}ms", outcome.time_ms));
    }
}

/// The sitemap must be reachable and contain a `<urlset` root element.
pub fn validate_sitemap(outcome: &mut ProbeOutcome) {
    let has_root = outcome
        .body_sample
        .as_deref()
        .is_some_and(|body| body.contains(SITEMAP_ROOT_MARKER));
    if !outcome.ok || !has_root {
        outcome.fail("invalid sitemap");
    }
}

/// The manifest only has to be reachable.
pub fn validate_manifest(outcome: &mut ProbeOutcome) {
    if !outcome.ok {
        outcome.fail("manifest missing");
    }
}
