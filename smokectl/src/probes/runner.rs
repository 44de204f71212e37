//! Run coordination.
//!
//! `SmokeRunner::run` drives one smoke run through a fixed, linear sequence:
//!
//! ```text
//! VALIDATE_INPUT -> DISPATCH_BATCH -> AUXILIARY_CHECKS -> AGGREGATE -> NOTIFY_IF_FAILED -> DONE
//! ```
//!
//! Only input validation can end a run early. Probe failures are recorded on their outcomes;
//! the run always proceeds through the auxiliary checks and the notification step.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, COOKIE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use tracing::instrument;
use url::Url;

use crate::api::models::smoke::RunRequest;
use crate::config::SmokeConfig;
use crate::errors::{Error, Result};
use crate::notifications::Notifier;
use crate::probes::executor::ProbeExecutor;
use crate::probes::models::{ProbeOutcome, ProbeRequest, RunExpectations, RunReport};
use crate::probes::scheduler::run_all;
use crate::probes::validators::{validate, validate_manifest, validate_sitemap};

const SITEMAP_PATH: &str = "/sitemap.xml";
const MANIFEST_PATH: &str = "/manifest.json";

/// Everything a run needs once its input has been validated.
#[derive(Debug)]
struct RunPlan {
    origin: Url,
    paths: Vec<String>,
    method: Method,
    timeout: Duration,
    headers: HeaderMap,
    expectations: Arc<RunExpectations>,
}

impl RunPlan {
    /// The origin as reported back to the caller, without a trailing slash.
    fn base_url(&self) -> String {
        self.origin.origin().ascii_serialization()
    }

    fn probe(&self, path: &str, method: Method) -> ProbeRequest {
        ProbeRequest {
            endpoint_path: path.to_string(),
            target_url: resolve_path(&self.origin, path),
            method,
            timeout: self.timeout,
            headers: self.headers.clone(),
        }
    }
}

/// Runs smoke tests: fans probes out under the concurrency cap, validates them, appends the
/// auxiliary checks, and reports failures to the notifier.
pub struct SmokeRunner {
    executor: Arc<ProbeExecutor>,
    notifier: Arc<dyn Notifier>,
    settings: SmokeConfig,
}

impl SmokeRunner {
    pub fn new(settings: SmokeConfig, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        let executor = Arc::new(ProbeExecutor::new(client, settings.body_sample_limit));
        Ok(Self {
            executor,
            notifier,
            settings,
        })
    }

    /// Execute one run. Returns `Err` only for invalid input or unexpected internal failures.
    #[instrument(skip_all, fields(base_url = request.base_url.as_deref().unwrap_or_default()))]
    pub async fn run(&self, request: RunRequest) -> Result<RunReport> {
        let plan = self.plan(request)?;
        let started_at = Utc::now();

        tracing::info!(
            origin = %plan.base_url(),
            paths = plan.paths.len(),
            timeout_ms = plan.timeout.as_millis() as u64,
            "Starting smoke run"
        );

        let mut results = self.dispatch_batch(&plan).await?;
        results.extend(self.auxiliary_checks(&plan).await?);

        let report = RunReport {
            base_url: plan.base_url(),
            started_at,
            duration_ms: results.iter().map(|r| r.time_ms).max().unwrap_or(0),
            results,
        };

        let failed = report.failures().count();
        counter!("smokectl_runs_total", "outcome" => if failed == 0 { "passed" } else { "failed" }).increment(1);
        tracing::info!(
            origin = %report.base_url,
            probes = report.results.len(),
            failed,
            duration_ms = report.duration_ms,
            "Smoke run finished"
        );

        if let Some(summary) = failure_summary(&report) {
            self.notifier.notify(summary);
        }

        Ok(report)
    }

    /// VALIDATE_INPUT: normalize the request and reject what cannot be run.
    fn plan(&self, request: RunRequest) -> Result<RunPlan> {
        let base_url = request
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::bad_request("baseUrl required"))?;
        let origin = parse_origin(base_url).ok_or_else(|| Error::bad_request("invalid baseUrl"))?;

        let paths = if request.paths.is_empty() {
            vec!["/".to_string()]
        } else {
            request.paths
        };

        let method = match request.method.as_deref() {
            None => Method::GET,
            Some(m) => Method::from_str(&m.trim().to_ascii_uppercase())
                .map_err(|_| Error::bad_request(format!("invalid method: {m}")))?,
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            header_value("userAgent", &self.settings.user_agent)?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        insert_optional(&mut headers, AUTHORIZATION, "authorization", request.authorization.as_deref())?;
        insert_optional(&mut headers, COOKIE, "cookie", request.cookie.as_deref())?;

        let expectations = RunExpectations {
            expect_contains_text: request.expect_contains.filter(|s| !s.is_empty()),
            required_header_names: request
                .require_headers
                .iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
            expected_json_keys: request.expect_json_keys,
            warn_over_ms: self.settings.effective_warn_over_ms(request.warn_over_ms),
        };

        Ok(RunPlan {
            origin,
            paths,
            method,
            timeout: self.settings.effective_timeout(request.timeout_ms),
            headers,
            expectations: Arc::new(expectations),
        })
    }

    /// DISPATCH_BATCH: probe every requested path and validate each outcome.
    async fn dispatch_batch(&self, plan: &RunPlan) -> Result<Vec<ProbeOutcome>> {
        let requests: Vec<ProbeRequest> = plan
            .paths
            .iter()
            .map(|path| plan.probe(path, plan.method.clone()))
            .collect();

        let executor = Arc::clone(&self.executor);
        let expectations = Arc::clone(&plan.expectations);
        let outcomes = run_all(requests, self.settings.concurrency, move |request| {
            let executor = Arc::clone(&executor);
            let expectations = Arc::clone(&expectations);
            async move {
                let mut outcome = executor.execute(&request).await;
                validate(&mut outcome, &expectations);
                outcome
            }
        })
        .await?;

        Ok(outcomes)
    }

    /// AUXILIARY_CHECKS: the sitemap and the web app manifest, always in that order.
    async fn auxiliary_checks(&self, plan: &RunPlan) -> Result<Vec<ProbeOutcome>> {
        let requests = vec![
            plan.probe(SITEMAP_PATH, Method::GET),
            plan.probe(MANIFEST_PATH, Method::GET),
        ];

        let executor = Arc::clone(&self.executor);
        let mut outcomes = run_all(requests, self.settings.concurrency, move |request| {
            let executor = Arc::clone(&executor);
            async move { executor.execute(&request).await }
        })
        .await?;

        if let [sitemap, manifest] = outcomes.as_mut_slice() {
            validate_sitemap(sitemap);
            validate_manifest(manifest);
        }

        Ok(outcomes)
    }
}

/// Parse `base_url` and reduce it to its http(s) origin.
fn parse_origin(base_url: &str) -> Option<Url> {
    let url = Url::parse(base_url).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return None;
    }
    Url::parse(&url.origin().ascii_serialization()).ok()
}

/// Resolve a requested path against the origin.
///
/// `""` and `"/"` map to the origin root. Other paths use standard relative resolution, with
/// plain concatenation as the fallback.
fn resolve_path(origin: &Url, path: &str) -> Url {
    if path.is_empty() || path == "/" {
        return origin.clone();
    }

    origin.join(path).unwrap_or_else(|_| {
        let base = origin.as_str().trim_end_matches('/');
        let joined = if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&joined).unwrap_or_else(|_| origin.clone())
    })
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| Error::bad_request(format!("invalid {field} header value")))
}

fn insert_optional(headers: &mut HeaderMap, name: HeaderName, field: &str, value: Option<&str>) -> Result<()> {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        headers.insert(name, header_value(field, value)?);
    }
    Ok(())
}

/// One line per failing result, or `None` when everything passed.
fn failure_summary(report: &RunReport) -> Option<String> {
    let lines: Vec<String> = report
        .failures()
        .map(|f| {
            let status = f.status.map_or_else(|| "no-status".to_string(), |s| s.to_string());
            match f.error_message() {
                Some(error) => format!("• {}: {} - {}", f.endpoint, status, error),
                None => format!("• {}: {}", f.endpoint, status),
            }
        })
        .collect();

    if lines.is_empty() {
        return None;
    }

    Some(format!("Smoke failed on {}\n{}", report.base_url, lines.join("\n")))
}
