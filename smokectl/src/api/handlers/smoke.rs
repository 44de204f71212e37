//! HTTP handler for smoke runs.

use axum::{Json, body::Bytes, extract::State};

use crate::{
    AppState,
    api::models::smoke::RunRequest,
    errors::{Error, Result},
    probes::models::RunReport,
};

#[utoipa::path(
    post,
    path = "/api/smoke",
    tag = "smoke",
    summary = "Run a smoke test",
    description = "Probe every requested path on the target origin, then its sitemap and manifest. \
                   Probe failures are reported per result and never fail the request itself.",
    request_body = RunRequest,
    responses(
        (status = 200, description = "Run completed", body = RunReport),
        (status = 400, description = "Missing or invalid input"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn run_smoke(State(state): State<AppState>, body: Bytes) -> Result<Json<RunReport>> {
    // An empty body is treated like `{}`
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RunRequest::default()
    } else {
        serde_json::from_slice::<RunRequest>(&body).map_err(|e| Error::bad_request(format!("invalid request body: {e}")))?
    };

    let report = state.runner.run(request).await?;
    Ok(Json(report))
}
