//! OpenAPI document for the smoke runner, served at `/api/openapi.json`.

use utoipa::OpenApi;

use crate::api;
use crate::probes::models::{ProbeOutcome, RunReport};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "smokectl",
        description = "Run HTTP smoke tests against a site and report per-endpoint results."
    ),
    paths(api::handlers::smoke::run_smoke),
    components(schemas(api::models::smoke::RunRequest, RunReport, ProbeOutcome)),
    tags(
        (name = "smoke", description = "Smoke test runs"),
    )
)]
pub struct ApiDoc;
