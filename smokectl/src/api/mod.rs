//! HTTP surface of the smoke runner.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: request bodies accepted by the handlers
//!
//! Endpoints are documented with `utoipa`; the document is served at `/api/openapi.json`.

pub mod handlers;
pub mod models;
