//! HTTP request handlers.
//!
//! Handlers return [`crate::errors::Error`] on failure, which converts into a status code and
//! a JSON `{"error": ...}` body.

pub mod smoke;
