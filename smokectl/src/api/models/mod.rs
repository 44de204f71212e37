//! Request/response data structures for API communication.
//!
//! The run report itself lives in [`crate::probes::models`]; it is serialized as-is.

pub mod smoke;
