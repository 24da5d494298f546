//! OpenAI-compatible wire format
//!
//! - `types`: request/response bodies
//! - `request`: body parsing and normalization
//! - `response`: JSON responses and the error envelope

pub mod request;
pub mod response;
pub mod types;
