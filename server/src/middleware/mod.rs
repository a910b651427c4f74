//! Middleware for the voucher API
//!
//! - Request ID tracing (X-Request-ID per request)

pub mod request_id;

pub use request_id::{RequestId, RequestIdMiddleware};
