//! HTTP client layer for EvaluationKit public reports.

pub mod client;
pub mod cookies;
pub mod errors;
pub mod json;
pub mod retry;

pub use client::{EvalKitClient, FetchRequest, RedirectGuard};
pub use errors::FetchError;
pub use retry::RetryPolicy;
