//! # API Shared
//!
//! Shared utilities and definitions for the exam results APIs.
//!
//! Contains:
//! - The HTTP error envelope (`ApiError`)
//! - Bearer-token extraction (`auth` module)
//! - The `HealthService` used by the liveness endpoint
//!
//! Used by `api-rest` so that transport plumbing stays out of `lers-core`.

pub mod auth;
pub mod error;
pub mod health;

pub use error::{ApiError, ApiResult};
pub use health::{HealthRes, HealthService};
