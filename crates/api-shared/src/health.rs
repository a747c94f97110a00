//! Liveness checks backed by the database pool.

use serde::Serialize;
use sqlx::PgPool;

/// Health report returned by the liveness endpoint.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Health service shared by transports.
///
/// A check is a round-trip `SELECT 1` so that a healthy report also vouches
/// for database connectivity, not just for the process being up.
#[derive(Clone)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Probes the database and reports the outcome.
    pub async fn check(pool: &PgPool) -> HealthRes {
        match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await {
            Ok(_) => HealthRes {
                ok: true,
                message: "exam results service is alive".into(),
            },
            Err(e) => {
                tracing::error!(error = %e, "health check failed");
                HealthRes {
                    ok: false,
                    message: "database unreachable".into(),
                }
            }
        }
    }
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}
