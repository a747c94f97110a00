//! Database connection and schema bootstrap.

use crate::config::CoreConfig;
use crate::CoreResult;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

/// Upper bound on pooled connections; requests queue beyond this.
const MAX_CONNECTIONS: u32 = 10;

fn connect_options(cfg: &CoreConfig) -> PgConnectOptions {
    let db = cfg.db();
    PgConnectOptions::new()
        .host(&db.host)
        .port(db.port)
        .username(&db.user)
        .password(&db.password)
        .database(&db.name)
        .options([("TimeZone", db.timezone.as_str())])
}

/// Opens a connection pool against the configured database.
///
/// # Errors
///
/// Returns `CoreError::Storage` if the database is unreachable or refuses the
/// credentials.
pub async fn connect(cfg: &CoreConfig) -> CoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(connect_options(cfg))
        .await?;
    Ok(pool)
}

/// Opens a pool without establishing a connection.
///
/// Useful for wiring state in tests; the first query will surface connection
/// failures as `CoreError::Storage`.
pub fn connect_lazy(cfg: &CoreConfig) -> PgPool {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_lazy_with(connect_options(cfg))
}

/// Creates the LERS tables and indexes if they do not already exist.
///
/// Statements are idempotent so the service can be restarted against an
/// existing database without a separate migration step.
pub async fn init_schema(pool: &PgPool) -> CoreResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS patients (
            id UUID PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            access_code_sha256 TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            deleted_at TIMESTAMPTZ
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS exam_results (
            id UUID PRIMARY KEY,
            patient_id UUID NOT NULL REFERENCES patients(id),
            exam_type TEXT NOT NULL,
            payload JSONB NOT NULL,
            status TEXT NOT NULL,
            requested_at DATE,
            notes TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            deleted_at TIMESTAMPTZ
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_exam_results_patient
         ON exam_results (patient_id) WHERE deleted_at IS NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS exam_result_audit (
            id UUID PRIMARY KEY,
            result_id UUID NOT NULL REFERENCES exam_results(id),
            action TEXT NOT NULL,
            actor_role TEXT NOT NULL,
            actor_client_id TEXT,
            recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_exam_result_audit_result
         ON exam_result_audit (result_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS auth_tokens (
            id UUID PRIMARY KEY,
            token TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL,
            client_id TEXT,
            patient_id UUID,
            expires_at TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_auth_tokens_expiry ON auth_tokens (expires_at)")
        .execute(pool)
        .await?;

    tracing::info!("database schema initialised");
    Ok(())
}
