use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api_rest::{router, ApiDoc, AppState};
use lers_core::{repositories::schema, CoreConfig};

/// Main entry point for the laboratory exam results service.
///
/// Starts the REST server on port 8000 (configurable via LERS_ADDR). On
/// startup the PostgreSQL schema is created if it does not exist, so a fresh
/// database needs no separate migration step.
///
/// # Environment Variables
/// - `LERS_ADDR`: server address (default: "0.0.0.0:8000")
/// - `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`: PostgreSQL connection
/// - `DB_TIMEZONE`: session time zone (default: "UTC")
/// - `CLIENT_ID`, `CLIENT_SECRET`: lab submitter credentials
/// - `TOKEN_TTL_SECS`: bearer token lifetime (default: 900)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If startup or runtime fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lers_run=info".parse()?)
                .add_directive("lers_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(CoreConfig::from_env()?);
    tracing::info!("++ Starting exam results service on {}", cfg.bind_addr());

    let pool = schema::connect(&cfg).await?;
    schema::init_schema(&pool).await?;

    let app = router(AppState::new(pool, cfg.clone())).merge(
        SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr()).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
