//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging. Deployments normally run the
//! workspace's main `lers-run` binary, which does the same wiring.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api_rest::{router, ApiDoc, AppState};
use lers_core::{repositories::schema, CoreConfig};

/// Main entry point for the exam results REST API server.
///
/// Resolves configuration from the environment, connects to PostgreSQL,
/// initialises the schema and serves the API with Swagger UI mounted at
/// `/swagger-ui`.
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is missing or invalid,
/// - the database is unreachable,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("lers_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(CoreConfig::from_env()?);
    tracing::info!("-- Starting exam results REST API on {}", cfg.bind_addr());

    let pool = schema::connect(&cfg).await?;
    schema::init_schema(&pool).await?;

    let state = AppState::new(pool, cfg.clone());
    let app = router(state).merge(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr()).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
