//! Certy API Server
//!
//! Configuration comes from `CERTY_CONFIG` (a TOML file) when set, with
//! environment variables taking precedence.

use certy_api::{create_router, state::AppState};
use certy_core::config::{AppConfig, LoggingConfig};
use std::sync::Arc;

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("{},tower_http=info", logging.level).into()
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("CERTY_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.logging);

    tokio::fs::create_dir_all(&config.storage.upload_dir).await?;
    tokio::fs::create_dir_all(&config.storage.output_dir).await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Auto-Certy API starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
