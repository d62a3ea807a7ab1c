use anyhow::Result;
use hwmon_insights::handlers::{create_app, API_NAME, API_VERSION};
use hwmon_insights::models::config::AppConfig;
use hwmon_insights::utils::logging::init_logging;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before logging so the log level and directory apply
    let (config, load_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    let _log_guard = init_logging(&config.logging)?;

    info!("Starting {} v{}", API_NAME, API_VERSION);
    if let Some(e) = load_error {
        warn!("Falling back to default configuration: {}", e);
    }
    info!(
        data_dir = %config.data.directory.display(),
        methods = ?config.analysis.methods,
        "Configuration loaded"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = create_app(config);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Web server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
