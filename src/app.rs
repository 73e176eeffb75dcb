use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::infrastructure::config::AppConfig;

pub fn run() -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    actix_web::rt::System::new().block_on(serve())
}

async fn serve() -> std::io::Result<()> {
    let config = AppConfig::load().map_err(|err| {
        error!(error = %err, "Failed to load configuration");
        std::io::Error::other(err.to_string())
    })?;

    let orchestrator = crate::infrastructure::bootstrap::setup(&config)
        .await
        .map_err(|err| std::io::Error::other(err.to_string()))?;

    info!(host = %config.server.host, port = config.server.port, "Starting brewdesk");
    crate::interfaces::http::start_server(orchestrator, &config.server.host, config.server.port)?
        .await
}
