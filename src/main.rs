use anyhow::Result;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use transform_intake::app;
use transform_intake::config::settings::AppConfig;
use transform_intake::runtime::Runtime;
use transform_intake::shutdown::install_shutdown_handler;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("transform_intake=info,tower_http=info")),
        )
        .init();

    info!("Starting transformation intake...");

    let config = AppConfig::new()?;
    let port = config.server_port;
    let runtime = Runtime::start(config).await?;
    let app = app::create_app(runtime.state.clone());

    let token = install_shutdown_handler()?;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Server running on http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;

    info!("HTTP server stopped, shutting down runtime");
    runtime.shutdown().await
}
