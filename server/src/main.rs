use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use waypoint_server::{serve, ServerConfig, WaypointBook};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = ServerConfig::from_env()?;
    let book = Arc::new(RwLock::new(WaypointBook::new()));

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("Waypoint server listening on {}", config.bind_addr);

    serve(listener, book, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    })
    .await?;

    Ok(())
}
