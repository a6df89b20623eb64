//! Reference waypoint source for fleetnav
//!
//! Serves waypoints over HTTP:
//! - `POST /waypoints` loads devices, waypoints and per-waypoint delays
//! - `GET /waypoints/{device_id}` returns that device's next waypoint
//! - `GET /waypoints` returns the next waypoint from the shared pool
//! - `GET /devices/{device_id}/{index}` returns a waypoint by index

pub mod book;
pub mod config;
pub mod routes;

pub use book::{Issued, WaypointBook};
pub use config::ServerConfig;
pub use routes::{router, SharedBook};

use std::future::Future;
use tokio::net::TcpListener;

/// Serve the waypoint API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, book: SharedBook, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(book))
        .with_graceful_shutdown(shutdown)
        .await
}
