use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
        }
    }
}

impl ServerConfig {
    /// Read `WAYPOINT_SERVER_ADDR`, falling back to `0.0.0.0:5000`
    pub fn from_env() -> Result<Self> {
        match env::var("WAYPOINT_SERVER_ADDR") {
            Ok(addr) => Ok(Self {
                bind_addr: addr
                    .parse()
                    .with_context(|| format!("invalid WAYPOINT_SERVER_ADDR: {}", addr))?,
            }),
            Err(_) => Ok(Self::default()),
        }
    }
}
