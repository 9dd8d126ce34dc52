use std::env;
use std::net::{IpAddr, SocketAddr};

use anyhow::Context;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://students.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
}

impl Config {
    /// Reads `HOST`, `PORT` and `DATABASE_URL`, after loading `.env` if one exists.
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
        Self::from_vars(
            env::var("HOST").ok(),
            env::var("PORT").ok(),
            env::var("DATABASE_URL").ok(),
        )
    }

    pub fn from_vars(
        host: Option<String>,
        port: Option<String>,
        database_url: Option<String>,
    ) -> anyhow::Result<Self> {
        let host: IpAddr = match host {
            Some(host) => host
                .parse()
                .with_context(|| format!("HOST `{}` is not an IP address", host))?,
            None => IpAddr::from([127, 0, 0, 1]),
        };
        let port: u16 = match port {
            Some(port) => port
                .parse()
                .with_context(|| format!("PORT `{}` is not a valid port number", port))?,
            None => 3000,
        };

        Ok(Self {
            addr: SocketAddr::new(host, port),
            database_url: database_url.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
        })
    }
}
