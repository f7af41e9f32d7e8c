use std::net::SocketAddr;

use anyhow::Context;
use spoolscout_flowise::{SupervisorConfig, config::parse_bool};

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:5000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub http_addr: SocketAddr,
    pub flowise_autostart: bool,
    pub flowise: SupervisorConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok(), SupervisorConfig::from_env())
    }

    /// Builds the config from `lookup` instead of the process environment.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        flowise: SupervisorConfig,
    ) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required"))?;

        let raw_addr = lookup("SPOOLSCOUT_HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let http_addr = raw_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid SPOOLSCOUT_HTTP_ADDR: {raw_addr}"))?;

        let flowise_autostart = lookup("SPOOLSCOUT_FLOWISE_AUTOSTART")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(true);

        Ok(Self {
            database_url,
            http_addr,
            flowise_autostart,
            flowise,
        })
    }
}
