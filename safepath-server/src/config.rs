use std::{net::SocketAddr, path::Path};

use anyhow::Context;
use safepath_core::EngineConfig;
use serde::Deserialize;

/// Server settings read from the `[server]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen: SocketAddr,
    pub request_timeout_secs: u64,
    /// Requests handled at the same time; the rest wait
    pub concurrency_limit: usize,
    pub max_radius_m: f64,
    pub max_incidents_returned: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            request_timeout_secs: 30,
            concurrency_limit: 64,
            max_radius_m: 2_000.0,
            max_incidents_returned: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub engine: EngineConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.engine.validate()?;
        Ok(config)
    }
}
