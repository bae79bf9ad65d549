use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use farmerbot_reconcile::DEFAULT_RECONCILE_INTERVAL;

use crate::db::DbConfig;
use crate::scheduler::DEFAULT_REFRESH_CONCURRENCY;

/// Which backend holds farm state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Postgres,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            other => bail!("unknown store {other:?}, expected memory or postgres"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    /// Configuration document used to seed the store.
    pub config_path: Option<PathBuf>,
    pub store: StoreKind,
    pub database: DbConfig,
    pub chain_url: String,
    pub reconcile_interval: Duration,
    pub agent_timeout: Duration,
    pub refresh_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("FARMERBOT_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .context("FARMERBOT_LISTEN_ADDR")?;

        let log_level =
            std::env::var("FARMERBOT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("FARMERBOT_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let config_path = std::env::var("FARMERBOT_CONFIG").ok().map(PathBuf::from);

        let store = std::env::var("FARMERBOT_STORE")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()?;

        let chain_url = std::env::var("FARMERBOT_CHAIN_URL")
            .context("FARMERBOT_CHAIN_URL must point at the chain gateway")?;

        let reconcile_interval = secs_from_env("FARMERBOT_RECONCILE_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL);
        let agent_timeout =
            secs_from_env("FARMERBOT_AGENT_TIMEOUT_SECS")?.unwrap_or(Duration::from_secs(10));

        let refresh_concurrency = match std::env::var("FARMERBOT_REFRESH_CONCURRENCY") {
            Ok(v) => v.parse().context("FARMERBOT_REFRESH_CONCURRENCY")?,
            Err(_) => DEFAULT_REFRESH_CONCURRENCY,
        };

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            config_path,
            store,
            database: DbConfig::from_env(),
            chain_url,
            reconcile_interval,
            agent_timeout,
            refresh_concurrency,
        })
    }
}

fn secs_from_env(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(v) => {
            let secs: u64 = v.parse().with_context(|| format!("{name} must be whole seconds"))?;
            if secs == 0 {
                bail!("{name} must be greater than zero");
            }
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind() {
        assert_eq!("memory".parse::<StoreKind>().unwrap(), StoreKind::Memory);
        assert_eq!("Postgres".parse::<StoreKind>().unwrap(), StoreKind::Postgres);
        assert!("redis".parse::<StoreKind>().is_err());
    }
}
