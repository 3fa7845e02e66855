//! Demo configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, bail};

/// Which counter store backs the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Redis,
    Memory,
}

impl StoreKind {
    fn parse(value: &str) -> anyhow::Result<Self> {
        match value.to_lowercase().as_str() {
            "redis" => Ok(StoreKind::Redis),
            "memory" => Ok(StoreKind::Memory),
            other => bail!("unknown FLOOD_STORE '{other}', expected 'redis' or 'memory'"),
        }
    }
}

/// Demo configuration.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Window length N
    pub window: Duration,
    /// Quota K
    pub quota: u64,
    /// Per-check deadline
    pub check_timeout: Option<Duration>,
    pub store: StoreKind,
    pub user_id: i64,
    pub requests: u32,
    /// Pause between demo requests
    pub interval: Duration,
    /// How often the in-memory store purges expired windows
    pub sweep_interval: Duration,
}

impl DemoConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            window: Duration::from_secs(parse_var("FLOOD_WINDOW_SECS", 5)?),
            quota: parse_var("FLOOD_QUOTA", 5)?,
            check_timeout: env::var("FLOOD_CHECK_TIMEOUT_MS")
                .ok()
                .map(|ms| ms.parse().map(Duration::from_millis))
                .transpose()
                .context("FLOOD_CHECK_TIMEOUT_MS must be a whole number of milliseconds")?,
            store: StoreKind::parse(&env::var("FLOOD_STORE").unwrap_or_else(|_| "redis".into()))?,
            user_id: parse_var("DEMO_USER_ID", 1)?,
            requests: parse_var("DEMO_REQUESTS", 10)?,
            interval: Duration::from_millis(parse_var("DEMO_INTERVAL_MS", 0)?),
            sweep_interval: Duration::from_secs(parse_var("FLOOD_SWEEP_INTERVAL_SECS", 60)?),
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} has invalid value '{value}'")),
        Err(_) => Ok(default),
    }
}
