use clap::{Parser, ValueEnum};
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tinylink_shortener::config::DEFAULT_LEASE_NAME;

pub const DATABASE_URL_ENV: &str = "TINYLINK_DATABASE_URL";
pub const DATABASE_MAX_CONNECTIONS_ENV: &str = "TINYLINK_DATABASE_MAX_CONNECTIONS";
pub const REDIS_URL_ENV: &str = "TINYLINK_REDIS_URL";
pub const REDIS_NAMESPACE_ENV: &str = "TINYLINK_REDIS_NAMESPACE";
pub const INTERVAL_MS_ENV: &str = "TINYLINK_CONSOLIDATION_INTERVAL_MS";
pub const LEASE_NAME_ENV: &str = "TINYLINK_LEASE_NAME";
pub const LEASE_TTL_MS_ENV: &str = "TINYLINK_LEASE_TTL_MS";
pub const LOG_FORMAT_ENV: &str = "TINYLINK_LOG_FORMAT";

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[value(name = "text")]
    Text,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormatArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormatArg::Text => write!(f, "text"),
            LogFormatArg::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tinylink-consolidator")]
pub struct CLI {
    #[arg(long, env = DATABASE_URL_ENV)]
    pub database_url: String,

    #[arg(long, env = DATABASE_MAX_CONNECTIONS_ENV, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,

    #[arg(long, env = REDIS_URL_ENV, default_value = DEFAULT_REDIS_URL)]
    pub redis_url: String,

    /// Prefix applied to every Redis key.
    #[arg(long, env = REDIS_NAMESPACE_ENV, default_value = "")]
    pub redis_namespace: String,

    #[arg(long, env = INTERVAL_MS_ENV, default_value_t = 5_000)]
    pub interval_ms: u64,

    #[arg(long, env = LEASE_NAME_ENV, default_value = DEFAULT_LEASE_NAME)]
    pub lease_name: String,

    #[arg(long, env = LEASE_TTL_MS_ENV, default_value_t = 10_000)]
    pub lease_ttl_ms: u64,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,
}

impl CLI {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }
}
