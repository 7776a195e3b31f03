mod cli;

use crate::cli::{LogFormatArg, CLI};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tinylink_cache::RedisKvCache;
use tinylink_shortener::{ConsolidationConfig, ConsolidationJob};
use tinylink_storage::PostgresRepository;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormatArg) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormatArg::Text => builder.init(),
        LogFormatArg::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::try_parse()?;
    init_tracing(config.log_format);

    info!(
        interval_ms = config.interval_ms,
        lease_name = %config.lease_name,
        lease_ttl_ms = config.lease_ttl_ms,
        "starting access count consolidator"
    );

    let repository = PostgresRepository::connect(&config.database_url, config.max_connections)
        .await
        .context("failed to connect to postgres")?;
    repository
        .migrate()
        .await
        .context("failed to apply migrations")?;

    let cache = RedisKvCache::connect(&config.redis_url, config.redis_namespace.clone())
        .await
        .context("failed to connect to redis")?;

    let job_config = ConsolidationConfig::builder()
        .interval(config.interval())
        .lease_name(config.lease_name.clone())
        .lease_ttl(config.lease_ttl())
        .build();
    let handle = ConsolidationJob::new(Arc::new(repository), Arc::new(cache), job_config).spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    handle.shutdown().await;
    Ok(())
}
