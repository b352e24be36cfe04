use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cycle_core::Drivers;
use cycle_drivers::{HttpDriver, HttpDriverConfig, LogDriver, TcpDriver};
use cycle_sample::{flow, SampleConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("cycle=info".parse()?))
        .init();

    info!("Cycle sample starting...");

    let config = SampleConfig::from_env()?;
    config.log_summary();

    let drivers = Drivers::new()
        .with(LogDriver::new())?
        .with(HttpDriver::new(HttpDriverConfig {
            timeout: config.http_timeout,
            ..Default::default()
        })?)?
        .with(TcpDriver::bind(config.tcp_addr.as_str()).await?)?;

    let dialogue = cycle_core::run(flow(config.bootstrap_url.clone()), drivers)?;

    let shutdown = dialogue.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    dialogue.join().await?;
    info!("Cycle sample stopped");
    Ok(())
}
