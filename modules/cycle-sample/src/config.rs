use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Sample configuration loaded from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub tcp_addr: String,
    /// Fetched once at startup when set.
    pub bootstrap_url: Option<String>,
    pub http_timeout: Duration,
}

impl SampleConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let http_timeout_secs: u64 = env::var("CYCLE_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("CYCLE_HTTP_TIMEOUT_SECS must be a number of seconds")?;

        Ok(Self {
            tcp_addr: env::var("CYCLE_TCP_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            bootstrap_url: env::var("CYCLE_BOOTSTRAP_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }

    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  CYCLE_TCP_ADDR: {}", self.tcp_addr);
        tracing::info!(
            "  CYCLE_BOOTSTRAP_URL: {}",
            self.bootstrap_url.as_deref().unwrap_or("<not set>")
        );
        tracing::info!("  CYCLE_HTTP_TIMEOUT_SECS: {}", self.http_timeout.as_secs());
    }
}
