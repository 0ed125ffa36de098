//! `HealthChecker` that polls an HTTP endpoint until it answers 2xx.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::application::ports::HealthChecker;
use crate::domain::AgentConfig;

/// Polls `health_url` up to `attempts` times, `delay` apart.
#[derive(Debug, Clone)]
pub struct HttpHealthChecker {
    client: reqwest::Client,
    url: String,
    attempts: u32,
    delay: Duration,
}

impl HttpHealthChecker {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let delay = Duration::from_secs(config.health.delay_secs);
        let client = reqwest::Client::builder()
            .timeout(delay.max(Duration::from_secs(5)))
            .build()
            .context("building health-check HTTP client")?;
        Ok(Self {
            client,
            url: config.health_url.clone(),
            attempts: config.health.attempts,
            delay,
        })
    }

    async fn probe(&self) -> std::result::Result<(), String> {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(format!("HTTP {}", response.status())),
            Err(e) => Err(e.to_string()),
        }
    }
}

impl HealthChecker for HttpHealthChecker {
    async fn check(&self) -> Result<()> {
        let mut last_failure = String::from("no attempt made");
        for attempt in 1..=self.attempts {
            match self.probe().await {
                Ok(()) => {
                    info!(url = %self.url, attempt, "health check passed");
                    return Ok(());
                }
                Err(reason) => {
                    debug!(url = %self.url, attempt, %reason, "health check attempt failed");
                    last_failure = reason;
                }
            }
            if attempt < self.attempts {
                tokio::time::sleep(self.delay).await;
            }
        }
        anyhow::bail!(
            "{} not healthy after {} attempts: {last_failure}",
            self.url,
            self.attempts
        )
    }
}
