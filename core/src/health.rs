//! Health polling for freshly started server instances

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default number of probes before a server is declared dead.
pub const DEFAULT_MAX_RETRIES: u32 = 30;

/// Default pause between consecutive probes.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls a server's health endpoint until it answers or the budget runs out
///
/// The readiness contract is intentionally permissive: any HTTP response,
/// including non-2xx, counts as ready. Only transport-level failures (the
/// server is not accepting connections yet) trigger a sleep-and-retry.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    max_retries: u32,
    retry_interval: Duration,
    client: reqwest::Client,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL)
    }
}

impl HealthChecker {
    /// Create a checker with a custom retry budget and probe interval
    pub fn new(max_retries: u32, retry_interval: Duration) -> Self {
        Self {
            max_retries,
            retry_interval,
            client: reqwest::Client::new(),
        }
    }

    /// Number of probes issued before giving up
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Block until the health endpoint at `url` answers
    ///
    /// # Errors
    /// [`Error::Unhealthy`] after `max_retries` consecutive probe failures.
    pub async fn wait_until_healthy(&self, url: &str) -> Result<()> {
        let ready = self
            .wait_with_probe(|| {
                let client = self.client.clone();
                let url = url.to_string();
                async move {
                    match client.get(&url).timeout(PROBE_TIMEOUT).send().await {
                        // Response content and status are not inspected.
                        Ok(_) => true,
                        Err(error) => {
                            tracing::debug!(%url, %error, "health probe failed");
                            false
                        }
                    }
                }
            })
            .await;

        if ready {
            Ok(())
        } else {
            Err(Error::Unhealthy {
                url: url.to_string(),
                attempts: self.max_retries,
            })
        }
    }

    /// Drive the retry loop with a custom probe
    ///
    /// Issues at most `max_retries` probes, sleeping `retry_interval` between
    /// consecutive failures (but not after the last one). Returns whether any
    /// probe reported ready.
    pub async fn wait_with_probe<F, Fut>(&self, mut probe: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for attempt in 1..=self.max_retries {
            if probe().await {
                return true;
            }
            if attempt < self.max_retries {
                tokio::time::sleep(self.retry_interval).await;
            }
        }
        false
    }
}
