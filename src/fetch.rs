//! Page fetching with a bounded, fixed-delay retry.
//!
//! The module uses a trait-based design so the scheduler never talks to
//! `reqwest` directly:
//! - [`PageFetch`]: one GET attempt for a URL
//! - [`HttpFetcher`]: the real client, with a browser user agent and timeout
//! - [`Retrying`]: decorator that repeats a [`PageFetch`] a bounded number of
//!   times and reports [`MonitorError::FetchExhausted`] when every attempt fails
//!
//! # Retry Strategy
//!
//! - At most `max_attempts` calls to the inner fetcher, never more
//! - A fixed `retry_delay` between attempts, none after the last one
//! - Any HTTP response counts as success; status codes are not inspected

use crate::error::{BoxError, MonitorError};
use crate::models::Target;
use crate::utils::truncate_for_log;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, instrument, warn};

/// User agent sent with every request; some listing sites reject unknown clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// A single attempt at downloading a page body.
pub trait PageFetch {
    /// Fetch `url` once and return the body as text.
    fn get(&self, url: &str) -> impl Future<Output = Result<String, BoxError>> + Send;
}

/// `reqwest`-backed [`PageFetch`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Build a client with the fixed user agent.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Bound on each attempt, from connect to the last body byte
    ///
    /// # Errors
    ///
    /// [`MonitorError::HttpClient`] if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, MonitorError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client, timeout })
    }
}

impl PageFetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn get(&self, url: &str) -> Result<String, BoxError> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(
            %status,
            bytes = body.len(),
            preview = %truncate_for_log(&body, 120),
            "Fetched page"
        );
        Ok(body)
    }
}

/// Wrapper that adds bounded retries to any [`PageFetch`] implementation.
pub struct Retrying<T> {
    /// The underlying fetcher.
    inner: T,
    /// Total attempts per call, including the first.
    max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    retry_delay: Duration,
}

impl<T> Retrying<T>
where
    T: PageFetch,
{
    /// Wrap `inner` with a retry policy.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fetcher making each single attempt
    /// * `max_attempts` - Total attempts per call, including the first
    /// * `retry_delay` - Fixed pause after each failed attempt but the last
    ///
    /// # Example
    ///
    /// ```ignore
    /// let fetcher = Retrying::new(HttpFetcher::new(timeout)?, 2, Duration::from_millis(1500));
    /// ```
    pub fn new(inner: T, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts,
            retry_delay,
        }
    }

    /// Fetch the target's page, retrying up to `max_attempts` times.
    ///
    /// # Returns
    ///
    /// The body of the first attempt that got any HTTP response.
    ///
    /// # Errors
    ///
    /// [`MonitorError::FetchExhausted`] once every attempt has failed.
    #[instrument(level = "info", skip_all, fields(label = %target.label, url = %target.url))]
    pub async fn fetch(&self, target: &Target) -> Result<String, MonitorError> {
        let total_t0 = Instant::now();

        for attempt in 1..=self.max_attempts {
            info!(attempt, max = self.max_attempts, "Fetching page");
            let attempt_t0 = Instant::now();

            match self.inner.get(&target.url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                        error = %e,
                        "Fetch attempt failed"
                    );
                    if attempt < self.max_attempts {
                        debug!(delay = ?self.retry_delay, "Retrying after delay");
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        error!(
            attempts = self.max_attempts,
            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
            "Fetch exhausted retries"
        );
        Err(MonitorError::FetchExhausted {
            label: target.label.clone(),
            url: target.url.clone(),
            attempts: self.max_attempts,
        })
    }
}

impl<T> fmt::Debug for Retrying<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrying")
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}
