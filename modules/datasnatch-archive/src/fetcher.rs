use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use datasnatch_common::file_config::FetchConfig;
use datasnatch_common::{FetchError, FetchTask, RawPage};
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info, warn};

use crate::backoff::ExponentialBackoff;
use crate::transport::{FetchTransport, TransportResponse};

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub max_rate_limited_attempts: u32,
    pub backoff: ExponentialBackoff,
    pub retry_after_max: Duration,
}

impl From<&FetchConfig> for FetcherConfig {
    fn from(c: &FetchConfig) -> Self {
        Self {
            concurrency: c.concurrency.max(1),
            request_timeout: c.request_timeout(),
            max_attempts: c.max_attempts.max(1),
            max_rate_limited_attempts: c.max_rate_limited_attempts.max(1),
            backoff: ExponentialBackoff::new(c.backoff_base_ms, c.backoff_max_ms),
            retry_after_max: Duration::from_secs(c.retry_after_max_secs),
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

/// Terminal outcome of one fetch task. Exactly one is emitted per task.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    Succeeded {
        url: String,
        attempts: u32,
        status: u16,
        bytes: usize,
    },
    Failed {
        url: String,
        attempts: u32,
        error: FetchError,
    },
}

impl FetchEvent {
    pub fn url(&self) -> &str {
        match self {
            Self::Succeeded { url, .. } | Self::Failed { url, .. } => url,
        }
    }
}

/// Bounded-concurrency retrieval over a [`FetchTransport`].
///
/// The semaphore permit is held for a single attempt only, so a task sleeping
/// in backoff does not occupy a slot.
pub struct Fetcher {
    transport: Arc<dyn FetchTransport>,
    semaphore: Arc<Semaphore>,
    config: FetcherConfig,
    events: Option<mpsc::UnboundedSender<FetchEvent>>,
    cancel: Option<watch::Receiver<bool>>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn FetchTransport>, config: FetcherConfig) -> Self {
        info!(
            concurrency = config.concurrency,
            timeout_secs = config.request_timeout.as_secs(),
            max_attempts = config.max_attempts,
            "Fetcher initialized"
        );
        Self {
            transport,
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            config,
            events: None,
            cancel: None,
        }
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<FetchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_cancel(mut self, rx: watch::Receiver<bool>) -> Self {
        self.cancel = Some(rx);
        self
    }

    /// Same transport, permit pool and event sink, without the cancel flag.
    /// Follow-up fetches for work that has already started go through this so
    /// a cancelled run drains them instead of cutting them short.
    pub fn uncancellable(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            semaphore: self.semaphore.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
            cancel: None,
        }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch one task to a terminal outcome.
    pub async fn fetch(&self, task: FetchTask) -> Result<RawPage, FetchError> {
        let mut task = task;
        let mut transient_failures = 0u32;
        let mut rate_limited = 0u32;

        loop {
            if self.is_cancelled() {
                return self.finish(&task, Err(FetchError::Cancelled));
            }

            let (error, retry_after) = match self.attempt(&task.url).await {
                Ok(resp) if (200..300).contains(&resp.status) => {
                    let page = RawPage {
                        url: task.url.clone(),
                        status: resp.status,
                        body: resp.body.to_vec(),
                        fetched_at: Utc::now(),
                    };
                    return self.finish(&task, Ok(page));
                }
                Ok(resp) => (FetchError::HttpStatus(resp.status), resp.retry_after),
                Err(e) => (e, None),
            };

            let delay = if error.is_rate_limited() {
                rate_limited += 1;
                if rate_limited >= self.config.max_rate_limited_attempts {
                    return self.finish(&task, Err(error));
                }
                retry_after
                    .map(|d| d.min(self.config.retry_after_max))
                    .unwrap_or_else(|| self.config.backoff.delay(rate_limited - 1))
            } else if error.is_transient() {
                transient_failures += 1;
                if transient_failures >= self.config.max_attempts {
                    return self.finish(&task, Err(error));
                }
                self.config.backoff.delay(transient_failures - 1)
            } else {
                return self.finish(&task, Err(error));
            };

            warn!(
                url = task.url.as_str(),
                attempt = task.attempt + 1,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Fetch attempt failed, retrying"
            );
            task = task.retry_after(delay);

            if self.sleep_unless_cancelled(delay).await {
                return self.finish(&task, Err(FetchError::Cancelled));
            }
        }
    }

    /// One attempt: holds a permit and enforces the request timeout.
    async fn attempt(&self, url: &str) -> Result<TransportResponse, FetchError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Cancelled)?;

        debug!(url, "Fetching");
        match tokio::time::timeout(self.config.request_timeout, self.transport.get(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }

    fn finish(
        &self,
        task: &FetchTask,
        outcome: Result<RawPage, FetchError>,
    ) -> Result<RawPage, FetchError> {
        let attempts = task.attempt + 1;
        let event = match &outcome {
            Ok(page) => {
                info!(url = task.url.as_str(), attempts, status = page.status, bytes = page.body.len(), "Fetched");
                FetchEvent::Succeeded {
                    url: task.url.clone(),
                    attempts,
                    status: page.status,
                    bytes: page.body.len(),
                }
            }
            Err(error) => {
                warn!(url = task.url.as_str(), attempts, error = %error, "Fetch failed");
                FetchEvent::Failed {
                    url: task.url.clone(),
                    attempts,
                    error: error.clone(),
                }
            }
        };
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
        outcome
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Sleep for `delay`; returns true if cancellation arrived first.
    async fn sleep_unless_cancelled(&self, delay: Duration) -> bool {
        match &self.cancel {
            None => {
                tokio::time::sleep(delay).await;
                false
            }
            Some(rx) => {
                let mut rx = rx.clone();
                let cancelled = async move {
                    let sender_gone = rx.wait_for(|cancelled| *cancelled).await.is_err();
                    if sender_gone {
                        std::future::pending::<()>().await;
                    }
                };
                tokio::select! {
                    _ = tokio::time::sleep(delay) => false,
                    _ = cancelled => true,
                }
            }
        }
    }
}
