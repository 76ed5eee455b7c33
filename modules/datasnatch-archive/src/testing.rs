//! Scripted transport for fetcher and pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use datasnatch_common::FetchError;

use crate::transport::{FetchTransport, TransportResponse};

/// One scripted reaction to a request.
#[derive(Debug, Clone)]
pub enum Step {
    Respond {
        status: u16,
        body: Vec<u8>,
        retry_after: Option<Duration>,
    },
    Fail(FetchError),
    /// Never completes; the Fetcher's timeout fires.
    Hang,
    Delayed(Duration, Box<Step>),
}

impl Step {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::Respond {
            status: 200,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Respond {
            status,
            body: Vec::new(),
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::Respond {
            status: 429,
            body: Vec::new(),
            retry_after,
        }
    }

    pub fn delayed(delay: Duration, then: Step) -> Self {
        Self::Delayed(delay, Box::new(then))
    }
}

/// Serves scripted steps per url. The last step of a script repeats forever;
/// unknown urls get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), steps.into());
    }

    /// Shorthand for a url that always answers 200 with `body`.
    pub fn page(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.script(url, vec![Step::ok(body)]);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, url: &str) -> Step {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Step::status(404)),
            Some(queue) => queue.front().cloned().unwrap_or(Step::status(404)),
            None => Step::status(404),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FetchTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let mut step = self.next_step(url);
        loop {
            match step {
                Step::Respond {
                    status,
                    body,
                    retry_after,
                } => {
                    return Ok(TransportResponse {
                        status,
                        body: Bytes::from(body),
                        retry_after,
                    })
                }
                Step::Fail(e) => return Err(e),
                Step::Hang => return std::future::pending().await,
                Step::Delayed(delay, then) => {
                    tokio::time::sleep(delay).await;
                    step = *then;
                }
            }
        }
    }
}
