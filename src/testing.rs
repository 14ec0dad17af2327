//! Deterministic Service Doubles
//!
//! In-memory completion and search services that answer from a script and
//! record every request. Used by the test suites and handy for offline runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::ServiceError;
use crate::services::{CompletionRequest, CompletionService, SearchService};

type CompletionHandler =
    Box<dyn Fn(&CompletionRequest) -> Result<String, ServiceError> + Send + Sync>;
type LatencyFn = Box<dyn Fn(&CompletionRequest) -> Duration + Send + Sync>;
type SearchHandler = Box<dyn Fn(&str) -> Result<String, ServiceError> + Send + Sync>;

/// Completion service answering through a handler function
pub struct ScriptedCompletion {
    handler: CompletionHandler,
    latency: LatencyFn,
    requests: Mutex<Vec<CompletionRequest>>,
    times: Mutex<Vec<Instant>>,
    finished: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new(
        handler: impl Fn(&CompletionRequest) -> Result<String, ServiceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            latency: Box::new(|_| Duration::ZERO),
            requests: Mutex::new(Vec::new()),
            times: Mutex::new(Vec::new()),
            finished: AtomicUsize::new(0),
        }
    }

    /// Same text for every request
    pub fn always(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Same fault for every request
    pub fn failing(error: ServiceError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    /// Play results back in order; once exhausted every call is transient
    pub fn from_results(results: Vec<Result<String, ServiceError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(results));
        Self::new(move |_| {
            queue
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Transient("script exhausted".to_string())))
        })
    }

    /// Delay every answer by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Box::new(move |_| latency);
        self
    }

    /// Delay each answer by a per-request amount
    pub fn with_latency_by(
        mut self,
        latency: impl Fn(&CompletionRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.latency = Box::new(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Requests whose system prompt contains `needle`
    pub fn requests_matching(&self, needle: &str) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.system.contains(needle))
            .cloned()
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.times.lock().clone()
    }

    /// Requests that ran to the end, latency included
    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        self.requests.lock().push(request.clone());
        self.times.lock().push(Instant::now());
        let latency = (self.latency)(request);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        (self.handler)(request)
    }
}

/// Search service answering through a handler function
pub struct ScriptedSearch {
    handler: SearchHandler,
    queries: Mutex<Vec<String>>,
    times: Mutex<Vec<Instant>>,
}

impl ScriptedSearch {
    pub fn new(handler: impl Fn(&str) -> Result<String, ServiceError> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            queries: Mutex::new(Vec::new()),
            times: Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn failing(error: ServiceError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    pub fn call_count(&self) -> usize {
        self.queries.lock().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.times.lock().clone()
    }
}

#[async_trait]
impl SearchService for ScriptedSearch {
    async fn search(&self, query: &str) -> Result<String, ServiceError> {
        self.queries.lock().push(query.to_string());
        self.times.lock().push(Instant::now());
        (self.handler)(query)
    }
}
