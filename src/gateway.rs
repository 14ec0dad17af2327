//! Rate-Limited Call Gateway
//!
//! Single choke point for every external call. Owns the shared quotas
//! (completion + search), the retry/backoff loop and the per-attempt
//! deadline. Cloned `Arc`s of one gateway are handed to every agent so
//! quota state stays global.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::conversation::ConversationMessage;
use crate::error::{OrchestrationError, Result, ServiceError};
use crate::rate_limit::{RateLimitConfig, SlidingWindowLimiter};
use crate::recovery::RetryPolicy;
use crate::services::{CompletionRequest, CompletionService, SearchService, MAX_COMPLETION_TOKENS};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub completion_limit: RateLimitConfig,
    pub search_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    /// Deadline for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            completion_limit: RateLimitConfig::completion(),
            search_limit: RateLimitConfig::search(),
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Which quota a call draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Completion,
    Search,
}

/// Bookkeeping for one in-flight call, dropped when the call returns
#[derive(Debug)]
struct CallRecord {
    kind: CallKind,
    attempts: u32,
    last_error: Option<ServiceError>,
    scheduled_at: Instant,
}

impl CallRecord {
    fn new(kind: CallKind) -> Self {
        Self {
            kind,
            attempts: 0,
            last_error: None,
            scheduled_at: Instant::now(),
        }
    }

    fn into_error(self) -> OrchestrationError {
        let source = self
            .last_error
            .unwrap_or_else(|| ServiceError::Transient("no attempt made".to_string()));
        match self.kind {
            CallKind::Completion => OrchestrationError::Upstream {
                attempts: self.attempts,
                source,
            },
            CallKind::Search => OrchestrationError::Search {
                attempts: self.attempts,
                source,
            },
        }
    }
}

struct GatewayMetrics {
    completions: AtomicU64,
    searches: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

impl GatewayMetrics {
    fn new() -> Self {
        Self {
            completions: AtomicU64::new(0),
            searches: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }
}

/// Snapshot of gateway activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Completion attempts dispatched
    pub completions: u64,
    /// Search attempts dispatched
    pub searches: u64,
    pub retries: u64,
    /// Calls that ended in an error
    pub failures: u64,
}

/// Shared gateway in front of the completion and search services
pub struct CallGateway {
    completion: Arc<dyn CompletionService>,
    search: Arc<dyn SearchService>,
    completion_window: SlidingWindowLimiter,
    search_window: SlidingWindowLimiter,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    metrics: GatewayMetrics,
}

impl CallGateway {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        search: Arc<dyn SearchService>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            completion,
            search,
            completion_window: SlidingWindowLimiter::new("completion", config.completion_limit),
            search_window: SlidingWindowLimiter::new("search", config.search_limit),
            retry: config.retry,
            attempt_timeout: config.attempt_timeout,
            metrics: GatewayMetrics::new(),
        }
    }

    /// Completion call with quota, retry and deadline
    pub async fn call(
        &self,
        system: &str,
        messages: &[ConversationMessage],
        max_tokens: usize,
    ) -> Result<String> {
        let request = CompletionRequest {
            system: system.to_string(),
            messages: messages.to_vec(),
            max_tokens: max_tokens.min(MAX_COMPLETION_TOKENS),
        };
        let completion = Arc::clone(&self.completion);
        self.dispatch(CallKind::Completion, || {
            let completion = Arc::clone(&completion);
            let request = request.clone();
            async move { completion.complete(&request).await }
        })
        .await
    }

    /// Convenience for the common single-user-turn call
    pub async fn call_prompt(&self, system: &str, prompt: &str, max_tokens: usize) -> Result<String> {
        self.call(system, &[ConversationMessage::user(prompt)], max_tokens)
            .await
    }

    /// Search call with quota, retry and deadline
    pub async fn search(&self, query: &str) -> Result<String> {
        let search = Arc::clone(&self.search);
        let query = query.to_string();
        self.dispatch(CallKind::Search, || {
            let search = Arc::clone(&search);
            let query = query.clone();
            async move { search.search(&query).await }
        })
        .await
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            completions: self.metrics.completions.load(Ordering::Relaxed),
            searches: self.metrics.searches.load(Ordering::Relaxed),
            retries: self.metrics.retries.load(Ordering::Relaxed),
            failures: self.metrics.failures.load(Ordering::Relaxed),
        }
    }

    async fn dispatch<F, Fut>(&self, kind: CallKind, mut operation: F) -> Result<String>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<String, ServiceError>> + Send + 'static,
    {
        let mut record = CallRecord::new(kind);
        let window = match kind {
            CallKind::Completion => &self.completion_window,
            CallKind::Search => &self.search_window,
        };

        loop {
            tokio::time::sleep(self.retry.jitter()).await;
            window.acquire().await;

            record.attempts += 1;
            match kind {
                CallKind::Completion => self.metrics.completions.fetch_add(1, Ordering::Relaxed),
                CallKind::Search => self.metrics.searches.fetch_add(1, Ordering::Relaxed),
            };

            // Spawned so an issued attempt finishes even if the caller gives up on it
            let attempt = tokio::spawn(tokio::time::timeout(self.attempt_timeout, operation()));
            let outcome = match attempt.await {
                Ok(outcome) => outcome,
                Err(e) => Ok(Err(ServiceError::Transient(format!("attempt task failed: {}", e)))),
            };

            let err = match outcome {
                Ok(Ok(text)) => {
                    debug!(
                        "{:?} call succeeded after {} attempt(s) in {:?}",
                        kind,
                        record.attempts,
                        record.scheduled_at.elapsed()
                    );
                    return Ok(text);
                }
                // Client-side timeouts count as the attempt deadline
                Ok(Err(ServiceError::Timeout)) | Err(_) => {
                    warn!("{:?} call exceeded {:?} deadline", kind, self.attempt_timeout);
                    self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                    return Err(OrchestrationError::Timeout(self.attempt_timeout));
                }
                Ok(Err(e)) => e,
            };

            let retryable = err.is_retryable();
            record.last_error = Some(err);

            if !retryable || record.attempts >= self.retry.max_attempts {
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                let err = record.into_error();
                warn!("{:?} call failed: {}", kind, err);
                return Err(err);
            }

            let delay = self.retry.delay_for_attempt(record.attempts - 1);
            info!(
                "Retrying {:?} call, attempt {} after {:?} ({})",
                kind,
                record.attempts + 1,
                delay,
                record
                    .last_error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_default()
            );
            self.metrics.retries.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedCompletion, ScriptedSearch};

    fn fast_config() -> GatewayConfig {
        GatewayConfig {
            retry: RetryPolicy {
                jitter_min: Duration::ZERO,
                jitter_max: Duration::ZERO,
                ..RetryPolicy::default()
            },
            ..GatewayConfig::default()
        }
    }

    fn gateway(completion: Arc<ScriptedCompletion>, search: Arc<ScriptedSearch>) -> CallGateway {
        CallGateway::new(completion, search, fast_config())
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let completion = Arc::new(ScriptedCompletion::always("hello"));
        let gw = gateway(completion.clone(), Arc::new(ScriptedSearch::always("{}")));

        let out = gw.call_prompt("sys", "hi", 100).await.unwrap();
        assert_eq!(out, "hello");
        assert_eq!(completion.call_count(), 1);
        assert_eq!(gw.stats().retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success() {
        let completion = Arc::new(ScriptedCompletion::from_results(vec![
            Err(ServiceError::RateLimited("429".into())),
            Err(ServiceError::Transient("503".into())),
            Ok("recovered".into()),
        ]));
        let gw = gateway(completion.clone(), Arc::new(ScriptedSearch::always("{}")));
        let start = Instant::now();

        let out = gw.call_prompt("sys", "hi", 100).await.unwrap();
        assert_eq!(out, "recovered");
        assert_eq!(completion.call_count(), 3);
        // 4s + 8s of backoff
        assert!(start.elapsed() >= Duration::from_secs(12));
        assert_eq!(gw.stats().retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_yields_single_upstream_error() {
        let completion = Arc::new(ScriptedCompletion::failing(ServiceError::RateLimited("429".into())));
        let gw = gateway(completion.clone(), Arc::new(ScriptedSearch::always("{}")));

        let err = gw.call_prompt("sys", "hi", 100).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Upstream { attempts: 5, .. }));
        assert_eq!(completion.call_count(), 5);
        assert_eq!(gw.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_not_retried() {
        let completion = Arc::new(ScriptedCompletion::failing(ServiceError::Auth("401".into())));
        let gw = gateway(completion.clone(), Arc::new(ScriptedSearch::always("{}")));

        let err = gw.call_prompt("sys", "hi", 100).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Upstream { attempts: 1, .. }));
        assert_eq!(completion.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_deadline() {
        let completion = Arc::new(
            ScriptedCompletion::always("late").with_latency(Duration::from_secs(31)),
        );
        let gw = gateway(completion, Arc::new(ScriptedSearch::always("{}")));

        let err = gw.call_prompt("sys", "hi", 100).await.unwrap_err();
        assert_eq!(err, OrchestrationError::Timeout(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_timeout_is_attempt_deadline() {
        let completion = Arc::new(ScriptedCompletion::failing(ServiceError::Timeout));
        let gw = gateway(completion.clone(), Arc::new(ScriptedSearch::always("{}")));

        let err = gw.call_prompt("sys", "hi", 100).await.unwrap_err();
        assert_eq!(err, OrchestrationError::Timeout(Duration::from_secs(30)));
        assert_eq!(completion.call_count(), 1);
        assert_eq!(gw.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_call_still_completes() {
        let completion = Arc::new(
            ScriptedCompletion::always("late").with_latency(Duration::from_secs(10)),
        );
        let gw = gateway(completion.clone(), Arc::new(ScriptedSearch::always("{}")));

        let abandoned = tokio::time::timeout(Duration::from_secs(2), gw.call_prompt("sys", "hi", 100)).await;
        assert!(abandoned.is_err());
        assert_eq!(completion.finished_count(), 0);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(completion.call_count(), 1);
        assert_eq!(completion.finished_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_failure_is_search_error() {
        let search = Arc::new(ScriptedSearch::failing(ServiceError::Malformed("400".into())));
        let gw = gateway(Arc::new(ScriptedCompletion::always("x")), search.clone());

        let err = gw.search("anything").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Search { attempts: 1, .. }));
        assert_eq!(search.queries(), vec!["anything".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quotas_hold_under_concurrency() {
        let completion = Arc::new(ScriptedCompletion::always("ok"));
        let search = Arc::new(ScriptedSearch::always("{}"));
        let gw = Arc::new(gateway(completion.clone(), search.clone()));

        let mut handles = Vec::new();
        for i in 0..50 {
            let gw = Arc::clone(&gw);
            handles.push(tokio::spawn(async move {
                gw.call_prompt("sys", &format!("call {}", i), 10).await
            }));
        }
        for i in 0..25 {
            let gw = Arc::clone(&gw);
            handles.push(tokio::spawn(async move { gw.search(&format!("q {}", i)).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let window = Duration::from_secs(60);
        let max_in_window = |times: &[Instant]| {
            times
                .iter()
                .map(|&t| {
                    times
                        .iter()
                        .filter(|&&u| u >= t && u.duration_since(t) < window)
                        .count()
                })
                .max()
                .unwrap_or(0)
        };

        assert_eq!(completion.call_times().len(), 50);
        assert_eq!(search.call_times().len(), 25);
        assert!(max_in_window(&completion.call_times()) <= 40);
        assert!(max_in_window(&search.call_times()) <= 20);
    }
}
