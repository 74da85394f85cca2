//! The delivery transport.
//!
//! `write()` does all of its bookkeeping synchronously (validation, the
//! rate-window increment, sanitization, and the spawn) so events keep their
//! admission order. Each admitted event then runs its own delivery task:
//!
//! ```text
//! Admitted -> Sanitized -> Sending -> Delivered
//!                             |
//!                             +-> Retrying -> Sending
//!                             +-> Exhausted -> Queued | Discarded
//! ```
//!
//! Queued events leave through [`DeliveryTransport::flush`], which also runs
//! when connectivity comes back and once more during [`DeliveryTransport::close`].

pub mod capabilities;
pub mod sanitized;
pub mod stats;

pub use capabilities::{Capabilities, Connectivity};
pub use sanitized::SanitizedEvent;
pub use stats::TransportStatsSnapshot;

use crate::auth::{IssuedToken, SecretToken, SecureTokenHandler, TokenError, TokenSource};
use crate::config::{ConfigError, TransportConfig};
use crate::diagnostics::{DiagnosticKind, DiagnosticSink, Diagnostics, TracingSink};
use crate::domain::{EventInput, LogEvent, ValidationError};
use crate::reliability::{
    Admission, DeliveryAttempt, OfflineQueue, OfflineQueueConfig, RateLimiter, RetryPolicy,
};
use crate::sanitizer::Sanitizer;
use crate::sender::{
    CompressionAdapter, EventSender, HttpSender, Route, SendError, SenderStatsSnapshot,
};
use stats::TransportStats;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Sender setup failed: {0}")]
    Sender(#[from] SendError),
}

/// Outcome of one [`DeliveryTransport::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    pub batches_sent: usize,
    pub delivered: usize,
    /// Events whose batch failed; they stay queued.
    pub failed: usize,
    /// Queue length after the flush.
    pub remaining: usize,
}

pub struct DeliveryTransportBuilder {
    config: TransportConfig,
    capabilities: Capabilities,
    sink: Option<Arc<dyn DiagnosticSink>>,
    token_source: Option<TokenSource>,
}

impl DeliveryTransportBuilder {
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn diagnostic_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Async credential provider, invoked before every authenticated request.
    /// Takes precedence over `auth_token` in the config.
    pub fn token_provider<F, Fut>(mut self, provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<IssuedToken, TokenError>> + Send + 'static,
    {
        self.token_source = Some(TokenSource::provider(provider));
        self
    }

    pub fn build(self) -> Result<DeliveryTransport, TransportError> {
        let mut config = self.config;
        config.validate()?;
        let endpoint = config.endpoint_url()?;

        let sanitizer = Arc::new(Sanitizer::new(&config.sanitizer));
        let sink: Arc<dyn DiagnosticSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(TracingSink),
        };
        let diagnostics = Diagnostics::new(config.name.clone(), Arc::clone(&sanitizer), sink);

        // The handler becomes the only holder of the static credential.
        let configured_token = config.auth_token.take().map(SecretToken::new);
        let token_source = self.token_source.or_else(|| {
            configured_token
                .filter(|token| !token.is_empty())
                .map(TokenSource::Static)
        });
        let token = Arc::new(SecureTokenHandler::new(
            token_source,
            config.enable_secure_token_handling,
            diagnostics.clone(),
        ));

        let http = HttpSender::new(endpoint, config.request_timeout, &config.user_agent)?;
        let compression = CompressionAdapter::new(self.capabilities.stream_compression)
            .with_diagnostics(diagnostics.clone());
        let mut sender = EventSender::new(http, compression, config.compression.clone(), token);
        if let Some(beacon) = self.capabilities.beacon.clone() {
            sender = sender.with_beacon(beacon, config.beacon_max_bytes);
        }

        let queue = if config.enable_offline_storage && self.capabilities.persistent_storage {
            OfflineQueue::open(config.offline_queue.clone())
        } else {
            OfflineQueue::in_memory(OfflineQueueConfig {
                storage_path: None,
                ..config.offline_queue.clone()
            })
        };

        info!(
            "Transport '{}' ready (endpoint: {}, persistent queue: {}, beacon: {})",
            config.name,
            sanitizer.sanitize(&config.endpoint),
            queue.is_persistent(),
            self.capabilities.beacon.is_some()
        );

        Ok(DeliveryTransport {
            inner: Arc::new(TransportInner {
                rate_limiter: RateLimiter::new(config.rate_limit_per_minute),
                policy: RetryPolicy::new(config.retry.clone()),
                connectivity: self.capabilities.connectivity,
                config,
                sanitizer,
                diagnostics,
                sender,
                queue,
                closed: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
                flush_lock: tokio::sync::Mutex::new(()),
                stats: TransportStats::default(),
            }),
        })
    }
}

/// Resilient, sanitizing delivery of telemetry events to one collector.
///
/// Cheap to clone; clones share the same pipeline.
#[derive(Clone)]
pub struct DeliveryTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    config: TransportConfig,
    sanitizer: Arc<Sanitizer>,
    diagnostics: Diagnostics,
    rate_limiter: RateLimiter,
    policy: RetryPolicy,
    sender: EventSender,
    queue: OfflineQueue,
    connectivity: Connectivity,
    closed: AtomicBool,
    cancel: CancellationToken,
    tracker: TaskTracker,
    flush_lock: tokio::sync::Mutex<()>,
    stats: TransportStats,
}

struct PendingEvent {
    payload: String,
    summary: Vec<(&'static str, String)>,
}

impl DeliveryTransport {
    pub fn builder(config: TransportConfig) -> DeliveryTransportBuilder {
        DeliveryTransportBuilder {
            config,
            capabilities: Capabilities::default(),
            sink: None,
            token_source: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Accepts one event.
    ///
    /// Only malformed input is reported to the caller. Rate limiting,
    /// delivery failures and token problems surface as diagnostics. After
    /// [`close`](Self::close) this does nothing.
    pub fn write(&self, event: impl Into<EventInput>) -> Result<(), ValidationError> {
        let inner = &self.inner;
        if self.is_closed() {
            return Ok(());
        }

        let event = LogEvent::try_from(event.into())?;

        match inner.rate_limiter.check(Instant::now()) {
            Admission::Admitted => inner.stats.record_admitted(),
            Admission::RejectedFirst => {
                inner.stats.record_rate_limited();
                inner.diagnostics.report(
                    DiagnosticKind::RateLimited,
                    "rate limit exceeded; dropping events until the window resets",
                    &[("limit_per_minute", inner.rate_limiter.limit().to_string())],
                );
                return Ok(());
            }
            Admission::Rejected => {
                inner.stats.record_rate_limited();
                return Ok(());
            }
        }

        let sanitized = SanitizedEvent::from_event(&event, &inner.sanitizer);
        let pending = PendingEvent {
            payload: sanitized.to_json_string(),
            summary: sanitized.summary(),
        };

        if Handle::try_current().is_ok() {
            inner.tracker.spawn(Arc::clone(inner).deliver(pending));
        } else {
            debug!("No async runtime available, queueing event for a later flush");
            inner.store(pending.payload, 0);
        }
        Ok(())
    }

    /// Waits until every delivery task spawned so far has delivered, queued
    /// or discarded its event, retries included.
    pub async fn wait_idle(&self) {
        let tracker = &self.inner.tracker;
        tracker.close();
        tracker.wait().await;
        if !self.is_closed() {
            tracker.reopen();
        }
    }

    /// Redelivers queued events in batches. Failed batches stay queued.
    pub async fn flush(&self) -> FlushReport {
        self.inner.flush().await
    }

    /// Shuts the transport down. Idempotent.
    ///
    /// Pending retries are cancelled and their events queued, in-flight
    /// attempts get up to `close_timeout` to finish, the queue is flushed
    /// once, the credential is scrubbed, and the queue is persisted.
    pub async fn close(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        inner.cancel.cancel();
        inner.tracker.close();
        if tokio::time::timeout(inner.config.close_timeout, inner.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "Transport '{}': in-flight deliveries still running after {:?}",
                inner.config.name, inner.config.close_timeout
            );
        }

        let report = inner.flush().await;
        inner.sender.token().dispose();

        if let Err(e) = inner.queue.persist_all().await {
            warn!("Failed to persist offline queue on close: {}", e);
        }

        info!(
            "Transport '{}' closed ({} delivered on close, {} left queued)",
            inner.config.name, report.delivered, report.remaining
        );
    }

    /// Connectivity came back; queued events are flushed in the background.
    pub fn notify_online(&self) {
        let inner = &self.inner;
        inner.connectivity.set_online(true);
        if self.is_closed() || inner.queue.is_empty() || Handle::try_current().is_err() {
            return;
        }

        let flushing = Arc::clone(inner);
        inner.tracker.spawn(async move {
            let report = flushing.flush().await;
            debug!(
                "Flush after reconnect: {} delivered, {} remaining",
                report.delivered, report.remaining
            );
        });
    }

    pub fn notify_offline(&self) {
        self.inner.connectivity.set_online(false);
    }

    pub fn queued_len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn stats(&self) -> TransportStatsSnapshot {
        self.inner.stats.snapshot(self.inner.queue.len())
    }

    /// Request-level counters for the HTTP channel, flushes included.
    pub fn http_stats(&self) -> SenderStatsSnapshot {
        self.inner.sender.http_stats()
    }
}

impl fmt::Debug for DeliveryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryTransport")
            .field("name", &self.inner.config.name)
            .field("closed", &self.is_closed())
            .field("sender", &self.inner.sender)
            .field("queue", &self.inner.queue)
            .finish_non_exhaustive()
    }
}

impl TransportInner {
    async fn deliver(self: Arc<Self>, event: PendingEvent) {
        let mut attempt = DeliveryAttempt::new(event.payload);

        loop {
            if self.cancel.is_cancelled() {
                debug!("Transport closing, queueing event after {} attempts", attempt.attempt_number);
                self.store(attempt.event, attempt.attempt_number);
                return;
            }

            if !self.connectivity.is_online() {
                debug!("Offline, queueing event without sending");
                self.store(attempt.event, attempt.attempt_number);
                return;
            }

            let error = match self.sender.send_event(&attempt.event).await {
                Ok(route) => {
                    self.stats.record_delivered(route == Route::Beacon);
                    return;
                }
                Err(error) => error,
            };

            let Some(delay) = attempt.record_failure(&self.policy) else {
                self.give_up(attempt, &event.summary, &error);
                return;
            };

            self.stats.record_retry();
            debug!(
                "Delivery attempt {} failed, retrying in {:?}: {}",
                attempt.attempt_number,
                delay,
                self.sanitizer.sanitize(&error.to_string())
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn give_up(
        &self,
        attempt: DeliveryAttempt<String>,
        summary: &[(&'static str, String)],
        error: &SendError,
    ) {
        self.stats.record_exhausted();

        let mut fields = summary.to_vec();
        fields.push(("attempts", attempt.attempt_number.to_string()));
        fields.push(("error", error.to_string()));
        self.diagnostics.report(
            DiagnosticKind::EventDropped,
            "event delivery failed after all retries",
            &fields,
        );

        self.store(attempt.event, attempt.attempt_number);
    }

    /// Hands an undelivered event to the offline queue, or drops it when
    /// offline storage is disabled.
    fn store(&self, payload: String, attempts: u32) {
        if self.config.enable_offline_storage {
            self.queue.enqueue(payload, attempts);
            self.stats.record_queued();
        } else {
            self.stats.record_discarded();
        }
    }

    async fn flush(&self) -> FlushReport {
        let _guard = self.flush_lock.lock().await;
        let mut report = FlushReport::default();

        if !self.connectivity.is_online() {
            report.remaining = self.queue.len();
            return report;
        }

        let entries = self.queue.drain();
        for chunk in entries.chunks(self.config.batch_size.max(1)) {
            let ids: Vec<u64> = chunk.iter().map(|entry| entry.id).collect();
            let payloads: Vec<&str> = chunk
                .iter()
                .map(|entry| entry.serialized_payload.as_str())
                .collect();

            match self.sender.send_batch(&payloads).await {
                Ok(()) => {
                    self.queue.acknowledge(&ids);
                    self.stats.record_flushed(chunk.len());
                    report.batches_sent += 1;
                    report.delivered += chunk.len();
                }
                Err(error) => {
                    self.queue.record_failure(&ids);
                    report.failed += chunk.len();
                    self.diagnostics.report(
                        DiagnosticKind::FlushFailed,
                        "queued batch could not be delivered; it stays queued",
                        &[
                            ("batch_size", chunk.len().to_string()),
                            ("error", error.to_string()),
                        ],
                    );
                }
            }
        }

        report.remaining = self.queue.len();
        report
    }
}
