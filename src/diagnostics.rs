//! Developer-facing diagnostics.
//!
//! Every diagnostic the crate emits goes through [`Diagnostics::report`],
//! which sanitizes the message and each field before a [`Diagnostic`] is
//! built. Code outside this module cannot construct one directly, so there is
//! no path that hands raw text to a sink.

use crate::domain::LogLevel;
use crate::sanitizer::Sanitizer;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Rate limit hit; reported once per window.
    RateLimited,
    /// Retries exhausted for an event.
    EventDropped,
    /// A queued batch could not be redelivered during flush.
    FlushFailed,
    /// Token provider failed; delivery continues unauthenticated.
    TokenFailure,
    /// Compression failed and the payload went out uncompressed.
    CompressionFallback,
}

impl DiagnosticKind {
    pub fn level(self) -> LogLevel {
        match self {
            DiagnosticKind::EventDropped => LogLevel::Error,
            DiagnosticKind::RateLimited
            | DiagnosticKind::TokenFailure
            | DiagnosticKind::FlushFailed => LogLevel::Warn,
            DiagnosticKind::CompressionFallback => LogLevel::Debug,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::RateLimited => "rate_limited",
            DiagnosticKind::EventDropped => "event_dropped",
            DiagnosticKind::FlushFailed => "flush_failed",
            DiagnosticKind::TokenFailure => "token_failure",
            DiagnosticKind::CompressionFallback => "compression_fallback",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sanitized diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    kind: DiagnosticKind,
    transport: String,
    message: String,
    fields: Vec<(&'static str, String)>,
}

impl Diagnostic {
    pub fn kind(&self) -> DiagnosticKind {
        self.kind
    }

    /// Name of the transport that produced this diagnostic.
    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> &[(&'static str, String)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.transport, self.message)?;
        for (key, value) in &self.fields {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

/// Destination for diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: &Diagnostic);
}

/// Default sink: one `tracing` event per diagnostic.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        let kind = diagnostic.kind().as_str();
        let transport = diagnostic.transport();
        let details = diagnostic
            .fields()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");

        match diagnostic.kind().level() {
            LogLevel::Error => tracing::error!(
                target: "rask_telemetry_client::diagnostics",
                kind, transport, details = %details, "{}", diagnostic.message()
            ),
            LogLevel::Warn => tracing::warn!(
                target: "rask_telemetry_client::diagnostics",
                kind, transport, details = %details, "{}", diagnostic.message()
            ),
            LogLevel::Info => tracing::info!(
                target: "rask_telemetry_client::diagnostics",
                kind, transport, details = %details, "{}", diagnostic.message()
            ),
            LogLevel::Debug | LogLevel::Trace => tracing::debug!(
                target: "rask_telemetry_client::diagnostics",
                kind, transport, details = %details, "{}", diagnostic.message()
            ),
        }
    }
}

/// Sink that keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.lock().clone()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.records.lock().iter().filter(|d| d.kind == kind).count()
    }

    /// True if any recorded message or field contains `needle`.
    pub fn contains_text(&self, needle: &str) -> bool {
        self.records.lock().iter().any(|d| {
            d.message.contains(needle) || d.fields.iter().any(|(_, v)| v.contains(needle))
        })
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, diagnostic: &Diagnostic) {
        self.records.lock().push(diagnostic.clone());
    }
}

/// Sanitizing front door to a [`DiagnosticSink`].
#[derive(Clone)]
pub struct Diagnostics {
    transport: String,
    sanitizer: Arc<Sanitizer>,
    sink: Arc<dyn DiagnosticSink>,
}

impl Diagnostics {
    pub fn new(
        transport: impl Into<String>,
        sanitizer: Arc<Sanitizer>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            transport: transport.into(),
            sanitizer,
            sink,
        }
    }

    pub fn report(&self, kind: DiagnosticKind, message: &str, fields: &[(&'static str, String)]) {
        let diagnostic = Diagnostic {
            kind,
            transport: self.transport.clone(),
            message: self.sanitizer.sanitize(message),
            fields: fields
                .iter()
                .map(|(key, value)| (*key, self.sanitizer.sanitize(value)))
                .collect(),
        };
        self.sink.emit(&diagnostic);
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}
