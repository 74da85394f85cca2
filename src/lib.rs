#![deny(rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_possible_truncation, // Durations in millis fit in u64
    clippy::cast_possible_wrap,       // Safe in non-negative contexts
    clippy::missing_errors_doc,       // Internal API
    clippy::missing_panics_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. TransportError in transport module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod app;
pub mod auth;
pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod reliability;
pub mod sanitizer;
pub mod sender;
pub mod transport;

// Re-export main types for easy access
pub use auth::{IssuedToken, TokenError};
pub use config::{ConfigError, TransportConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, MemorySink, TracingSink};
pub use domain::{EventInput, FieldValue, LogEvent, LogLevel, ValidationError};
pub use sanitizer::{ReplacementStrategy, Sanitizer, SanitizerConfig};
pub use transport::{
    Capabilities, Connectivity, DeliveryTransport, FlushReport, TransportError,
    TransportStatsSnapshot,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
