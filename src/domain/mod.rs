//! Domain layer for rask-telemetry-client.
//!
//! Contains the canonical types shared across all modules:
//! - `LogEvent`: what producers hand to the transport
//! - `FieldValue`: dynamically shaped context/argument values
//! - `LogLevel`: event severity (Trace/Debug/Info/Warn/Error)
//! - `ValidationError`: rejection at the `write()` boundary

pub mod error;
pub mod log_event;
pub mod log_level;
pub mod value;

pub use error::ValidationError;
pub use log_event::{EventInput, LogEvent};
pub use log_level::LogLevel;
pub use value::{CIRCULAR_MARKER, FieldValue, MAX_DEPTH_MARKER, SharedValue};
