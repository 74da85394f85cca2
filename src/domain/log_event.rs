use super::error::ValidationError;
use super::log_level::LogLevel;
use super::value::FieldValue;
use serde_json::Value;
use std::collections::BTreeMap;

/// A finalized telemetry event, as handed over by the logger facade.
///
/// The transport only ever reads from it; sanitized copies are made
/// separately.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub component: Option<String>,
    pub logger: Option<String>,
    pub context: BTreeMap<String, FieldValue>,
    pub args: Vec<FieldValue>,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            component: None,
            logger: None,
            context: BTreeMap::new(),
            args: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_arg(mut self, value: impl Into<FieldValue>) -> Self {
        self.args.push(value.into());
        self
    }
}

/// What a producer may pass to `write()`.
///
/// Typed events are valid by construction; loosely typed JSON (for example
/// NDJSON read from a pipe) is validated on the way in.
#[derive(Debug, Clone)]
pub enum EventInput {
    Typed(LogEvent),
    Json(Value),
}

impl From<LogEvent> for EventInput {
    fn from(event: LogEvent) -> Self {
        EventInput::Typed(event)
    }
}

impl From<Value> for EventInput {
    fn from(value: Value) -> Self {
        EventInput::Json(value)
    }
}

impl TryFrom<EventInput> for LogEvent {
    type Error = ValidationError;

    fn try_from(input: EventInput) -> Result<Self, Self::Error> {
        match input {
            EventInput::Typed(event) => Ok(event),
            EventInput::Json(value) => LogEvent::try_from(value),
        }
    }
}

impl TryFrom<Value> for LogEvent {
    type Error = ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(ValidationError::NotAnObject {
                    found: json_type_name(&other),
                });
            }
        };

        let message = match object.remove("message") {
            Some(Value::String(message)) => message,
            Some(other) => {
                return Err(ValidationError::MessageNotString {
                    found: json_type_name(&other),
                });
            }
            None => return Err(ValidationError::MissingField("message")),
        };

        let level = match object.remove("level") {
            Some(Value::String(level)) => level.parse()?,
            Some(other) => {
                return Err(ValidationError::InvalidLevel {
                    found: json_type_name(&other),
                    len: other.to_string().len(),
                });
            }
            None => LogLevel::Info,
        };

        let timestamp = match object.remove("timestamp") {
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| ValidationError::InvalidTimestamp {
                found: "number",
                len: n.to_string().len(),
            })?,
            Some(Value::String(s)) => chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.timestamp_millis())
                .map_err(|_| ValidationError::InvalidTimestamp {
                    found: "string",
                    len: s.chars().count(),
                })?,
            Some(other) => {
                return Err(ValidationError::InvalidTimestamp {
                    found: json_type_name(&other),
                    len: other.to_string().len(),
                });
            }
            None => chrono::Utc::now().timestamp_millis(),
        };

        let component = optional_string(object.remove("component"));
        let logger = optional_string(object.remove("logger"));

        let context = match object.remove("context") {
            Some(Value::Object(map)) => map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            _ => BTreeMap::new(),
        };

        let args = match object.remove("args") {
            Some(Value::Array(items)) => items.into_iter().map(Into::into).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(single) => vec![single.into()],
        };

        Ok(Self {
            level,
            message,
            timestamp,
            component,
            logger,
            context,
            args,
        })
    }
}

fn optional_string(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
