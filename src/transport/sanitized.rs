use crate::domain::{LogEvent, LogLevel};
use crate::sanitizer::Sanitizer;
use serde::Serialize;
use serde_json::{Map, Value};

/// Sanitized copy of a [`LogEvent`]; this is what goes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizedEvent {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

impl SanitizedEvent {
    pub fn from_event(event: &LogEvent, sanitizer: &Sanitizer) -> Self {
        let context: Map<String, Value> = event
            .context
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();
        let context = match sanitizer.sanitize_value(&Value::Object(context)) {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Self {
            level: event.level,
            message: sanitizer.sanitize(&event.message),
            timestamp: event.timestamp,
            component: event.component.as_deref().map(|c| sanitizer.sanitize(c)),
            logger: event.logger.as_deref().map(|l| sanitizer.sanitize(l)),
            context,
            args: event
                .args
                .iter()
                .map(|arg| sanitizer.sanitize_value(&arg.to_json()))
                .collect(),
        }
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_value(self)
            .map(|value| value.to_string())
            .unwrap_or_else(|_| {
                Value::Object(Map::from_iter([
                    ("level".to_string(), Value::from(self.level.as_str())),
                    ("message".to_string(), Value::from(self.message.clone())),
                    ("timestamp".to_string(), Value::from(self.timestamp)),
                ]))
                .to_string()
            })
    }

    /// The fields reported when the event is given up on.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        vec![
            ("level", self.level.to_string()),
            ("message", self.message.clone()),
            ("component", self.component.clone().unwrap_or_default()),
            ("logger", self.logger.clone().unwrap_or_default()),
            ("arg_count", self.args.len().to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CIRCULAR_MARKER, FieldValue};
    use crate::sanitizer::SanitizerConfig;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn sensitive_context_keys_are_replaced() {
        let sanitizer = Sanitizer::new(&SanitizerConfig::strict());
        let event = LogEvent::new(LogLevel::Info, "user signed in")
            .with_component("auth")
            .with_context("email", "jane@example.com")
            .with_context("plan", "pro");

        let sanitized = SanitizedEvent::from_event(&event, &sanitizer);
        assert_eq!(sanitized.context["email"], json!("[REDACTED]"));
        assert_eq!(sanitized.context["plan"], json!("pro"));
        assert_eq!(sanitized.component.as_deref(), Some("auth"));
    }

    #[test]
    fn message_and_args_are_sanitized() {
        let sanitizer = Sanitizer::new(&SanitizerConfig::strict());
        let event = LogEvent::new(LogLevel::Warn, "contact jane@example.com")
            .with_arg("token=abcdef123456");

        let sanitized = SanitizedEvent::from_event(&event, &sanitizer);
        assert!(!sanitized.message.contains("jane@example.com"));
        assert!(!sanitized.args[0].to_string().contains("abcdef123456"));
    }

    #[test]
    fn circular_context_serializes_with_marker() {
        let node = FieldValue::shared(FieldValue::Null);
        let mut inner = BTreeMap::new();
        inner.insert("self".to_string(), FieldValue::Shared(node.clone()));
        *node.write() = FieldValue::Map(inner);

        let event = LogEvent::new(LogLevel::Info, "loop").with_context("node", node.clone());
        let sanitized = SanitizedEvent::from_event(&event, &Sanitizer::default());
        assert_eq!(sanitized.context["node"]["self"], json!(CIRCULAR_MARKER));

        // Break the cycle so the test does not leak.
        *node.write() = FieldValue::Null;
    }

    #[test]
    fn empty_optional_parts_are_omitted() {
        let event = LogEvent::new(LogLevel::Debug, "plain").with_timestamp(42);
        let json = SanitizedEvent::from_event(&event, &Sanitizer::default()).to_json_string();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, json!({"level": "debug", "message": "plain", "timestamp": 42}));
    }
}
