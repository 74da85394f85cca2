use rask_telemetry_client::{
    Capabilities, ConfigError, DeliveryTransport, LogEvent, LogLevel, ReplacementStrategy,
    TransportConfig,
};
use serde_json::{Value, json};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn loads_full_config_file() {
    let file = write_config(
        r#"
        name = "frontend"
        endpoint = "https://collector.example.com/v1/telemetry"
        auth_token = "abc123"
        enable_offline_storage = false
        batch_size = 20
        close_timeout_ms = 750

        [offline_queue]
        max_entries = 500
        max_age_ms = 60000

        [compression]
        enabled = false
        threshold = 2048

        [sanitizer]
        strategy = "hash"
        sensitive_fields = ["password", "tenantId"]

        [sanitizer.mask]
        visible_prefix = 2
        "#,
    );

    let config = TransportConfig::from_file(file.path()).unwrap();
    assert_eq!(config.name, "frontend");
    assert_eq!(config.auth_token.as_deref(), Some("abc123"));
    assert!(!config.enable_offline_storage);
    assert_eq!(config.batch_size, 20);
    assert_eq!(config.close_timeout, Duration::from_millis(750));
    assert_eq!(config.offline_queue.max_entries, 500);
    assert_eq!(config.offline_queue.max_age, Duration::from_secs(60));
    assert!(!config.compression.enabled);
    assert_eq!(config.compression.threshold, 2048);
    assert_eq!(config.sanitizer.strategy, ReplacementStrategy::Hash);
    assert_eq!(config.sanitizer.mask.visible_prefix, 2);
    assert_eq!(config.sanitizer.mask.visible_suffix, 4);
    assert!(config.validate().is_ok());
    assert!(!format!("{config:?}").contains("abc123"));
}

#[test]
fn missing_file_is_a_file_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = TransportConfig::load(Some(&dir.path().join("missing.toml")));
    assert!(matches!(result, Err(ConfigError::FileError(_))));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let file = write_config("batch_size = \"lots\"\n");
    assert!(matches!(
        TransportConfig::from_file(file.path()),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn load_validates_file_values() {
    let file = write_config("endpoint = \"ftp://collector.example.com\"\n");
    assert!(matches!(
        TransportConfig::load(Some(file.path())),
        Err(ConfigError::InvalidUrl(_))
    ));

    let file = write_config(
        r#"
        [retry]
        base_delay_ms = 5000
        max_delay_ms = 100
        "#,
    );
    assert!(matches!(
        TransportConfig::load(Some(file.path())),
        Err(ConfigError::Retry(_))
    ));
}

#[tokio::test]
async fn custom_sensitive_fields_from_file_are_applied() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let file = write_config(&format!(
        r#"
        endpoint = "{}/v1/telemetry"

        [sanitizer]
        strategy = "redact"
        additional_sensitive_fields = ["tenantSecret"]
        "#,
        server.uri()
    ));
    let config = TransportConfig::from_file(file.path()).unwrap();

    let transport = DeliveryTransport::builder(config)
        .capabilities(Capabilities {
            persistent_storage: false,
            ..Capabilities::default()
        })
        .build()
        .unwrap();
    transport
        .write(
            LogEvent::new(LogLevel::Info, "tenant bootstrapped")
                .with_context("tenantSecret", "north-wind-42")
                .with_context("region", "eu-west-1"),
        )
        .unwrap();
    transport.wait_idle().await;

    let received = server.received_requests().await.unwrap_or_default();
    let body: Value = received[0].body_json().unwrap();
    assert_eq!(body["context"]["tenantSecret"], json!("[REDACTED]"));
    assert_eq!(body["context"]["region"], json!("eu-west-1"));
    transport.close().await;
}
