pub mod beacon;
pub mod compression;
pub mod http;

pub use beacon::BeaconChannel;
pub use compression::{CompressionAdapter, CompressionError, CompressionFormat, Payload};
pub use http::{HttpSender, SendError, SenderStatsSnapshot};

use crate::auth::SecureTokenHandler;
use crate::config::{CompressionConfig, display_url};
use std::sync::Arc;
use tracing::debug;

/// Channel that carried a delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Beacon,
    Http,
}

// High-level sender that combines the beacon, compression, auth and HTTP parts
pub struct EventSender {
    http: HttpSender,
    beacon: Option<Arc<dyn BeaconChannel>>,
    beacon_max_bytes: usize,
    compression: CompressionAdapter,
    compression_config: CompressionConfig,
    token: Arc<SecureTokenHandler>,
}

impl EventSender {
    pub fn new(
        http: HttpSender,
        compression: CompressionAdapter,
        compression_config: CompressionConfig,
        token: Arc<SecureTokenHandler>,
    ) -> Self {
        Self {
            http,
            beacon: None,
            beacon_max_bytes: 0,
            compression,
            compression_config,
            token,
        }
    }

    pub fn with_beacon(mut self, beacon: Arc<dyn BeaconChannel>, max_bytes: usize) -> Self {
        self.beacon = Some(beacon);
        self.beacon_max_bytes = max_bytes;
        self
    }

    pub fn token(&self) -> &SecureTokenHandler {
        &self.token
    }

    pub fn http_stats(&self) -> SenderStatsSnapshot {
        self.http.stats()
    }

    /// Beacons carry no headers, so they are skipped whenever a credential
    /// is configured.
    fn beacon_for(&self, body_len: usize) -> Option<&Arc<dyn BeaconChannel>> {
        self.beacon
            .as_ref()
            .filter(|_| body_len <= self.beacon_max_bytes && !self.token.has_credential())
    }

    /// One delivery attempt for a single serialized event.
    pub async fn send_event(&self, body: &str) -> Result<Route, SendError> {
        if let Some(beacon) = self.beacon_for(body.len()) {
            if beacon.send(self.http.endpoint(), body.as_bytes(), "application/json") {
                return Ok(Route::Beacon);
            }
            debug!("Beacon rejected {} byte payload, falling back to HTTP", body.len());
        }

        let payload = self
            .prepare(body.to_string(), self.compression_config.threshold)
            .await;
        let authorization = self.token.authorization_header().await;
        self.http
            .send(&payload, authorization.as_ref(), None)
            .await
            .map(|()| Route::Http)
    }

    /// Sends already-serialized events as one JSON array.
    pub async fn send_batch(&self, events: &[&str]) -> Result<(), SendError> {
        let body = format!("[{}]", events.join(","));
        let payload = self
            .prepare(body, self.compression_config.batch_threshold)
            .await;
        let authorization = self.token.authorization_header().await;
        self.http
            .send(&payload, authorization.as_ref(), Some(events.len()))
            .await
    }

    async fn prepare(&self, body: String, threshold: usize) -> Payload {
        if self.compression_config.enabled {
            self.compression
                .maybe_compress(body, threshold, self.compression_config.format)
                .await
        } else {
            Payload::uncompressed(body)
        }
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("endpoint", &display_url(self.http.endpoint()))
            .field("beacon", &self.beacon.is_some())
            .field("compression", &self.compression_config)
            .finish_non_exhaustive()
    }
}
