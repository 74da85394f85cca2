use crate::diagnostics::{DiagnosticKind, Diagnostics};
use flate2::Compression;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// Per-event compression threshold in bytes.
pub const DEFAULT_EVENT_THRESHOLD: usize = 1024;
/// Batch compression threshold in bytes.
pub const DEFAULT_BATCH_THRESHOLD: usize = 8192;

const PROBE_TEXT: &str = "rask-telemetry-client compression probe";

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Compression is not supported in this environment")]
    Unsupported,
    #[error("Compression IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decompressed payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Compression task failed: {0}")]
    Task(String),
    #[error("Unknown compression format: {0}")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionFormat {
    #[default]
    Gzip,
    /// zlib-wrapped deflate.
    Deflate,
    DeflateRaw,
}

impl CompressionFormat {
    /// Value sent in `Content-Encoding`.
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionFormat::Gzip => "gzip",
            CompressionFormat::Deflate => "deflate",
            CompressionFormat::DeflateRaw => "deflate-raw",
        }
    }
}

impl fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionFormat {
    type Err = CompressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" => Ok(CompressionFormat::Gzip),
            "deflate" => Ok(CompressionFormat::Deflate),
            "deflate-raw" | "deflate_raw" => Ok(CompressionFormat::DeflateRaw),
            other => Err(CompressionError::UnknownFormat(other.to_string())),
        }
    }
}

/// A request body ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub body: Vec<u8>,
    /// Set only when `body` is compressed.
    pub encoding: Option<CompressionFormat>,
    /// Size of the uncompressed JSON.
    pub original_size: usize,
}

impl Payload {
    pub fn uncompressed(text: String) -> Self {
        let original_size = text.len();
        Self {
            body: text.into_bytes(),
            encoding: None,
            original_size,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.encoding.is_some()
    }
}

/// Best-effort compression.
///
/// Support requires the injected capability and a successful one-time probe
/// round trip. Every failure path leaves the payload uncompressed.
#[derive(Debug)]
pub struct CompressionAdapter {
    capability: bool,
    probe: OnceLock<bool>,
    diagnostics: Option<Diagnostics>,
}

impl CompressionAdapter {
    pub fn new(capability: bool) -> Self {
        Self {
            capability,
            probe: OnceLock::new(),
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn is_supported(&self) -> bool {
        self.capability && *self.probe.get_or_init(probe_round_trip)
    }

    pub async fn compress(
        &self,
        text: String,
        format: CompressionFormat,
    ) -> Result<Vec<u8>, CompressionError> {
        if !self.is_supported() {
            return Err(CompressionError::Unsupported);
        }
        tokio::task::spawn_blocking(move || compress_bytes(text.as_bytes(), format))
            .await
            .map_err(|e| CompressionError::Task(e.to_string()))?
            .map_err(CompressionError::from)
    }

    pub async fn decompress(
        &self,
        bytes: Vec<u8>,
        format: CompressionFormat,
    ) -> Result<String, CompressionError> {
        if !self.is_supported() {
            return Err(CompressionError::Unsupported);
        }
        tokio::task::spawn_blocking(move || decompress_bytes(&bytes, format))
            .await
            .map_err(|e| CompressionError::Task(e.to_string()))?
    }

    /// Compresses `text` when it is at least `threshold` bytes and the result
    /// is strictly smaller. Otherwise returns it as is.
    pub async fn maybe_compress(
        &self,
        text: String,
        threshold: usize,
        format: CompressionFormat,
    ) -> Payload {
        let original_size = text.len();
        if original_size < threshold || !self.is_supported() {
            return Payload::uncompressed(text);
        }

        match self.compress(text.clone(), format).await {
            Ok(compressed) if compressed.len() < original_size => {
                debug!(
                    "Compressed payload {} -> {} bytes ({})",
                    original_size,
                    compressed.len(),
                    format
                );
                Payload {
                    body: compressed,
                    encoding: Some(format),
                    original_size,
                }
            }
            Ok(_) => Payload::uncompressed(text),
            Err(e) => {
                if let Some(diagnostics) = &self.diagnostics {
                    diagnostics.report(
                        DiagnosticKind::CompressionFallback,
                        "compression failed; sending uncompressed",
                        &[("error", e.to_string())],
                    );
                }
                Payload::uncompressed(text)
            }
        }
    }
}

pub fn compress_bytes(input: &[u8], format: CompressionFormat) -> std::io::Result<Vec<u8>> {
    let level = Compression::default();
    match format {
        CompressionFormat::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), level);
            encoder.write_all(input)?;
            encoder.finish()
        }
        CompressionFormat::Deflate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), level);
            encoder.write_all(input)?;
            encoder.finish()
        }
        CompressionFormat::DeflateRaw => {
            let mut encoder = DeflateEncoder::new(Vec::new(), level);
            encoder.write_all(input)?;
            encoder.finish()
        }
    }
}

pub fn decompress_bytes(input: &[u8], format: CompressionFormat) -> Result<String, CompressionError> {
    let mut output = Vec::new();
    match format {
        CompressionFormat::Gzip => GzDecoder::new(input).read_to_end(&mut output)?,
        CompressionFormat::Deflate => ZlibDecoder::new(input).read_to_end(&mut output)?,
        CompressionFormat::DeflateRaw => DeflateDecoder::new(input).read_to_end(&mut output)?,
    };
    Ok(String::from_utf8(output)?)
}

fn probe_round_trip() -> bool {
    let supported = compress_bytes(PROBE_TEXT.as_bytes(), CompressionFormat::Gzip)
        .ok()
        .and_then(|bytes| decompress_bytes(&bytes, CompressionFormat::Gzip).ok())
        .is_some_and(|text| text == PROBE_TEXT);
    if !supported {
        debug!("Compression probe failed; payloads will be sent uncompressed");
    }
    supported
}
