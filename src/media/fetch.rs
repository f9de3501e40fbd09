//! Remote image fetch
//!
//! Blocking, chunked HTTP GET with:
//! - progress reported to a `ProgressSink` after every chunk
//! - cancellation sampled at chunk boundaries
//! - a hard response size limit
//! - bounded retries for transport errors and 5xx responses

use std::io::Read;
use std::sync::mpsc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default read chunk size in bytes (16KB)
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Smallest accepted chunk size
pub const MIN_CHUNK_SIZE: usize = 512;

/// Largest accepted chunk size (1MB)
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Default fetch timeout in milliseconds (30s)
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;

/// Maximum fetch timeout in milliseconds (5 minutes)
pub const MAX_FETCH_TIMEOUT_MS: u64 = 300_000;

/// Connect timeout in milliseconds (10s)
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default maximum response size (50MB)
pub const DEFAULT_MAX_SIZE: u64 = 50 * 1024 * 1024;

/// Default number of retries after a failed attempt
pub const DEFAULT_RETRIES: u32 = 1;

/// Upper bound for retries
pub const MAX_RETRIES: u32 = 3;

/// Pause between attempts
const RETRY_BACKOFF_MS: u64 = 250;

/// Errors that can occur during a remote fetch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(String),

    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("Response too large: {size} bytes (max {max})")]
    ResponseTooLarge { size: u64, max: u64 },

    #[error("Stream read error: {0}")]
    StreamRead(String),

    #[error("Download cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::HttpRequest(_) | FetchError::StreamRead(_) => true,
            FetchError::Status { status } => *status >= 500,
            FetchError::ResponseTooLarge { .. } | FetchError::Cancelled => false,
        }
    }
}

/// Transfer progress for one remote fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub bytes_read: u64,
    /// Declared body length, when the server sent one.
    pub total_bytes: Option<u64>,
}

impl FetchProgress {
    /// Completed fraction in `[0, 1]`, or `None` when the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_read as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Receiver of progress updates, called between chunks.
pub trait ProgressSink {
    fn on_progress(&self, progress: &FetchProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&FetchProgress),
{
    fn on_progress(&self, progress: &FetchProgress) {
        self(progress)
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _progress: &FetchProgress) {}
}

/// Forwards progress over a channel, e.g. to a UI thread.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::Sender<FetchProgress>,
}

impl ChannelProgress {
    pub fn new(tx: mpsc::Sender<FetchProgress>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end.
    pub fn channel() -> (Self, mpsc::Receiver<FetchProgress>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn on_progress(&self, progress: &FetchProgress) {
        // A dropped receiver only means nobody is watching.
        let _ = self.tx.send(*progress);
    }
}

/// Logs progress at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_progress(&self, progress: &FetchProgress) {
        tracing::trace!(
            bytes_read = progress.bytes_read,
            total_bytes = ?progress.total_bytes,
            "download progress"
        );
    }
}

/// Configuration for remote fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Maximum response size in bytes (default: 50MB)
    pub max_size: u64,

    /// Request timeout in milliseconds (default: 30s, max: 5min)
    pub timeout_ms: u64,

    /// Read chunk size in bytes
    pub chunk_size: usize,

    /// Retries after a retryable failure
    pub retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retries: DEFAULT_RETRIES,
        }
    }
}

impl FetchConfig {
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Timeout, capped at `MAX_FETCH_TIMEOUT_MS`.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms.min(MAX_FETCH_TIMEOUT_MS);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Retries, capped at `MAX_RETRIES`.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.min(MAX_RETRIES);
        self
    }

    /// Check ranges. Returns the offending option and a message.
    pub fn validate(&self) -> Result<(), (&'static str, String)> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err((
                "chunkSize",
                format!(
                    "must be between {} and {}, got {}",
                    MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, self.chunk_size
                ),
            ));
        }
        if self.timeout_ms == 0 || self.timeout_ms > MAX_FETCH_TIMEOUT_MS {
            return Err((
                "fetchTimeoutMs",
                format!(
                    "must be between 1 and {}, got {}",
                    MAX_FETCH_TIMEOUT_MS, self.timeout_ms
                ),
            ));
        }
        if self.retries > MAX_RETRIES {
            return Err((
                "fetchRetries",
                format!("must be at most {}, got {}", MAX_RETRIES, self.retries),
            ));
        }
        if self.max_size == 0 {
            return Err(("maxDownloadBytes", "must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Blocking remote fetcher.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: reqwest::blocking::Client,
    config: FetchConfig,
}

impl RemoteFetcher {
    /// Build the HTTP client. Fails only when the TLS backend cannot start.
    pub fn new(config: FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(CONNECT_TIMEOUT_MS))
            .user_agent(concat!("pasteclean/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Download `url` in chunks, retrying transient failures.
    pub fn fetch(
        &self,
        url: &url::Url,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        let attempts = self.config.retries + 1;
        let mut attempt = 1;
        loop {
            match self.attempt(url, progress, cancel) {
                Ok(bytes) => {
                    tracing::debug!(url = %url, bytes = bytes.len(), attempt, "fetched remote image");
                    return Ok(bytes);
                }
                Err(e) if e.is_retryable() && attempt < attempts && !cancel.is_cancelled() => {
                    tracing::debug!(url = %url, attempt, error = %e, "retrying fetch");
                    std::thread::sleep(Duration::from_millis(RETRY_BACKOFF_MS));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn attempt(
        &self,
        url: &url::Url,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .map_err(|e| FetchError::HttpRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let max = self.config.max_size;
        let total_bytes = response.content_length();
        if let Some(size) = total_bytes {
            if size > max {
                return Err(FetchError::ResponseTooLarge { size, max });
            }
        }

        let capacity = total_bytes.unwrap_or(0).min(max) as usize;
        let mut body = Vec::with_capacity(capacity);
        let mut chunk = vec![0u8; self.config.chunk_size];
        loop {
            if cancel.is_cancelled() {
                tracing::debug!(url = %url, bytes_read = body.len(), "fetch cancelled");
                return Err(FetchError::Cancelled);
            }
            let n = response
                .read(&mut chunk)
                .map_err(|e| FetchError::StreamRead(e.to_string()))?;
            if n == 0 {
                break;
            }
            let size = (body.len() + n) as u64;
            if size > max {
                return Err(FetchError::ResponseTooLarge { size, max });
            }
            body.extend_from_slice(&chunk[..n]);
            progress.on_progress(&FetchProgress {
                bytes_read: size,
                total_bytes,
            });
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let p = FetchProgress {
            bytes_read: 50,
            total_bytes: Some(200),
        };
        assert_eq!(p.fraction(), Some(0.25));

        let unknown = FetchProgress {
            bytes_read: 50,
            total_bytes: None,
        };
        assert_eq!(unknown.fraction(), None);

        let empty = FetchProgress {
            bytes_read: 0,
            total_bytes: Some(0),
        };
        assert_eq!(empty.fraction(), Some(1.0));

        let over = FetchProgress {
            bytes_read: 300,
            total_bytes: Some(200),
        };
        assert_eq!(over.fraction(), Some(1.0));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(FetchError::HttpRequest("reset".into()).is_retryable());
        assert!(FetchError::StreamRead("eof".into()).is_retryable());
        assert!(FetchError::Status { status: 503 }.is_retryable());
        assert!(!FetchError::Status { status: 404 }.is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
        assert!(!FetchError::ResponseTooLarge { size: 2, max: 1 }.is_retryable());
    }

    #[test]
    fn test_config_defaults_and_caps() {
        let config = FetchConfig::default();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.timeout_ms, DEFAULT_FETCH_TIMEOUT_MS);
        assert_eq!(config.max_size, DEFAULT_MAX_SIZE);
        assert_eq!(config.retries, DEFAULT_RETRIES);
        assert!(config.validate().is_ok());

        let capped = FetchConfig::default()
            .with_timeout_ms(u64::MAX)
            .with_retries(100);
        assert_eq!(capped.timeout_ms, MAX_FETCH_TIMEOUT_MS);
        assert_eq!(capped.retries, MAX_RETRIES);
    }

    #[test]
    fn test_config_validate_chunk_size() {
        let err = FetchConfig::default().with_chunk_size(10).validate().unwrap_err();
        assert_eq!(err.0, "chunkSize");
        let err = FetchConfig::default()
            .with_chunk_size(MAX_CHUNK_SIZE + 1)
            .validate()
            .unwrap_err();
        assert_eq!(err.0, "chunkSize");
        assert!(FetchConfig::default()
            .with_chunk_size(MIN_CHUNK_SIZE)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_config_validate_timeout_and_size() {
        let err = FetchConfig::default().with_timeout_ms(0).validate().unwrap_err();
        assert_eq!(err.0, "fetchTimeoutMs");
        let err = FetchConfig::default().with_max_size(0).validate().unwrap_err();
        assert_eq!(err.0, "maxDownloadBytes");
    }

    #[test]
    fn test_channel_progress_forwards() {
        let (sink, rx) = ChannelProgress::channel();
        sink.on_progress(&FetchProgress {
            bytes_read: 10,
            total_bytes: Some(20),
        });
        assert_eq!(rx.recv().unwrap().bytes_read, 10);

        drop(rx);
        sink.on_progress(&FetchProgress {
            bytes_read: 20,
            total_bytes: Some(20),
        });
    }

    #[test]
    fn test_closure_progress_sink() {
        let seen = std::cell::Cell::new(0u64);
        let sink = |p: &FetchProgress| seen.set(p.bytes_read);
        sink.on_progress(&FetchProgress {
            bytes_read: 7,
            total_bytes: None,
        });
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn test_fetch_cancelled_before_request() {
        let fetcher = RemoteFetcher::new(FetchConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let url = url::Url::parse("http://127.0.0.1:9/never").unwrap();
        assert_eq!(
            fetcher.fetch(&url, &NoProgress, &cancel),
            Err(FetchError::Cancelled)
        );
    }
}
