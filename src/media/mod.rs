//! Media resolution
//!
//! Turns an image reference found in pasted markup into a stored local asset:
//!
//! - **MediaReference** (`reference`): local path, remote URL or inline data URI
//! - **RemoteFetcher** (`fetch`): chunked HTTP download with progress and cancellation
//! - **reencode** (`encode`): decode any supported raster format, emit PNG or JPEG
//! - **AssetStore** (`store`): content-addressed, deduplicating storage
//!
//! Every failure is reported as a `ResolutionFailure` and is meant to be
//! non-fatal for the caller: the markup keeps its original `src`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pasteclean::media::{MediaResolver, ResolverOptions, MemoryAssetStore, NoProgress};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(MemoryAssetStore::new());
//! let resolver = MediaResolver::new(ResolverOptions::default(), store)?;
//! let resolved = resolver.resolve_src("https://example.com/a.png", &NoProgress, &CancellationToken::new())?;
//! ```

pub mod encode;
pub mod fetch;
pub mod reference;
pub mod store;

use std::sync::Arc;

use base64::Engine;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigError;

pub use encode::{reencode, EncodedImage, OutputFormat, RasterFormat, DEFAULT_JPEG_QUALITY};
pub use fetch::{
    ChannelProgress, FetchConfig, FetchError, FetchProgress, NoProgress, ProgressSink,
    RemoteFetcher, TracingProgress, DEFAULT_CHUNK_SIZE, DEFAULT_FETCH_TIMEOUT_MS,
    DEFAULT_MAX_SIZE, MAX_FETCH_TIMEOUT_MS,
};
pub use reference::MediaReference;
pub use store::{
    content_key, AssetHandle, AssetStore, DirAssetStore, MemoryAssetStore, StoreError,
};

/// Why an image could not be localized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionFailure {
    #[error("cannot read {path}: {message}")]
    IoError { path: String, message: String },

    #[error("download of {url} failed: {message}")]
    NetworkError { url: String, message: String },

    #[error("not a usable image: {0}")]
    DecodeError(String),

    #[error("storing image failed: {0}")]
    StoreError(#[from] StoreError),
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Stored; the handle replaces the original `src`.
    Stored(AssetHandle),
    /// Deliberately left as is.
    Passthrough,
}

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    pub format: RasterFormat,
    /// Whether `Local` references may be read.
    pub allow_local_files: bool,
    /// Decode and store `data:` URIs instead of passing them through.
    pub store_inline_data: bool,
    pub fetch: FetchConfig,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            format: RasterFormat::default(),
            allow_local_files: true,
            store_inline_data: false,
            fetch: FetchConfig::default(),
        }
    }
}

impl ResolverOptions {
    pub fn with_format(mut self, format: RasterFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_local_files(mut self, allow: bool) -> Self {
        self.allow_local_files = allow;
        self
    }

    pub fn with_inline_data(mut self, store: bool) -> Self {
        self.store_inline_data = store;
        self
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let RasterFormat::Jpeg { quality } = self.format {
            if !(1..=100).contains(&quality) {
                return Err(ConfigError::InvalidOption {
                    option: "jpegQuality".to_string(),
                    message: format!("must be between 1 and 100, got {}", quality),
                });
            }
        }
        self.fetch
            .validate()
            .map_err(|(option, message)| ConfigError::InvalidOption {
                option: option.to_string(),
                message,
            })
    }
}

/// Resolves image references into stored assets.
pub struct MediaResolver {
    options: ResolverOptions,
    fetcher: RemoteFetcher,
    store: Arc<dyn AssetStore>,
}

impl std::fmt::Debug for MediaResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaResolver")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl MediaResolver {
    /// Validate `options` and build the HTTP client.
    pub fn new(options: ResolverOptions, store: Arc<dyn AssetStore>) -> Result<Self, ConfigError> {
        options.validate()?;
        let fetcher = RemoteFetcher::new(options.fetch.clone())
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            options,
            fetcher,
            store,
        })
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Classify and resolve a raw `src` value.
    pub fn resolve_src(
        &self,
        src: &str,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Resolved, ResolutionFailure> {
        let reference = MediaReference::parse(src)?;
        self.resolve(&reference, progress, cancel)
    }

    pub fn resolve(
        &self,
        reference: &MediaReference,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Resolved, ResolutionFailure> {
        let bytes = match reference {
            MediaReference::Local(path) => {
                if !self.options.allow_local_files {
                    return Err(ResolutionFailure::IoError {
                        path: path.display().to_string(),
                        message: "local file access is disabled".to_string(),
                    });
                }
                reference::read_local(path)?
            }
            MediaReference::Remote(url) => self
                .fetcher
                .fetch(url, progress, cancel)
                .map_err(|e| ResolutionFailure::NetworkError {
                    url: url.to_string(),
                    message: e.to_string(),
                })?,
            MediaReference::DataInline(uri) => {
                if !self.options.store_inline_data {
                    return Ok(Resolved::Passthrough);
                }
                decode_data_uri(uri)?
            }
        };

        let handle = self.ingest(&bytes)?;
        tracing::debug!(source = %reference, handle = %handle, "localized image");
        Ok(Resolved::Stored(handle))
    }

    /// Re-encode raw image bytes and store them under their content key.
    pub fn ingest(&self, bytes: &[u8]) -> Result<AssetHandle, ResolutionFailure> {
        let encoded = reencode(bytes, self.options.format)
            .map_err(|e| ResolutionFailure::DecodeError(e.to_string()))?;
        let key = content_key(&encoded.bytes);
        Ok(self
            .store
            .add_asset(&key, &encoded.bytes, encoded.extension)?)
    }
}

/// Payload of a base64 `data:` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, ResolutionFailure> {
    let rest = uri
        .get(..5)
        .filter(|scheme| scheme.eq_ignore_ascii_case("data:"))
        .map(|_| &uri[5..])
        .ok_or_else(|| ResolutionFailure::DecodeError("not a data URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ResolutionFailure::DecodeError("data URI has no payload".to_string()))?;
    let is_base64 = header
        .rsplit(';')
        .next()
        .is_some_and(|last| last.trim().eq_ignore_ascii_case("base64"));
    if !is_base64 {
        return Err(ResolutionFailure::DecodeError(
            "inline data is not base64".to_string(),
        ));
    }

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ResolutionFailure::DecodeError(format!("invalid base64: {}", e)))
}
