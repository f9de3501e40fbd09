//! Asset stores
//!
//! The resolver hands finished image bytes to an `AssetStore` and gets back
//! the reference to write into `src`. Stores are keyed by a content-derived
//! key, so adding the same bytes twice yields the same handle without a
//! second write.
//!
//! - **DirAssetStore**: files under a base directory, written atomically
//! - **MemoryAssetStore**: in-process map, for embedding and tests

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// File name prefix for stored assets.
pub const ASSET_PREFIX: &str = "paste-";

/// Errors reported by asset stores
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("invalid content key: {0}")]
    InvalidKey(String),

    #[error("invalid extension: {0}")]
    InvalidExtension(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Reference to a stored asset, written verbatim into `src`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetHandle(String);

impl AssetHandle {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Host-side media storage.
///
/// Implementations must be idempotent per `content_key` and must not expose a
/// partially written asset when they fail.
pub trait AssetStore: Send + Sync {
    fn add_asset(
        &self,
        content_key: &str,
        bytes: &[u8],
        extension: &str,
    ) -> Result<AssetHandle, StoreError>;
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_key(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// File name used for an asset: `paste-<key>.<ext>`.
pub fn asset_file_name(content_key: &str, extension: &str) -> String {
    format!("{}{}.{}", ASSET_PREFIX, content_key, extension)
}

/// Keys are hex digests and extensions short alphanumerics, so neither can
/// escape the store directory.
fn validate(content_key: &str, extension: &str) -> Result<(), StoreError> {
    if content_key.is_empty() || !content_key.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(StoreError::InvalidKey(content_key.to_string()));
    }
    if extension.is_empty()
        || extension.len() > 8
        || !extension.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return Err(StoreError::InvalidExtension(extension.to_string()));
    }
    Ok(())
}

/// Directory-backed store.
///
/// Assets are written to a temporary file in the same directory and renamed
/// into place, so readers never observe a partial file.
#[derive(Debug, Clone)]
pub struct DirAssetStore {
    base_dir: PathBuf,
}

impl DirAssetStore {
    /// Open a store rooted at `base_dir`, creating the directory if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|e| {
            StoreError::Io(format!(
                "failed to create media directory {}: {}",
                base_dir.display(),
                e
            ))
        })?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path an asset handle refers to.
    pub fn path_of(&self, handle: &AssetHandle) -> PathBuf {
        self.base_dir.join(handle.as_str())
    }
}

impl AssetStore for DirAssetStore {
    fn add_asset(
        &self,
        content_key: &str,
        bytes: &[u8],
        extension: &str,
    ) -> Result<AssetHandle, StoreError> {
        validate(content_key, extension)?;

        let file_name = asset_file_name(content_key, extension);
        let path = self.base_dir.join(&file_name);
        if path.exists() {
            tracing::debug!(path = %path.display(), "asset already stored");
            return Ok(AssetHandle::new(file_name));
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&self.base_dir)
            .map_err(|e| StoreError::Io(format!("failed to create temp file: {}", e)))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.flush())
            .map_err(|e| StoreError::Io(format!("failed to write asset: {}", e)))?;
        tmp.persist(&path)
            .map_err(|e| StoreError::Io(format!("failed to persist asset: {}", e.error)))?;

        tracing::debug!(
            path = %path.display(),
            size = bytes.len(),
            "stored asset"
        );
        Ok(AssetHandle::new(file_name))
    }
}

/// A stored asset held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub bytes: Vec<u8>,
    pub extension: String,
}

/// In-memory store keyed by file name.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    assets: RwLock<HashMap<String, StoredAsset>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: &AssetHandle) -> Option<StoredAsset> {
        self.assets.read().get(handle.as_str()).cloned()
    }

    pub fn len(&self) -> usize {
        self.assets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.read().is_empty()
    }
}

impl AssetStore for MemoryAssetStore {
    fn add_asset(
        &self,
        content_key: &str,
        bytes: &[u8],
        extension: &str,
    ) -> Result<AssetHandle, StoreError> {
        validate(content_key, extension)?;
        let file_name = asset_file_name(content_key, extension);
        self.assets
            .write()
            .entry(file_name.clone())
            .or_insert_with(|| StoredAsset {
                bytes: bytes.to_vec(),
                extension: extension.to_string(),
            });
        Ok(AssetHandle::new(file_name))
    }
}
