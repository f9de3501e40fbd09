//! Image reference classification
//!
//! Turns the raw text of an `src` attribute into a `MediaReference`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::ResolutionFailure;

/// `/C:/...` as left over from `file:///C:/...`
static LEADING_SLASH_DRIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[A-Za-z]:[\\/]").unwrap());

/// Bare Windows path, not a URL scheme.
static DRIVE_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z]:[\\/]").unwrap());

static URL_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.-]*):").unwrap());

/// Where an image's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaReference {
    Local(PathBuf),
    Remote(Url),
    /// A complete `data:` URI.
    DataInline(String),
}

impl MediaReference {
    /// Classify a raw `src` value.
    pub fn parse(raw: &str) -> Result<Self, ResolutionFailure> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ResolutionFailure::IoError {
                path: String::new(),
                message: "empty image source".to_string(),
            });
        }

        if raw.starts_with("//") {
            return parse_remote(&format!("https:{}", raw));
        }
        if DRIVE_PATH.is_match(raw) {
            return Ok(MediaReference::Local(PathBuf::from(raw)));
        }

        let Some(caps) = URL_SCHEME.captures(raw) else {
            return Ok(MediaReference::Local(PathBuf::from(raw)));
        };
        match caps[1].to_ascii_lowercase().as_str() {
            "data" => Ok(MediaReference::DataInline(raw.to_string())),
            "file" => Ok(MediaReference::Local(file_url_to_path(raw))),
            "http" | "https" => parse_remote(raw),
            other => Err(ResolutionFailure::NetworkError {
                url: raw.to_string(),
                message: format!("unsupported scheme: {}", other),
            }),
        }
    }
}

impl fmt::Display for MediaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaReference::Local(path) => write!(f, "{}", path.display()),
            MediaReference::Remote(url) => write!(f, "{}", url),
            MediaReference::DataInline(uri) => write!(f, "{}", abbreviate(uri, 48)),
        }
    }
}

fn parse_remote(raw: &str) -> Result<MediaReference, ResolutionFailure> {
    Url::parse(raw)
        .map(MediaReference::Remote)
        .map_err(|e| ResolutionFailure::NetworkError {
            url: raw.to_string(),
            message: format!("invalid URL: {}", e),
        })
}

/// Convert a `file:` URL into a filesystem path.
///
/// Handles `file:///abs`, `file://localhost/abs`, `file:/abs`, Windows drive
/// URLs (`file:///C:/x`) and percent-encoding.
pub fn file_url_to_path(raw: &str) -> PathBuf {
    let rest = &raw["file:".len()..];
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let rest = match rest.get(..10) {
        Some(host) if host.eq_ignore_ascii_case("localhost/") => &rest[9..],
        _ => rest,
    };
    let decoded = urlencoding::decode(rest)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| rest.to_string());
    let path = if LEADING_SLASH_DRIVE.is_match(&decoded) {
        decoded[1..].to_string()
    } else {
        decoded
    };
    PathBuf::from(path)
}

/// Read a local image file.
pub fn read_local(path: &Path) -> Result<Vec<u8>, ResolutionFailure> {
    std::fs::read(path).map_err(|e| ResolutionFailure::IoError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Shorten long sources (usually data URIs) for messages.
pub fn abbreviate(src: &str, max_chars: usize) -> String {
    if src.chars().count() <= max_chars {
        return src.to_string();
    }
    let head: String = src.chars().take(max_chars).collect();
    format!("{}...", head)
}
