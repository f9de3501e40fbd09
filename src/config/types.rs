//! Typed configuration structures
//!
//! Provides strongly-typed access to configuration values with validation
//! and default values. Every field is optional in the file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::filter::style::{is_safe_value, parse_style_declarations};
use crate::filter::whitelist::Whitelist;
use crate::logging::LogFormat;
use crate::media::fetch::{
    FetchConfig, DEFAULT_CHUNK_SIZE, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_MAX_SIZE, DEFAULT_RETRIES,
};
use crate::media::{OutputFormat, RasterFormat, ResolverOptions, DEFAULT_JPEG_QUALITY};

/// Element, attribute and property names accepted in whitelist extensions.
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").unwrap());

/// Tags that can never be allowed, whatever the configuration says.
pub const FORBIDDEN_TAGS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "applet", "frame", "frameset", "base",
    "meta", "link", "form", "input", "textarea", "svg", "math",
];

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Image localization
    #[serde(default)]
    pub media: MediaConfig,

    /// Whitelist extensions on top of the stock vocabulary
    #[serde(default)]
    pub whitelist: WhitelistConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        self.media.validate(&mut errors);
        self.whitelist.validate(&mut errors);
        self.logging.validate(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Media configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MediaConfig {
    /// Localize images at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Stored image encoding
    #[serde(default)]
    pub format: OutputFormat,

    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u32,

    /// Download chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Read images referenced by local path or file URL
    #[serde(default = "default_true")]
    pub allow_local_files: bool,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Retries after a transient download failure
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    /// Largest accepted download in bytes
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,

    /// Decode and store data URIs instead of keeping them inline
    #[serde(default)]
    pub store_inline_data: bool,

    /// Asset directory (default: platform data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_dir: Option<PathBuf>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: OutputFormat::default(),
            jpeg_quality: default_jpeg_quality(),
            chunk_size: default_chunk_size(),
            allow_local_files: true,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            fetch_retries: default_fetch_retries(),
            max_download_bytes: default_max_download_bytes(),
            store_inline_data: false,
            media_dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_jpeg_quality() -> u32 {
    DEFAULT_JPEG_QUALITY as u32
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_fetch_timeout_ms() -> u64 {
    DEFAULT_FETCH_TIMEOUT_MS
}

fn default_fetch_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_max_download_bytes() -> u64 {
    DEFAULT_MAX_SIZE
}

impl MediaConfig {
    /// Directory assets are written to.
    pub fn media_dir(&self) -> PathBuf {
        self.media_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pasteclean")
                .join("media")
        })
    }

    /// Fetch settings, exactly as configured.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            max_size: self.max_download_bytes,
            timeout_ms: self.fetch_timeout_ms,
            chunk_size: self.chunk_size,
            retries: self.fetch_retries,
        }
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        let quality = self.jpeg_quality.min(u8::MAX as u32) as u8;
        ResolverOptions {
            format: RasterFormat::new(self.format, quality),
            allow_local_files: self.allow_local_files,
            store_inline_data: self.store_inline_data,
            fetch: self.fetch_config(),
        }
    }

    fn validate(&self, errors: &mut Vec<ValidationError>) {
        if !(1..=100).contains(&self.jpeg_quality) {
            errors.push(ValidationError::new(
                "media.jpegQuality",
                format!("must be between 1 and 100, got {}", self.jpeg_quality),
            ));
        }
        if let Err((option, message)) = self.fetch_config().validate() {
            errors.push(ValidationError::new(format!("media.{}", option), message));
        }
    }
}

/// Whitelist extensions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WhitelistConfig {
    /// Additional allowed tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_tags: Vec<String>,

    /// Stock tags to disallow
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_tags: Vec<String>,

    /// Additional tags whose own markup is dropped but content kept
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_ignored_tags: Vec<String>,

    /// Additional allowed attributes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_attributes: Vec<String>,

    /// Additional allowed CSS properties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_styles: Vec<String>,

    /// Tag -> CSS declarations forced onto that tag
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub style_overrides: BTreeMap<String, String>,

    /// Tags whose stock overrides are dropped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_style_overrides: Vec<String>,
}

impl WhitelistConfig {
    /// Stock whitelist with these extensions applied. Removals win over additions.
    pub fn build(&self) -> Whitelist {
        let mut whitelist = Whitelist::default()
            .with_allowed_tags(&self.extra_tags)
            .with_ignored_tags(&self.extra_ignored_tags)
            .without_tags(&self.remove_tags)
            .with_attributes(&self.extra_attributes)
            .with_styles(&self.extra_styles);

        for tag in &self.remove_style_overrides {
            whitelist = whitelist.without_style_overrides(tag);
        }
        for (tag, css) in &self.style_overrides {
            for (property, value) in parse_style_declarations(css) {
                whitelist = whitelist.with_style_override(tag, &property, &value);
            }
        }
        whitelist
    }

    fn validate(&self, errors: &mut Vec<ValidationError>) {
        let lists: [(&str, &Vec<String>); 6] = [
            ("extraTags", &self.extra_tags),
            ("removeTags", &self.remove_tags),
            ("extraIgnoredTags", &self.extra_ignored_tags),
            ("extraAttributes", &self.extra_attributes),
            ("extraStyles", &self.extra_styles),
            ("removeStyleOverrides", &self.remove_style_overrides),
        ];
        for (field, names) in lists {
            for (i, name) in names.iter().enumerate() {
                if !NAME_PATTERN.is_match(name) {
                    errors.push(ValidationError::new(
                        format!("whitelist.{}[{}]", field, i),
                        format!("invalid name {:?}", name),
                    ));
                }
            }
        }

        for (i, tag) in self
            .extra_tags
            .iter()
            .chain(&self.extra_ignored_tags)
            .enumerate()
        {
            if FORBIDDEN_TAGS.contains(&tag.as_str()) {
                errors.push(ValidationError::new(
                    "whitelist.extraTags",
                    format!("tag {:?} can never be allowed (entry {})", tag, i),
                ));
            }
        }

        for (i, attr) in self.extra_attributes.iter().enumerate() {
            if attr.starts_with("on") {
                errors.push(ValidationError::new(
                    format!("whitelist.extraAttributes[{}]", i),
                    format!("event handler attribute {:?} can never be allowed", attr),
                ));
            }
        }

        for (tag, css) in &self.style_overrides {
            let path = format!("whitelist.styleOverrides.{}", tag);
            if !NAME_PATTERN.is_match(tag) {
                errors.push(ValidationError::new(&path, "invalid tag name"));
            }
            let declarations = parse_style_declarations(css);
            if declarations.is_empty() {
                errors.push(ValidationError::new(&path, "no CSS declarations"));
            }
            for (property, value) in declarations {
                if !is_safe_value(&value) {
                    errors.push(ValidationError::new(
                        &path,
                        format!("unsafe value for {}: {:?}", property, value),
                    ));
                }
            }
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfig {
    /// Level or filter directive (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    fn validate(&self, errors: &mut Vec<ValidationError>) {
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.level) {
            errors.push(ValidationError::new(
                "logging.level",
                format!("invalid filter {:?}: {}", self.level, e),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.media.enabled);
        assert_eq!(config.media.format, OutputFormat::Jpeg);
        assert_eq!(config.media.jpeg_quality, 80);
        assert_eq!(config.media.chunk_size, 16384);
        assert!(config.media.allow_local_files);
        assert!(!config.media.store_inline_data);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_object_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        let config: Config = serde_json::from_str(r#"{"media": {}}"#).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{"medai": {}}"#).is_err());
        assert!(serde_json::from_str::<Config>(r#"{"media": {"quality": 3}}"#).is_err());
    }

    #[test]
    fn test_media_validation_collects_all_errors() {
        let config: Config = serde_json::from_str(
            r#"{"media": {"jpegQuality": 0, "chunkSize": 1}, "logging": {"level": "pasteclean=loud"}}"#,
        )
        .unwrap();
        let errors = config.validate().unwrap_err();
        let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"media.jpegQuality"));
        assert!(paths.contains(&"media.chunkSize"));
        assert!(paths.contains(&"logging.level"));
    }

    #[test]
    fn test_resolver_options_mapping() {
        let media = MediaConfig {
            format: OutputFormat::Png,
            allow_local_files: false,
            store_inline_data: true,
            fetch_retries: 2,
            ..MediaConfig::default()
        };
        let options = media.resolver_options();
        assert_eq!(options.format, RasterFormat::Png);
        assert!(!options.allow_local_files);
        assert!(options.store_inline_data);
        assert_eq!(options.fetch.retries, 2);
    }

    #[test]
    fn test_media_dir_override() {
        let media = MediaConfig {
            media_dir: Some(PathBuf::from("/srv/assets")),
            ..MediaConfig::default()
        };
        assert_eq!(media.media_dir(), PathBuf::from("/srv/assets"));
        assert!(MediaConfig::default().media_dir().ends_with("pasteclean/media"));
    }

    #[test]
    fn test_whitelist_build() {
        let wl = WhitelistConfig {
            extra_tags: vec!["sup".into(), "sub".into()],
            remove_tags: vec!["img".into()],
            extra_ignored_tags: vec!["center".into()],
            extra_attributes: vec!["lang".into()],
            extra_styles: vec!["text-decoration".into()],
            style_overrides: BTreeMap::from([("p".to_string(), "margin: 0; color: black".to_string())]),
            remove_style_overrides: vec!["div".into()],
        }
        .build();

        assert!(wl.is_allowed("sup"));
        assert!(!wl.is_allowed("img"));
        assert!(wl.is_ignored("center"));
        assert!(wl.is_attribute_allowed("lang"));
        assert!(wl.is_style_allowed("text-decoration"));
        assert!(wl.style_overrides("div").is_empty());
        assert_eq!(
            wl.style_overrides("p"),
            &[
                ("margin".to_string(), "0".to_string()),
                ("color".to_string(), "black".to_string())
            ]
        );
    }

    #[test]
    fn test_whitelist_validation() {
        let config = WhitelistConfig {
            extra_tags: vec!["Script!".into(), "script".into()],
            extra_attributes: vec!["onload".into()],
            style_overrides: BTreeMap::from([
                ("td".to_string(), "background: url(x)".to_string()),
                ("th".to_string(), "nonsense".to_string()),
            ]),
            ..WhitelistConfig::default()
        };
        let mut errors = Vec::new();
        config.validate(&mut errors);
        let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"whitelist.extraTags[0]"));
        assert!(paths.contains(&"whitelist.extraTags"));
        assert!(paths.contains(&"whitelist.extraAttributes[0]"));
        assert!(paths.contains(&"whitelist.styleOverrides.td"));
        assert!(paths.contains(&"whitelist.styleOverrides.th"));
    }

    #[test]
    fn test_validation_error_display() {
        let e = ValidationError::new("media.chunkSize", "too small");
        assert_eq!(e.to_string(), "media.chunkSize: too small");
    }
}
