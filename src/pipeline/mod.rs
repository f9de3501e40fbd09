//! Sanitization pipeline
//!
//! Wires the markup filter to the media resolver: every visible `img src` is
//! localized while the markup is filtered, and every media failure produces
//! exactly one user-facing warning while the original `src` is kept.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigError};
use crate::filter::whitelist::Whitelist;
use crate::filter::{FilterOutput, ImageSourceHook, MarkupFilter, ParseIrregularity};
use crate::media::reference::abbreviate;
use crate::media::{
    AssetHandle, AssetStore, MediaResolver, NoProgress, ProgressSink, Resolved, ResolutionFailure,
};

/// Longest source shown in a warning.
const WARNING_SOURCE_CHARS: usize = 80;

/// Fire-and-forget user notifications.
pub trait Notifier: Send + Sync {
    fn warn(&self, message: &str);
}

impl<F> Notifier for F
where
    F: Fn(&str) + Send + Sync,
{
    fn warn(&self, message: &str) {
        self(message)
    }
}

/// Sends warnings to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

/// What happened to one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaStatus {
    Stored(AssetHandle),
    Passthrough,
    Failed(ResolutionFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOutcome {
    /// The `src` as found in the markup.
    pub source: String,
    pub status: MediaStatus,
}

/// Result of sanitizing one paste.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub html: String,
    pub irregularities: Vec<ParseIrregularity>,
    pub media: Vec<MediaOutcome>,
}

impl SanitizeReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ResolutionFailure)> {
        self.media.iter().filter_map(|outcome| match &outcome.status {
            MediaStatus::Failed(failure) => Some((outcome.source.as_str(), failure)),
            _ => None,
        })
    }

    pub fn stored(&self) -> impl Iterator<Item = &AssetHandle> {
        self.media.iter().filter_map(|outcome| match &outcome.status {
            MediaStatus::Stored(handle) => Some(handle),
            _ => None,
        })
    }
}

/// Filter plus optional media localization.
pub struct Sanitizer {
    whitelist: Arc<Whitelist>,
    resolver: Option<MediaResolver>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sanitizer")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(Arc::new(Whitelist::default()))
    }
}

impl Sanitizer {
    /// Filter only; image sources are kept as they are.
    pub fn new(whitelist: Arc<Whitelist>) -> Self {
        Self {
            whitelist,
            resolver: None,
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_resolver(mut self, resolver: MediaResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Build from configuration. The media step is only set up when
    /// `media.enabled` is true.
    pub fn from_config(config: &Config, store: Arc<dyn AssetStore>) -> Result<Self, ConfigError> {
        config.validate().map_err(ConfigError::Validation)?;
        let sanitizer = Self::new(Arc::new(config.whitelist.build()));
        if !config.media.enabled {
            return Ok(sanitizer);
        }
        let resolver = MediaResolver::new(config.media.resolver_options(), store)?;
        Ok(sanitizer.with_resolver(resolver))
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    pub fn resolver(&self) -> Option<&MediaResolver> {
        self.resolver.as_ref()
    }

    pub fn sanitize(&self, raw: &str) -> SanitizeReport {
        self.sanitize_with(raw, &NoProgress, &CancellationToken::new())
    }

    /// Sanitize, reporting download progress to `progress`. Cancelling
    /// `cancel` aborts the download in flight and any later ones.
    pub fn sanitize_with(
        &self,
        raw: &str,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> SanitizeReport {
        let filter = MarkupFilter::new(&self.whitelist);

        let Some(resolver) = &self.resolver else {
            let FilterOutput {
                html,
                irregularities,
            } = filter.filter(raw);
            return SanitizeReport {
                html,
                irregularities,
                media: Vec::new(),
            };
        };

        let mut hook = MediaHook {
            resolver,
            notifier: self.notifier.as_ref(),
            progress,
            cancel,
            outcomes: Vec::new(),
        };
        let output = filter.filter_with(raw, &mut hook);

        tracing::debug!(
            images = hook.outcomes.len(),
            irregularities = output.irregularities.len(),
            "sanitized paste"
        );
        SanitizeReport {
            html: output.html,
            irregularities: output.irregularities,
            media: hook.outcomes,
        }
    }
}

/// Bridges filter callbacks to the resolver for one run.
struct MediaHook<'a> {
    resolver: &'a MediaResolver,
    notifier: &'a dyn Notifier,
    progress: &'a dyn ProgressSink,
    cancel: &'a CancellationToken,
    outcomes: Vec<MediaOutcome>,
}

impl ImageSourceHook for MediaHook<'_> {
    fn resolve_src(&mut self, src: &str) -> Option<String> {
        let result = self.resolver.resolve_src(src, self.progress, self.cancel);
        let (status, replacement) = match result {
            Ok(Resolved::Stored(handle)) => {
                let replacement = handle.to_string();
                (MediaStatus::Stored(handle), Some(replacement))
            }
            Ok(Resolved::Passthrough) => (MediaStatus::Passthrough, None),
            Err(failure) => {
                self.notifier.warn(&format!(
                    "Failed to download {}: {}",
                    abbreviate(src, WARNING_SOURCE_CHARS),
                    failure
                ));
                (MediaStatus::Failed(failure), None)
            }
        };
        self.outcomes.push(MediaOutcome {
            source: src.to_string(),
            status,
        });
        replacement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MemoryAssetStore, ResolverOptions};
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use parking_lot::Mutex;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 128, 0, 255])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn collecting_notifier() -> (Arc<dyn Notifier>, Arc<Mutex<Vec<String>>>) {
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let sink = warnings.clone();
        let notifier: Arc<dyn Notifier> = Arc::new(move |m: &str| sink.lock().push(m.to_string()));
        (notifier, warnings)
    }

    fn media_sanitizer(store: Arc<MemoryAssetStore>) -> (Sanitizer, Arc<Mutex<Vec<String>>>) {
        let (notifier, warnings) = collecting_notifier();
        let resolver = MediaResolver::new(ResolverOptions::default(), store).unwrap();
        let sanitizer = Sanitizer::default()
            .with_resolver(resolver)
            .with_notifier(notifier);
        (sanitizer, warnings)
    }

    #[test]
    fn test_filter_only() {
        let report = Sanitizer::default().sanitize(r#"<p onclick="x">a<img src="http://h/i.png"></p>"#);
        assert_eq!(report.html, r#"<p>a<img src="http://h/i.png"></p>"#);
        assert!(report.media.is_empty());
        assert!(report.irregularities.is_empty());
    }

    #[test]
    fn test_local_image_replaced_by_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, png_bytes()).unwrap();

        let store = Arc::new(MemoryAssetStore::new());
        let (sanitizer, warnings) = media_sanitizer(store.clone());
        let raw = format!(r#"<p><img alt="x" src="{}"></p>"#, path.display());
        let report = sanitizer.sanitize(&raw);

        let handle = report.stored().next().unwrap().clone();
        assert_eq!(
            report.html,
            format!(r#"<p><img alt="x" src="{}"></p>"#, handle)
        );
        assert!(store.get(&handle).is_some());
        assert!(warnings.lock().is_empty());
    }

    #[test]
    fn test_failure_keeps_src_and_warns_once() {
        let store = Arc::new(MemoryAssetStore::new());
        let (sanitizer, warnings) = media_sanitizer(store.clone());
        let report = sanitizer.sanitize(r#"<p>a<img src="/no/such/image.png">b</p>"#);

        assert_eq!(report.html, r#"<p>a<img src="/no/such/image.png">b</p>"#);
        let warnings = warnings.lock();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Failed to download /no/such/image.png: "));
        assert_eq!(report.failures().count(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_each_failure_warned_separately() {
        let (sanitizer, warnings) = media_sanitizer(Arc::new(MemoryAssetStore::new()));
        let report = sanitizer.sanitize(r#"<img src="/missing/1.png"><img src="ftp://x/2.png">"#);
        assert_eq!(report.failures().count(), 2);
        assert_eq!(warnings.lock().len(), 2);
    }

    #[test]
    fn test_suppressed_images_never_resolved() {
        let (sanitizer, warnings) = media_sanitizer(Arc::new(MemoryAssetStore::new()));
        let report = sanitizer.sanitize(r#"<object><img src="/missing.png"></object>ok"#);
        assert_eq!(report.html, "ok");
        assert!(report.media.is_empty());
        assert!(warnings.lock().is_empty());
    }

    #[test]
    fn test_data_uri_passthrough_no_warning() {
        let (sanitizer, warnings) = media_sanitizer(Arc::new(MemoryAssetStore::new()));
        let report = sanitizer.sanitize(r#"<img src="data:image/png;base64,AAAA">"#);
        assert_eq!(report.html, r#"<img src="data:image/png;base64,AAAA">"#);
        assert_eq!(report.media[0].status, MediaStatus::Passthrough);
        assert!(warnings.lock().is_empty());
    }

    #[test]
    fn test_long_sources_abbreviated_in_warning() {
        let (sanitizer, warnings) = media_sanitizer(Arc::new(MemoryAssetStore::new()));
        let long = format!("/missing/{}.png", "x".repeat(200));
        sanitizer.sanitize(&format!(r#"<img src="{}">"#, long));
        let warnings = warnings.lock();
        assert!(warnings[0].contains("..."));
        assert!(!warnings[0].contains(&long));
    }

    #[test]
    fn test_from_config_media_disabled() {
        let mut config = Config::default();
        config.media.enabled = false;
        let sanitizer = Sanitizer::from_config(&config, Arc::new(MemoryAssetStore::new())).unwrap();
        assert!(sanitizer.resolver().is_none());
    }

    #[test]
    fn test_from_config_applies_whitelist() {
        let mut config = Config::default();
        config.whitelist.extra_tags = vec!["sup".to_string()];
        let sanitizer = Sanitizer::from_config(&config, Arc::new(MemoryAssetStore::new())).unwrap();
        assert!(sanitizer.whitelist().is_allowed("sup"));
        assert!(sanitizer.resolver().is_some());
        assert_eq!(sanitizer.sanitize("x<sup>2</sup>").html, "x<sup>2</sup>");
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = Config::default();
        config.media.chunk_size = 0;
        let err = Sanitizer::from_config(&config, Arc::new(MemoryAssetStore::new())).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
