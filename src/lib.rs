//! pasteclean library
//!
//! Sanitizes rich-text markup pasted from word processors, browsers and mail
//! clients down to a small whitelisted vocabulary, and turns the images it
//! references into deduplicated local assets.
//!
//! # Example
//!
//! ```
//! use pasteclean::Sanitizer;
//!
//! let report = Sanitizer::default().sanitize(r#"<p onclick="x">Hi<script>bad()</script></p>"#);
//! assert_eq!(report.html, "<p>Hi</p>");
//! ```

pub mod cli;
pub mod config;
pub mod filter;
pub mod logging;
pub mod media;
pub mod pipeline;

pub use config::{Config, ConfigError};
pub use filter::whitelist::Whitelist;
pub use filter::{FilterOutput, ImageSourceHook, MarkupFilter, ParseIrregularity};
pub use media::{
    AssetHandle, AssetStore, DirAssetStore, MediaReference, MediaResolver, MemoryAssetStore,
    ResolutionFailure, Resolved, ResolverOptions,
};
pub use pipeline::{MediaOutcome, MediaStatus, Notifier, SanitizeReport, Sanitizer, TracingNotifier};
