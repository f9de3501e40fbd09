//! Whitelist tables
//!
//! Immutable vocabulary the markup filter is allowed to emit: element names,
//! void elements, ignored (unwrapped) elements, attributes, CSS properties and
//! per-tag style overrides. A `Whitelist` is built once and shared by reference,
//! so several sanitizers can run side by side with different vocabularies.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

/// Elements that never have children or an end tag.
pub const DEFAULT_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "command", "embed", "frame", "hr",
    "image", "img", "input", "isindex", "keygen", "link", "menuitem", "meta", "nextid", "param",
    "source", "track", "wbr",
];

/// Elements that survive filtering.
pub const DEFAULT_ALLOWED_TAGS: &[&str] = &[
    // Paragraph-related elements
    "p", "h1", "h2", "h3", "h4", "h5", "blockquote", "pre",
    // Inline elements
    "img", "a", "span", "br", "code", "b", "em", "i", "u", "strong",
    // Lists
    "ul", "ol", "li",
    // Layout
    "div", "table", "tr", "td", "thead", "th", "tbody",
];

/// Structurally valid elements whose own tags are dropped but whose content is kept.
pub const DEFAULT_IGNORED_TAGS: &[&str] = &["html", "body"];

/// Attributes kept on any allowed element.
pub const DEFAULT_ALLOWED_ATTRIBUTES: &[&str] = &[
    "style", "src", "alt", "href", "title", "colspan", "rowspan",
];

/// CSS properties kept inside a `style` attribute.
pub const DEFAULT_ALLOWED_STYLES: &[&str] = &[
    // Text
    "font-weight", "color", "background-color", "font-style",
    // Block
    "text-align", "valign",
    // Table
    "background",
];

/// Declarations force-applied to specific tags, in application order.
pub const DEFAULT_STYLE_OVERRIDES: &[(&str, &[(&str, &str)])] = &[
    (
        "table",
        &[
            ("box-sizing", "border-box"),
            ("width", "100%"),
            ("margin", ".5em"),
            ("border-collapse", "collapse"),
            ("outline", "1px solid black"),
        ],
    ),
    (
        "th",
        &[
            ("position", "relative"),
            ("border", "1px solid black"),
            ("padding", ".4em"),
            ("font-size", "1.2em"),
        ],
    ),
    (
        "td",
        &[
            ("position", "relative"),
            ("border", "1px solid black"),
            ("padding", ".2em"),
        ],
    ),
    ("div", &[("padding", ".2em")]),
];

/// Lowercase a name, borrowing when it already is.
pub(crate) fn normalize(name: &str) -> Cow<'_, str> {
    if name.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(name.to_ascii_lowercase())
    } else {
        Cow::Borrowed(name)
    }
}

fn to_set(names: &[&str]) -> HashSet<String> {
    names.iter().map(|n| n.to_ascii_lowercase()).collect()
}

/// Tag, attribute and style vocabulary for one sanitizer.
///
/// Invariant: every ignored tag is also allowed. The builder methods keep it
/// that way, since an ignored tag must count as allowed for suppression
/// accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Whitelist {
    allowed_tags: HashSet<String>,
    void_elements: HashSet<String>,
    ignored_tags: HashSet<String>,
    allowed_attributes: HashSet<String>,
    allowed_styles: HashSet<String>,
    style_overrides: HashMap<String, Vec<(String, String)>>,
}

impl Default for Whitelist {
    fn default() -> Self {
        let mut allowed_tags = to_set(DEFAULT_ALLOWED_TAGS);
        let ignored_tags = to_set(DEFAULT_IGNORED_TAGS);
        allowed_tags.extend(ignored_tags.iter().cloned());

        let style_overrides = DEFAULT_STYLE_OVERRIDES
            .iter()
            .map(|(tag, decls)| {
                let decls = decls
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                (tag.to_string(), decls)
            })
            .collect();

        Self {
            allowed_tags,
            void_elements: to_set(DEFAULT_VOID_ELEMENTS),
            ignored_tags,
            allowed_attributes: to_set(DEFAULT_ALLOWED_ATTRIBUTES),
            allowed_styles: to_set(DEFAULT_ALLOWED_STYLES),
            style_overrides,
        }
    }
}

impl Whitelist {
    /// Whitelist with the stock paste vocabulary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow additional tags.
    pub fn with_allowed_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            self.allowed_tags.insert(normalize(tag.as_ref()).into_owned());
        }
        self
    }

    /// Stop allowing tags. Removed tags are also dropped from the ignored set.
    pub fn without_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            let tag = normalize(tag.as_ref());
            self.allowed_tags.remove(tag.as_ref());
            self.ignored_tags.remove(tag.as_ref());
        }
        self
    }

    /// Mark tags as ignored (unwrapped). They become allowed as well.
    pub fn with_ignored_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            let tag = normalize(tag.as_ref()).into_owned();
            self.allowed_tags.insert(tag.clone());
            self.ignored_tags.insert(tag);
        }
        self
    }

    /// Allow additional attributes.
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for attr in attributes {
            self.allowed_attributes
                .insert(normalize(attr.as_ref()).into_owned());
        }
        self
    }

    /// Allow additional CSS properties.
    pub fn with_styles<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for prop in properties {
            self.allowed_styles
                .insert(normalize(prop.as_ref()).into_owned());
        }
        self
    }

    /// Force `property: value` onto every `tag`. Replaces an existing override
    /// for the same property, keeping its position.
    pub fn with_style_override(mut self, tag: &str, property: &str, value: &str) -> Self {
        let decls = self
            .style_overrides
            .entry(normalize(tag).into_owned())
            .or_default();
        let property = normalize(property).into_owned();
        match decls.iter_mut().find(|(k, _)| *k == property) {
            Some(slot) => slot.1 = value.to_string(),
            None => decls.push((property, value.to_string())),
        }
        self
    }

    /// Drop every override for `tag`.
    pub fn without_style_overrides(mut self, tag: &str) -> Self {
        self.style_overrides.remove(normalize(tag).as_ref());
        self
    }

    pub fn is_void(&self, tag: &str) -> bool {
        self.void_elements.contains(normalize(tag).as_ref())
    }

    pub fn is_allowed(&self, tag: &str) -> bool {
        self.allowed_tags.contains(normalize(tag).as_ref())
    }

    pub fn is_ignored(&self, tag: &str) -> bool {
        self.ignored_tags.contains(normalize(tag).as_ref())
    }

    pub fn is_attribute_allowed(&self, name: &str) -> bool {
        self.allowed_attributes.contains(normalize(name).as_ref())
    }

    pub fn is_style_allowed(&self, property: &str) -> bool {
        self.allowed_styles.contains(normalize(property).as_ref())
    }

    /// Forced declarations for `tag`, in application order.
    pub fn style_overrides(&self, tag: &str) -> &[(String, String)] {
        self.style_overrides
            .get(normalize(tag).as_ref())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `property` is forced onto at least one tag.
    pub fn is_override(&self, property: &str) -> bool {
        let property = normalize(property);
        self.style_overrides
            .values()
            .flatten()
            .any(|(k, _)| *k == property)
    }
}
