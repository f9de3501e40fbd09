//! Markup filter engine
//!
//! A single streaming pass over pasted markup that rebuilds it from a
//! whitelisted vocabulary:
//!
//! - **Tokenizer** (`tokenizer`): forgiving scanner producing text, start and end tags
//! - **Whitelist** (`whitelist`): allowed/void/ignored tags, attributes, styles, overrides
//! - **Style parser** (`style`): ordered inline declarations
//!
//! Instead of building a tree, the engine keeps a stack of open elements and a
//! suppression depth counting the disallowed elements that enclose the current
//! position. Content is only written while that depth is zero. Each stack
//! entry remembers whether it was allowed and whether its start tag was
//! written, and closing an entry consults exactly those flags, so the counter
//! and the emitted end tags always mirror the start side.

pub mod style;
pub mod tokenizer;
pub mod whitelist;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use self::style::{is_safe_value, parse_style_declarations, StyleDeclarations};
use self::tokenizer::{tokenize, Attribute, StartTag, Token};
use self::whitelist::Whitelist;

/// Lines that are empty or whitespace-only, including the line break.
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*\n").unwrap());

/// URL schemes never allowed in `href`/`src`.
const SCRIPT_SCHEMES: &[&str] = &["javascript:", "vbscript:"];

/// Markup that had to be repaired. Diagnostic only, never a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseIrregularity {
    /// An end tag with no matching open element; it was ignored.
    StrayEndTag { tag: String },
    /// An element closed implicitly, by an outer end tag or end of input.
    UnclosedElement { tag: String },
}

impl fmt::Display for ParseIrregularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseIrregularity::StrayEndTag { tag } => write!(f, "stray end tag </{}>", tag),
            ParseIrregularity::UnclosedElement { tag } => write!(f, "unclosed element <{}>", tag),
        }
    }
}

/// Callback for `img` sources met during filtering.
///
/// Returning `Some` replaces the `src` value; `None` keeps the original.
pub trait ImageSourceHook {
    fn resolve_src(&mut self, src: &str) -> Option<String>;
}

impl<F> ImageSourceHook for F
where
    F: FnMut(&str) -> Option<String>,
{
    fn resolve_src(&mut self, src: &str) -> Option<String> {
        self(src)
    }
}

/// Hook that leaves every `src` untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepImageSources;

impl ImageSourceHook for KeepImageSources {
    fn resolve_src(&mut self, _src: &str) -> Option<String> {
        None
    }
}

/// Result of one filter pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutput {
    pub html: String,
    pub irregularities: Vec<ParseIrregularity>,
}

/// One open element as seen in the input.
#[derive(Debug, Clone)]
struct StackEntry {
    tag: String,
    allowed: bool,
    /// Whether the start tag was written to the output.
    emitted: bool,
}

/// Streaming whitelist filter. Cheap to create; holds only a borrowed whitelist.
#[derive(Debug, Clone, Copy)]
pub struct MarkupFilter<'w> {
    whitelist: &'w Whitelist,
}

impl<'w> MarkupFilter<'w> {
    pub fn new(whitelist: &'w Whitelist) -> Self {
        Self { whitelist }
    }

    /// Filter `raw`, keeping image sources as they are.
    pub fn filter(&self, raw: &str) -> FilterOutput {
        self.filter_with(raw, &mut KeepImageSources)
    }

    /// Filter `raw`, routing every visible `img src` through `hook`.
    pub fn filter_with(&self, raw: &str, hook: &mut dyn ImageSourceHook) -> FilterOutput {
        let mut pass = FilterPass {
            whitelist: self.whitelist,
            hook,
            stack: Vec::new(),
            suppress_depth: 0,
            output: String::with_capacity(raw.len()),
            irregularities: Vec::new(),
        };

        for token in tokenize(raw) {
            match token {
                Token::Text(text) => pass.text(text),
                Token::StartTag(tag) => pass.start_tag(tag),
                Token::EndTag(name) => pass.end_tag(&name),
            }
        }

        pass.finish()
    }
}

/// Per-invocation filter state.
struct FilterPass<'w, 'h> {
    whitelist: &'w Whitelist,
    hook: &'h mut dyn ImageSourceHook,
    stack: Vec<StackEntry>,
    suppress_depth: usize,
    output: String,
    irregularities: Vec<ParseIrregularity>,
}

impl FilterPass<'_, '_> {
    fn text(&mut self, text: &str) {
        if self.suppress_depth > 0 {
            return;
        }
        // Tokenizer text never holds a real tag, only stray `<`.
        if text.contains('<') {
            self.output.push_str(&text.replace('<', "&lt;"));
        } else {
            self.output.push_str(text);
        }
    }

    fn start_tag(&mut self, tag: StartTag) {
        let wl = self.whitelist;
        let is_void = wl.is_void(&tag.name);
        let allowed = wl.is_allowed(&tag.name);

        if !is_void && !allowed {
            self.suppress_depth += 1;
        }
        let emit = allowed && !wl.is_ignored(&tag.name) && self.suppress_depth == 0;
        if !is_void {
            self.stack.push(StackEntry {
                tag: tag.name.clone(),
                allowed,
                emitted: emit,
            });
        }

        if emit {
            let attributes = self.sanitize_attributes(&tag.name, &tag.attributes);
            self.output.push('<');
            self.output.push_str(&tag.name);
            for (name, value) in &attributes {
                self.output.push(' ');
                self.output.push_str(name);
                self.output.push_str("=\"");
                self.output
                    .push_str(&html_escape::encode_double_quoted_attribute(value));
                self.output.push('"');
            }
            self.output.push('>');
        }

        if tag.self_closing {
            self.end_tag(&tag.name);
        }
    }

    fn end_tag(&mut self, name: &str) {
        if self.whitelist.is_void(name) {
            return;
        }

        let Some(index) = self.stack.iter().rposition(|entry| entry.tag == name) else {
            tracing::trace!(tag = %name, "ignoring stray end tag");
            self.irregularities.push(ParseIrregularity::StrayEndTag {
                tag: name.to_string(),
            });
            return;
        };

        while self.stack.len() > index + 1 {
            if let Some(orphan) = self.stack.pop() {
                self.irregularities.push(ParseIrregularity::UnclosedElement {
                    tag: orphan.tag.clone(),
                });
                self.close(orphan);
            }
        }
        if let Some(entry) = self.stack.pop() {
            self.close(entry);
        }
    }

    /// Undo exactly what opening `entry` did.
    fn close(&mut self, entry: StackEntry) {
        if !entry.allowed {
            self.suppress_depth -= 1;
        }
        if entry.emitted {
            self.output.push_str("</");
            self.output.push_str(&entry.tag);
            self.output.push('>');
        }
    }

    /// Whitelisted attributes in output order: the synthesized `style` first,
    /// then the rest in source order. A repeated attribute keeps its first
    /// position and its last value.
    fn sanitize_attributes(&mut self, tag: &str, raw: &[Attribute]) -> Vec<(String, String)> {
        let wl = self.whitelist;
        let mut attributes: Vec<(String, String)> = Vec::new();
        let mut author_style: Option<String> = None;

        for attr in raw {
            if !wl.is_attribute_allowed(&attr.name) {
                continue;
            }
            let value = attr.value.clone().unwrap_or_default();
            if attr.name == "style" {
                author_style = Some(value);
                continue;
            }
            if !is_safe_url_attribute(&attr.name, &value) {
                tracing::debug!(tag = %tag, attribute = %attr.name, "dropping script URL");
                continue;
            }
            match attributes.iter_mut().find(|(name, _)| *name == attr.name) {
                Some(slot) => slot.1 = value,
                None => attributes.push((attr.name.clone(), value)),
            }
        }

        if tag == "img" {
            if let Some(slot) = attributes.iter_mut().find(|(name, _)| name == "src") {
                if let Some(replacement) = self.hook.resolve_src(&slot.1) {
                    slot.1 = replacement;
                }
            }
        }

        if wl.is_attribute_allowed("style") {
            let style = build_style(wl, tag, author_style.as_deref());
            if !style.is_empty() {
                attributes.insert(0, ("style".to_string(), style.serialize()));
            }
        }

        attributes
    }

    fn finish(mut self) -> FilterOutput {
        while let Some(entry) = self.stack.pop() {
            self.irregularities.push(ParseIrregularity::UnclosedElement {
                tag: entry.tag.clone(),
            });
            self.close(entry);
        }

        if !self.irregularities.is_empty() {
            tracing::debug!(
                count = self.irregularities.len(),
                "repaired malformed markup"
            );
        }

        let html = BLANK_LINES.replace_all(&self.output, "").into_owned();
        FilterOutput {
            html,
            irregularities: self.irregularities,
        }
    }
}

/// Author declarations restricted to the style whitelist, then the tag's
/// overrides on top.
fn build_style(wl: &Whitelist, tag: &str, author_style: Option<&str>) -> StyleDeclarations {
    let mut decls = StyleDeclarations::new();
    if let Some(raw) = author_style {
        for (property, value) in parse_style_declarations(raw) {
            if wl.is_style_allowed(&property) && is_safe_value(&value) {
                decls.set(&property, &value);
            }
        }
    }
    for (property, value) in wl.style_overrides(tag) {
        decls.set(property, value);
    }
    decls
}

/// `href` and `src` must not carry script; `href` must not carry inline data either.
fn is_safe_url_attribute(name: &str, value: &str) -> bool {
    if name != "href" && name != "src" {
        return true;
    }
    let compact: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    if SCRIPT_SCHEMES.iter().any(|s| compact.starts_with(s)) {
        return false;
    }
    !(name == "href" && compact.starts_with("data:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(raw: &str) -> String {
        let wl = Whitelist::default();
        MarkupFilter::new(&wl).filter(raw).html
    }

    #[test]
    fn test_plain_text_passes() {
        assert_eq!(clean("hello world"), "hello world");
        assert_eq!(clean("a &amp; b"), "a &amp; b");
    }

    #[test]
    fn test_allowed_tags_kept() {
        assert_eq!(
            clean("<p><b>bold</b> and <i>italic</i></p>"),
            "<p><b>bold</b> and <i>italic</i></p>"
        );
    }

    #[test]
    fn test_tag_names_lowercased() {
        assert_eq!(clean("<P><STRONG>x</STRONG></P>"), "<p><strong>x</strong></p>");
    }

    #[test]
    fn test_unknown_attributes_dropped() {
        assert_eq!(
            clean(r#"<a href="https://example.com" onclick="evil()" class="c">x</a>"#),
            r#"<a href="https://example.com">x</a>"#
        );
    }

    #[test]
    fn test_disallowed_subtree_dropped() {
        assert_eq!(clean("a<script>bad()</script>b"), "ab");
        assert_eq!(clean("a<style>p{}</style>b"), "ab");
        assert_eq!(clean("<p>x<object><b>hidden</b></object>y</p>"), "<p>xy</p>");
    }

    #[test]
    fn test_nested_disallowed_allowed_disallowed() {
        let out = clean("<p>keep<font>drop<b>drop<svg>drop</svg>drop</b>drop</font>keep</p><i>after</i>");
        assert_eq!(out, "<p>keepkeep</p><i>after</i>");
    }

    #[test]
    fn test_allowed_in_disallowed_in_allowed_siblings_survive() {
        let out = clean("<div><b>one</b><form><i>two</i></form><u>three</u></div>");
        assert_eq!(out, r#"<div style="padding:.2em;"><b>one</b><u>three</u></div>"#);
    }

    #[test]
    fn test_ignored_tags_unwrapped() {
        assert_eq!(
            clean("<html><body><p>x</p></body></html>"),
            "<p>x</p>"
        );
    }

    #[test]
    fn test_disallowed_void_elements_dropped() {
        assert_eq!(
            clean(r#"a<meta charset="utf-8"><input value="x">b<hr>c"#),
            "abc"
        );
    }

    #[test]
    fn test_void_elements_have_no_end_tag() {
        assert_eq!(clean("a<br>b<br/>c</br>d"), "a<br>b<br>cd");
    }

    #[test]
    fn test_mismatched_nesting_repaired() {
        let wl = Whitelist::default();
        let out = MarkupFilter::new(&wl).filter("<b><i>text</b></i>");
        assert_eq!(out.html, "<b><i>text</i></b>");
        assert_eq!(
            out.irregularities,
            vec![
                ParseIrregularity::UnclosedElement { tag: "i".into() },
                ParseIrregularity::StrayEndTag { tag: "i".into() },
            ]
        );
    }

    #[test]
    fn test_stray_end_tags_ignored() {
        assert_eq!(clean("<p>a</span>b</p></div>"), "<p>ab</p>");
    }

    #[test]
    fn test_stray_disallowed_end_tag_does_not_unsuppress() {
        assert_eq!(clean("<p>a</font>b<object>x</font>y</object>c</p>"), "<p>abc</p>");
    }

    #[test]
    fn test_unclosed_elements_closed_at_end() {
        let wl = Whitelist::default();
        let out = MarkupFilter::new(&wl).filter("<ul><li>one<li>two");
        assert_eq!(out.html, "<ul><li>one<li>two</li></li></ul>");
        assert_eq!(out.irregularities.len(), 3);
    }

    #[test]
    fn test_orphan_disallowed_entry_releases_suppression() {
        // <font> is never closed; closing <p> pops it and must end suppression.
        assert_eq!(clean("<p>a<font>b</p>c"), "<p>a</p>c");
    }

    #[test]
    fn test_style_filtered_and_ordered_first() {
        assert_eq!(
            clean(r#"<span title="t" style="color:red;position:absolute;font-weight:bold">x</span>"#),
            r#"<span style="color:red;font-weight:bold;" title="t">x</span>"#
        );
    }

    #[test]
    fn test_empty_style_omitted() {
        assert_eq!(clean(r#"<span style="position:fixed;">x</span>"#), "<span>x</span>");
        assert_eq!(clean(r#"<span style="">x</span>"#), "<span>x</span>");
    }

    #[test]
    fn test_unsafe_style_values_dropped() {
        assert_eq!(
            clean(r#"<p style="background:url(http://t.example/x.gif);color:blue">x</p>"#),
            r#"<p style="color:blue;">x</p>"#
        );
    }

    #[test]
    fn test_override_precedence() {
        assert_eq!(
            clean(r#"<table style="width:10px;"></table>"#),
            r#"<table style="box-sizing:border-box;width:100%;margin:.5em;border-collapse:collapse;outline:1px solid black;"></table>"#
        );
    }

    #[test]
    fn test_override_applies_without_author_style() {
        assert_eq!(clean("<div>x</div>"), r#"<div style="padding:.2em;">x</div>"#);
    }

    #[test]
    fn test_override_replaces_whitelisted_author_value() {
        let wl = Whitelist::default().with_style_override("p", "color", "black");
        let out = MarkupFilter::new(&wl).filter(r#"<p style="color:red;text-align:center">x</p>"#);
        assert_eq!(out.html, r#"<p style="color:black;text-align:center;">x</p>"#);
    }

    #[test]
    fn test_attribute_values_escaped() {
        assert_eq!(
            clean(r#"<img alt="say &quot;hi&quot; &amp; <go>">"#),
            r#"<img alt="say &quot;hi&quot; &amp; &lt;go&gt;">"#
        );
    }

    #[test]
    fn test_attribute_without_value() {
        assert_eq!(clean("<td colspan>x</td>"), r#"<td style="position:relative;border:1px solid black;padding:.2em;" colspan="">x</td>"#);
    }

    #[test]
    fn test_duplicate_attribute_last_value_wins() {
        assert_eq!(
            clean(r#"<a title="one" href="h" title="two">x</a>"#),
            r#"<a title="two" href="h">x</a>"#
        );
    }

    #[test]
    fn test_script_urls_dropped() {
        assert_eq!(clean(r#"<a href="javascript:alert(1)">x</a>"#), "<a>x</a>");
        assert_eq!(clean("<a href=\" JaVa\tScRiPt:alert(1)\">x</a>"), "<a>x</a>");
        assert_eq!(clean(r#"<a href="data:text/html,<b>">x</a>"#), "<a>x</a>");
        assert_eq!(clean(r#"<img src="vbscript:x">"#), "<img>");
    }

    #[test]
    fn test_stray_angle_bracket_escaped() {
        assert_eq!(clean("<p>1 < 2</p>"), "<p>1 &lt; 2</p>");
    }

    #[test]
    fn test_comments_dropped() {
        assert_eq!(clean("<p>a<!-- secret -->b</p>"), "<p>ab</p>");
    }

    #[test]
    fn test_blank_lines_collapsed() {
        assert_eq!(
            clean("<div>\n  <script>x</script>\n\n   \n<p>a</p>\n</div>"),
            "<div style=\"padding:.2em;\">\n<p>a</p>\n</div>"
        );
    }

    #[test]
    fn test_self_closing_non_void_is_opened_and_closed() {
        assert_eq!(clean("a<b/>c<script/>d"), "a<b></b>cd");
    }

    #[test]
    fn test_image_hook_rewrites_src() {
        let wl = Whitelist::default();
        let mut seen = Vec::new();
        let mut hook = |src: &str| {
            seen.push(src.to_string());
            Some(format!("local-{}", seen.len()))
        };
        let out = MarkupFilter::new(&wl).filter_with(
            r#"<img src="http://a/1.png" alt="a"><script><img src="http://a/hidden.png"></script><img src='http://a/2.png'>"#,
            &mut hook,
        );
        assert_eq!(out.html, r#"<img src="local-1" alt="a"><img src="local-2">"#);
        assert_eq!(seen, vec!["http://a/1.png", "http://a/2.png"]);
    }

    #[test]
    fn test_image_hook_none_keeps_src() {
        let wl = Whitelist::default();
        let mut hook = |_: &str| -> Option<String> { None };
        let out = MarkupFilter::new(&wl).filter_with(r#"<img src="http://x/y.png">"#, &mut hook);
        assert_eq!(out.html, r#"<img src="http://x/y.png">"#);
    }

    #[test]
    fn test_end_to_end_example() {
        assert_eq!(
            clean(r#"<div onclick="evil()"><p style="color:red;unknown:1">Hi <script>bad()</script>there</p></div>"#),
            r#"<div style="padding:.2em;"><p style="color:red;">Hi there</p></div>"#
        );
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let inputs = [
            r#"<div onclick="x"><p style="color:red;unknown:1">Hi <script>bad()</script>there</p></div>"#,
            "<b><i>text</b></i>",
            r#"<table style="width:10px"><tr><th>h</th></tr><tr><td colspan=2 style="color:blue">v</td></tr></table>"#,
            "<ul><li>one<li>two",
            "<p>1 < 2 &amp; 3</p>\n\n\n<p>x</p>",
            r#"<img alt="a &amp; b" src="x.png" title='"q"'>"#,
        ];
        for input in inputs {
            let once = clean(input);
            let twice = clean(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_whitelist_closure() {
        let wl = Whitelist::default();
        let input = r#"<html><head><title>t</title><meta x=1></head><body>
            <div id="d" style="color:red;margin:0"><font face="x"><b>gone</b></font>
            <table border=1><tr><td onclick="x" style="font-size:99px">c</td></tr></table>
            <a href="/x" target="_blank" rel="x">l</a><img src="s" width=1 alt=a>
            <iframe src="http://evil"></iframe><u data-x="1">u</u></div></body></html>"#;
        let out = MarkupFilter::new(&wl).filter(input).html;

        for token in tokenize(&out) {
            let Token::StartTag(tag) = token else { continue };
            assert!(wl.is_allowed(&tag.name), "tag {} leaked", tag.name);
            for attr in &tag.attributes {
                assert!(wl.is_attribute_allowed(&attr.name), "attribute {} leaked", attr.name);
                if attr.name == "style" {
                    for (property, _) in parse_style_declarations(attr.value.as_deref().unwrap_or("")) {
                        assert!(
                            wl.is_style_allowed(&property) || wl.is_override(&property),
                            "style {property} leaked"
                        );
                    }
                }
            }
        }
        assert!(!out.contains("gone"));
    }

    #[test]
    fn test_custom_whitelist_instances_do_not_interfere() {
        let strict = Whitelist::default().without_tags(["b"]);
        let loose = Whitelist::default().with_allowed_tags(["sup"]);
        assert_eq!(MarkupFilter::new(&strict).filter("<b>x</b><sup>2</sup>").html, "");
        assert_eq!(
            MarkupFilter::new(&loose).filter("<b>x</b><sup>2</sup>").html,
            "<b>x</b><sup>2</sup>"
        );
    }

    #[test]
    fn test_without_overrides_no_style_synthesized() {
        let wl = Whitelist::default().without_style_overrides("div");
        assert_eq!(MarkupFilter::new(&wl).filter("<div>x</div>").html, "<div>x</div>");
    }
}
