//! Streaming markup tokenizer
//!
//! A forgiving, allocation-light scanner over pasted markup. It yields text
//! runs, start tags and end tags; comments, doctypes, processing
//! instructions and CDATA sections are consumed silently. It never fails:
//! anything that is not recognizable markup is text, and a tag cut off by the
//! end of input is dropped.
//!
//! The scanner only stops at ASCII structural bytes, so every slice it takes
//! lies on a UTF-8 character boundary.

use std::borrow::Cow;

use crate::filter::whitelist::normalize;

/// Elements whose content is read verbatim up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript", "textarea", "title",
];

/// One attribute of a start tag. Names are lowercased, values entity-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

/// A start tag with its raw attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub name: String,
    pub attributes: Vec<Attribute>,
    /// Written as `<name ... />`.
    pub self_closing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Text exactly as written, entity references included.
    Text(&'a str),
    StartTag(StartTag),
    EndTag(String),
}

/// Iterator over the tokens of a markup string.
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    /// Set after a raw-text start tag; holds the name whose end tag closes it.
    raw_text: Option<String>,
}

/// Tokenize `input`.
pub fn tokenize(input: &str) -> Tokenizer<'_> {
    Tokenizer::new(input)
}

fn is_raw_text_element(name: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&name)
}

/// Whether the `<` at `i` opens markup rather than being literal text.
fn starts_markup(bytes: &[u8], i: usize) -> bool {
    match bytes.get(i + 1) {
        Some(b) => b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'),
        None => false,
    }
}

/// Position of the `</tag` that closes a raw-text element, case-insensitive.
fn find_raw_text_close(haystack: &str, tag: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(rel) = haystack[from..].find("</") {
        let at = from + rel;
        let name_start = at + 2;
        let name_end = name_start + tag.len();
        if name_end <= bytes.len()
            && bytes[name_start..name_end].eq_ignore_ascii_case(tag.as_bytes())
        {
            match bytes.get(name_end) {
                None | Some(b'>') | Some(b'/') => return Some(at),
                Some(b) if b.is_ascii_whitespace() => return Some(at),
                _ => {}
            }
        }
        from = name_start;
    }
    None
}

fn decode_value(raw: &str) -> String {
    match html_escape::decode_html_entities(raw) {
        Cow::Borrowed(s) => s.to_string(),
        Cow::Owned(s) => s,
    }
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            raw_text: None,
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    fn skip_whitespace(&self, mut i: usize) -> usize {
        let bytes = self.bytes();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        i
    }

    /// Skip past `terminator` starting at `from`, or to end of input.
    fn skip_past(&mut self, from: usize, terminator: &str) {
        self.pos = match self.input[from..].find(terminator) {
            Some(rel) => from + rel + terminator.len(),
            None => self.input.len(),
        };
    }

    fn scan_text(&mut self) -> &'a str {
        let input = self.input;
        let bytes = input.as_bytes();
        let start = self.pos;
        let mut i = start;
        while i < bytes.len() {
            if bytes[i] == b'<' && i > start && starts_markup(bytes, i) {
                break;
            }
            i += 1;
        }
        self.pos = i;
        &input[start..i]
    }

    fn scan_raw_text(&mut self, tag: &str) -> &'a str {
        let input = self.input;
        let start = self.pos;
        let rest = &input[start..];
        let end = find_raw_text_close(rest, tag).unwrap_or(rest.len());
        self.pos = start + end;
        &rest[..end]
    }

    /// Parse `</name ...>` at `self.pos`. Returns `None` for bogus or
    /// unterminated end tags, which are consumed without a token.
    fn scan_end_tag(&mut self) -> Option<Token<'a>> {
        let input = self.input;
        let bytes = input.as_bytes();
        let name_start = self.pos + 2;
        if !bytes.get(name_start).is_some_and(|b| b.is_ascii_alphabetic()) {
            self.skip_past(name_start, ">");
            return None;
        }
        let mut i = name_start;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'/' | b'>')
        {
            i += 1;
        }
        let name = normalize(&input[name_start..i]).into_owned();
        match input[i..].find('>') {
            Some(rel) => {
                self.pos = i + rel + 1;
                Some(Token::EndTag(name))
            }
            None => {
                self.pos = input.len();
                None
            }
        }
    }

    /// Parse `<name attr=value ...>` at `self.pos`. Returns `None` when the
    /// tag runs into the end of input.
    fn scan_start_tag(&mut self) -> Option<StartTag> {
        let input = self.input;
        let bytes = input.as_bytes();
        let name_start = self.pos + 1;
        let mut i = name_start;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'/' | b'>')
        {
            i += 1;
        }
        let name = normalize(&input[name_start..i]).into_owned();

        let mut attributes = Vec::new();
        let mut self_closing = false;
        loop {
            i = self.skip_whitespace(i);
            let Some(&b) = bytes.get(i) else {
                self.pos = input.len();
                return None;
            };
            match b {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' => {
                    i += 1;
                    if bytes.get(i) == Some(&b'>') {
                        self_closing = true;
                        i += 1;
                        break;
                    }
                }
                _ => {
                    let attr_start = i;
                    i += 1;
                    while i < bytes.len()
                        && !bytes[i].is_ascii_whitespace()
                        && !matches!(bytes[i], b'/' | b'>' | b'=')
                    {
                        i += 1;
                    }
                    let attr_name = normalize(&input[attr_start..i]).into_owned();
                    i = self.skip_whitespace(i);

                    let mut value = None;
                    if bytes.get(i) == Some(&b'=') {
                        i = self.skip_whitespace(i + 1);
                        match bytes.get(i) {
                            Some(&quote) if quote == b'"' || quote == b'\'' => {
                                let value_start = i + 1;
                                let Some(rel) = input[value_start..].find(quote as char) else {
                                    self.pos = input.len();
                                    return None;
                                };
                                value = Some(decode_value(&input[value_start..value_start + rel]));
                                i = value_start + rel + 1;
                            }
                            _ => {
                                let value_start = i;
                                while i < bytes.len()
                                    && !bytes[i].is_ascii_whitespace()
                                    && bytes[i] != b'>'
                                {
                                    i += 1;
                                }
                                value = Some(decode_value(&input[value_start..i]));
                            }
                        }
                    }
                    attributes.push(Attribute {
                        name: attr_name,
                        value,
                    });
                }
            }
        }

        self.pos = i;
        Some(StartTag {
            name,
            attributes,
            self_closing,
        })
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        loop {
            if self.pos >= self.input.len() {
                return None;
            }

            if let Some(tag) = self.raw_text.take() {
                let text = self.scan_raw_text(&tag);
                if !text.is_empty() {
                    return Some(Token::Text(text));
                }
                continue;
            }

            let input = self.input;
            let rest = &input[self.pos..];
            let bytes = input.as_bytes();
            if bytes[self.pos] != b'<' || !starts_markup(bytes, self.pos) {
                return Some(Token::Text(self.scan_text()));
            }

            if rest.starts_with("<!--") {
                self.skip_past(self.pos + 4, "-->");
            } else if rest.starts_with("<![CDATA[") {
                self.skip_past(self.pos + 9, "]]>");
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.skip_past(self.pos + 2, ">");
            } else if rest.starts_with("</") {
                if let Some(token) = self.scan_end_tag() {
                    return Some(token);
                }
            } else if let Some(tag) = self.scan_start_tag() {
                if !tag.self_closing && is_raw_text_element(&tag.name) {
                    self.raw_text = Some(tag.name.clone());
                }
                return Some(Token::StartTag(tag));
            }
        }
    }
}
