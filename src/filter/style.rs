//! Inline style declarations
//!
//! Parses the free-form text of a `style` attribute into ordered
//! `(property, value)` pairs. Input is untrusted, so nothing here fails:
//! fragments that do not look like a declaration are skipped.

/// Value fragments that can pull in URLs or script through CSS.
const UNSAFE_VALUE_MARKERS: &[&str] = &["url(", "expression(", "javascript:", "<", ">", "\\"];

/// Parse `prop: value; prop2: value2` into ordered pairs.
///
/// Property names are lowercased, both sides are trimmed. Fragments without a
/// colon, or with an empty property or value, are dropped. Duplicates are kept
/// here; `StyleDeclarations::set` resolves them later.
pub fn parse_style_declarations(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|fragment| {
            let (property, value) = fragment.split_once(':')?;
            let property = property.trim();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            Some((property.to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

/// Whether a declaration value is free of constructs that load resources or run script.
pub fn is_safe_value(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    !UNSAFE_VALUE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Insertion-ordered declaration map. Setting an existing property replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleDeclarations {
    entries: Vec<(String, String)>,
}

impl StyleDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, property: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == property) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.entries.push((property.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == property)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize as `prop:value;` pairs, in insertion order.
    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}:{};", k, v))
            .collect()
    }
}
