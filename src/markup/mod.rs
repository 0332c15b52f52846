//! Markup documents.
//!
//! A document is parsed into a plain [`Element`] tree first; the loader
//! interprets the tree afterwards. The same tree type is produced by
//! [`export_registry`] and written back out by [`write_document`].

mod export;
mod reader;
mod writer;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use export::{export_registry, resource_element};
pub use reader::parse_document;
pub use writer::write_document;

/// Error reading or writing markup.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum MarkupError {
    /// Malformed XML
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    /// End tag does not match the open element
    #[error("line {line}: expected </{expected}>, found </{found}>")]
    Mismatched { line: usize, expected: String, found: String },
    /// Document has no root element
    #[error("document has no root element")]
    Empty,
    /// Elements left open at end of input
    #[error("unexpected end of document inside <{0}>")]
    Unclosed(String),
    /// Failed to emit markup
    #[error("failed to write markup: {0}")]
    Write(String),
}

/// One markup element with its attributes and children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// 1-based source line, 0 for generated elements
    #[serde(default)]
    pub line: usize,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), ..Self::default() }
    }

    /// Builder form of [`Element::set_attr`].
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Attribute value; keys compare case-insensitively.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Set or replace an attribute.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    /// Short form for diagnostics: `<tag name="..">` plus the line.
    pub fn describe(&self) -> String {
        let mut out = format!("<{}", self.tag);
        if let Some(name) = self.attr("name") {
            out.push_str(&format!(" name=\"{}\"", name));
        }
        out.push('>');
        if self.line > 0 {
            out.push_str(&format!(" (line {})", self.line));
        }
        out
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
