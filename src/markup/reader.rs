//! XML → [`Element`] tree.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{Element, MarkupError};

/// Maps byte offsets to line numbers, counting newlines incrementally.
///
/// Offsets are queried in increasing order while reading, so each byte is
/// scanned once.
struct LineCounter<'a> {
    source: &'a [u8],
    offset: usize,
    line: usize,
}

impl<'a> LineCounter<'a> {
    fn new(source: &'a str) -> Self {
        Self { source: source.as_bytes(), offset: 0, line: 1 }
    }

    fn line_at(&mut self, position: u64) -> usize {
        let end = (position as usize).min(self.source.len());
        if end < self.offset {
            self.offset = 0;
            self.line = 1;
        }
        self.line += self.source[self.offset..end].iter().filter(|&&b| b == b'\n').count();
        self.offset = end;
        self.line
    }

    /// Line of the tag that ends at `position`.
    ///
    /// `<` cannot appear unescaped inside a tag, so the last one before the
    /// end of the tag is where it starts.
    fn tag_line(&mut self, position: u64) -> usize {
        let end = (position as usize).min(self.source.len());
        let floor = self.offset.min(end);
        let start = match self.source[floor..end].iter().rposition(|&b| b == b'<') {
            Some(i) => floor + i,
            None => self.source[..end].iter().rposition(|&b| b == b'<').unwrap_or(0),
        };
        self.line_at(start as u64)
    }
}

fn open_element(start: &BytesStart<'_>, line: usize) -> Result<Element, MarkupError> {
    let syntax = |message: String| MarkupError::Syntax { line, message };

    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element { tag, line, ..Element::default() };

    for attr in start.attributes() {
        let attr = attr.map_err(|e| syntax(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| syntax(e.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }

    Ok(element)
}

/// Parse a document and return its root element.
///
/// Text content, comments and processing instructions are skipped; the
/// format carries everything in elements and attributes.
pub fn parse_document(source: &str) -> Result<Element, MarkupError> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut lines = LineCounter::new(source);

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(MarkupError::Syntax {
                    line: lines.line_at(reader.error_position()),
                    message: e.to_string(),
                })
            }
        };
        let line = lines.tag_line(reader.buffer_position());

        match event {
            Event::Start(start) => {
                stack.push(open_element(&start, line)?);
            }
            Event::Empty(start) => {
                let element = open_element(&start, line)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    None => {
                        return Err(MarkupError::Syntax {
                            line,
                            message: "more than one root element".to_string(),
                        })
                    }
                }
            }
            Event::End(end) => {
                let found = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                let element = stack.pop().ok_or_else(|| MarkupError::Syntax {
                    line,
                    message: format!("unexpected </{}>", found),
                })?;
                if element.tag != found {
                    return Err(MarkupError::Mismatched { line, expected: element.tag, found });
                }
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    None => {
                        return Err(MarkupError::Syntax {
                            line,
                            message: "more than one root element".to_string(),
                        })
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(MarkupError::Unclosed(open.tag));
    }
    root.ok_or(MarkupError::Empty)
}
