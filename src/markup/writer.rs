//! [`Element`] tree → XML.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use super::{Element, MarkupError};

fn write_err(e: impl std::fmt::Display) -> MarkupError {
    MarkupError::Write(e.to_string())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), MarkupError> {
    let mut start = BytesStart::new(element.tag.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(write_err);
    }

    writer.write_event(Event::Start(start)).map_err(write_err)?;
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.tag.as_str()))).map_err(write_err)
}

/// Render `root` as an indented XML document.
pub fn write_document(root: &Element) -> Result<String, MarkupError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_err)?;
    write_element(&mut writer, root)?;

    let mut out = String::from_utf8(writer.into_inner()).map_err(write_err)?;
    out.push('\n');
    Ok(out)
}
