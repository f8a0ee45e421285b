use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("XML serialization failed: {0}")]
pub struct XmlError(String);

fn xml_err(e: impl std::fmt::Display) -> XmlError {
    XmlError(e.to_string())
}

/// Indented XML document built element by element in memory.
pub struct XmlDocument {
    writer: Writer<Vec<u8>>,
}

impl XmlDocument {
    pub fn new() -> Result<Self, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;
        Ok(Self { writer })
    }

    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), XmlError> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer
            .write_event(Event::Start(element))
            .map_err(xml_err)
    }

    pub fn end(&mut self, name: &str) -> Result<(), XmlError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_err)
    }

    pub fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), XmlError> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer
            .write_event(Event::Empty(element))
            .map_err(xml_err)
    }

    /// `<name>text</name>`, with `text` escaped.
    pub fn text_element(&mut self, name: &str, text: &str) -> Result<(), XmlError> {
        self.text_element_with(name, &[], text)
    }

    pub fn text_element_with(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> Result<(), XmlError> {
        self.start(name, attributes)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_err)?;
        self.end(name)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_document() {
        let mut doc = XmlDocument::new().unwrap();
        doc.start("Root", &[("xmlns", "urn:test")]).unwrap();
        doc.text_element("Title", "Fish & Chips").unwrap();
        doc.empty("Flag", &[("on", "true")]).unwrap();
        doc.end("Root").unwrap();

        let xml = String::from_utf8(doc.into_bytes()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<Root xmlns=\"urn:test\">"));
        assert!(xml.contains("<Title>Fish &amp; Chips</Title>"));
        assert!(xml.contains("<Flag on=\"true\"/>"));
        assert!(xml.trim_end().ends_with("</Root>"));
    }
}
