//! Minimal element tree over `quick-xml` events.
//!
//! Settlement files are small enough to hold in memory, and the batch
//! parser needs sibling lookups (`Undly` may follow the `Full` records), so
//! the document is materialized once instead of walked as a stream.
//! Names are stored by local name; namespace declarations are dropped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::ParseError;
use crate::domain::Attributes;

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    /// Attributes in document order.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given local name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Value of the first attribute in document order.
    pub fn first_attr(&self) -> Option<(&str, &str)> {
        self.attrs.first().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn attr_map(&self) -> Attributes {
        self.attrs.iter().cloned().collect()
    }
}

/// Read a whole document and return its root element.
pub fn read_document(bytes: &[u8]) -> Result<Element, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                stack.push(open_element(&start)?);
            }
            Event::Empty(start) => {
                let element = open_element(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                // quick-xml checks that end tags match their start tags
                let element = stack.pop().ok_or(ParseError::Truncated)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Eof => break,
            // text, comments, declarations, processing instructions
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(ParseError::Truncated);
    }
    root.ok_or(ParseError::EmptyDocument)
}

fn open_element(start: &BytesStart<'_>) -> Result<Element, ParseError> {
    let name = std::str::from_utf8(start.local_name().as_ref())?.to_string();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = std::str::from_utf8(attr.key.local_name().as_ref())?.to_string();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(ParseError::MultipleRoots),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_tree() {
        let doc = br#"<?xml version="1.0"?>
            <FIXML xmlns="http://www.fixprotocol.org/FIXML-5-0-SP2" v="5.0">
              <Batch>
                <MktDataFull BizDt="2024-03-15">
                  <Instrmt Sym="ES" Exch="CME"/>
                  <Full Typ="6" Px="5100.25"/>
                </MktDataFull>
              </Batch>
            </FIXML>"#;
        let root = read_document(doc).unwrap();
        assert_eq!(root.name, "FIXML");
        assert_eq!(root.attrs, vec![("v".to_string(), "5.0".to_string())]);

        let group = root.child("Batch").unwrap().child("MktDataFull").unwrap();
        assert_eq!(group.first_attr(), Some(("BizDt", "2024-03-15")));
        assert_eq!(group.children_named("Full").count(), 1);
        assert_eq!(group.child("Instrmt").unwrap().attr_map()["Sym"], "ES");
    }

    #[test]
    fn prefixed_names_resolve_to_local_names() {
        let doc = br#"<fx:FIXML xmlns:fx="urn:fix"><fx:Batch fx:ID="1"/></fx:FIXML>"#;
        let root = read_document(doc).unwrap();
        let batch = root.child("Batch").unwrap();
        assert_eq!(batch.attrs, vec![("ID".to_string(), "1".to_string())]);
    }

    #[test]
    fn unescapes_attribute_values() {
        let root = read_document(br#"<A Desc="S&amp;P 500"/>"#).unwrap();
        assert_eq!(root.attrs[0].1, "S&P 500");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(read_document(b""), Err(ParseError::EmptyDocument)));
    }

    #[test]
    fn unclosed_element_is_rejected() {
        assert!(read_document(b"<FIXML><Batch>").is_err());
    }

    #[test]
    fn mismatched_end_tag_is_rejected() {
        assert!(matches!(
            read_document(b"<FIXML><Batch></FIXML>"),
            Err(ParseError::Xml(_))
        ));
    }
}
