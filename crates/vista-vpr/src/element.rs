//! Explicit XML element tree.
//!
//! VPR responses are parsed into this tree first, and mapped to records
//! by explicit per-domain functions. There is no implicit
//! attributes-become-keys convention; everything downstream consumes
//! `XmlElement` deliberately.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Result, VprError};

/// One XML element: name, attributes, child elements and text content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<XmlElement>,
    pub text: Option<String>,
}

impl XmlElement {
    /// An attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The first child with the given name (case-insensitive).
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// All children with the given name (case-insensitive).
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name.eq_ignore_ascii_case(name))
    }

    /// Depth-first search for the first descendant with the given name.
    pub fn find_descendant(&self, name: &str) -> Option<&XmlElement> {
        for child in &self.children {
            if child.name.eq_ignore_ascii_case(name) {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Whether this element carries only attributes (no children or text).
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && self.text.is_none()
    }
}

/// Parse a document into its root element.
pub fn parse_xml(raw: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(raw);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let element = element_from_start(&start)?;
                stack.push(element);
            }
            Ok(Event::Empty(start)) => {
                let element = element_from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| VprError::Xml("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                // Whitespace between elements is formatting, not content.
                let value = text
                    .unescape()
                    .map_err(|e| VprError::Xml(e.to_string()))?
                    .trim()
                    .to_string();
                if let Some(current) = stack.last_mut() {
                    match &mut current.text {
                        Some(existing) => existing.push_str(&value),
                        None if value.is_empty() => {}
                        None => current.text = Some(value),
                    }
                }
            }
            Ok(Event::CData(data)) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                if let Some(current) = stack.last_mut() {
                    match &mut current.text {
                        Some(existing) => existing.push_str(&value),
                        None => current.text = Some(value),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // declarations, comments, processing instructions
            Err(e) => return Err(VprError::Xml(e.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(VprError::Xml("unterminated element".to_string()));
    }
    root.ok_or_else(|| VprError::Xml("no root element".to_string()))
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<XmlElement> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = BTreeMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| VprError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| VprError::Xml(e.to_string()))?
            .into_owned();
        attributes.insert(key, value);
    }
    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
        text: None,
    })
}

fn attach(
    stack: &mut Vec<XmlElement>,
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_some() {
                return Err(VprError::Xml("multiple root elements".to_string()));
            }
            *root = Some(element);
        }
    }
    Ok(())
}
