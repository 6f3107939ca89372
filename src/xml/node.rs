//! Owned element tree built from the quick-xml event stream.
//!
//! Scenario documents are small but navigated non-linearly: catalog entries
//! are kept as detached fragments and re-read under different parameter
//! bindings, and the reader looks ahead for optional children. An owned tree
//! makes that cheap, so the event stream is consumed once up front.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::xml::errors::{ErrorContext, ParseError, ParseResult};

/// A parsed attribute map that owns decoded string values.
///
/// Values are stored raw: `$name` parameter references are resolved later by
/// the reader, which knows the parameter scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attrs {
    map: HashMap<String, String>,
    /// The element name for error messages
    element_name: String,
}

impl Attrs {
    /// Parse attributes from a `BytesStart` event.
    ///
    /// This decodes and unescapes all attribute values once, storing them in a HashMap.
    pub fn from_start<R: BufRead>(
        start: &BytesStart<'_>,
        reader: &Reader<R>,
    ) -> Result<Self, ParseError> {
        let element_name = String::from_utf8_lossy(start.name().as_ref()).to_string();
        let mut map = HashMap::new();

        for attr_result in start.attributes() {
            let attr = attr_result?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr.decode_and_unescape_value(reader)?.to_string();
            map.insert(key, value);
        }

        Ok(Self { map, element_name })
    }

    /// Get the element name this Attrs was parsed from.
    pub fn element_name(&self) -> &str {
        &self.element_name
    }

    /// Get an optional raw string attribute.
    pub fn get_opt(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    /// Check if an attribute is present (regardless of value).
    pub fn has(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
}

/// One element of a parsed document.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlNode {
    attrs: Attrs,
    children: Vec<XmlNode>,
    text: String,
}

impl XmlNode {
    fn new(attrs: Attrs) -> Self {
        Self {
            attrs,
            children: Vec::new(),
            text: String::new(),
        }
    }

    /// Parse a complete document held in memory, returning its root element.
    pub fn parse_str(xml: &str) -> ParseResult<XmlNode> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        read_tree(&mut reader).map_err(|e| {
            let position = reader.buffer_position().min(xml.len());
            let consumed = &xml[..floor_char_boundary(xml, position)];
            let line = consumed.matches('\n').count() + 1;
            let column = consumed.len() - consumed.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
            e.in_context(ErrorContext::with_line(line).with_column(column))
        })
    }

    /// Read and parse a document from disk.
    pub fn parse_file(path: &Path) -> ParseResult<XmlNode> {
        let xml = std::fs::read_to_string(path)
            .map_err(|e| ParseError::from(e).in_context(ErrorContext::with_file_path(path)))?;
        Self::parse_str(&xml).map_err(|e| e.in_context(ErrorContext::with_file_path(path)))
    }

    /// Element name.
    pub fn name(&self) -> &str {
        self.attrs.element_name()
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    /// Concatenated text and CDATA content.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> impl Iterator<Item = &XmlNode> {
        self.children.iter()
    }

    pub fn first_child(&self) -> Option<&XmlNode> {
        self.children.first()
    }

    /// First child with the given element name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name() == name)
    }

    /// All children with the given element name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name() == name)
    }

    /// Follow a chain of child names, e.g. `["Storyboard", "Init", "Actions"]`.
    pub fn descend(&self, path: &[&str]) -> Option<&XmlNode> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> ParseResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(ParseError::UnexpectedElement {
            expected: "end of document".to_string(),
            found: node.name().to_string(),
        }),
    }
}

/// Consume the whole event stream and build the element tree.
fn read_tree<R: BufRead>(reader: &mut Reader<R>) -> ParseResult<XmlNode> {
    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let attrs = Attrs::from_start(&e, reader)?;
                stack.push(XmlNode::new(attrs));
            }
            Event::Empty(e) => {
                let node = XmlNode::new(Attrs::from_start(&e, reader)?);
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack.pop().ok_or(ParseError::UnexpectedEof)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::Eof => break,
            // Decl, Comment, PI, DocType - nothing to keep
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::UnexpectedEof);
    }

    root.ok_or_else(|| ParseError::MissingElement("document root".to_string()))
}
