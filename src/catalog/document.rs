//! Owned element tree for the catalog documents.
//!
//! Catalogs are attribute-carrying XML (`<Vehicle name=".."><Properties>
//! <Property name=".." value=".."/></Properties></Vehicle>`). The tree keeps
//! tags, attributes and children in document order so a rewrite preserves
//! everything the patcher did not touch; text nodes do not occur in these
//! documents and are ignored on read.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};

use crate::core::{Result, UpgradeError, fsx};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Updates an attribute in place, or appends it if absent.
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    pub fn children_named_mut<'a>(
        &'a mut self,
        tag: &'a str,
    ) -> impl Iterator<Item = &'a mut Element> {
        self.children.iter_mut().filter(move |c| c.tag == tag)
    }

    pub fn first_child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn first_child_mut(&mut self, tag: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.tag == tag)
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }
}

/// Parses a document into its root element.
pub fn parse_document(text: &str) -> Result<Element> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(element_from(&start)?),
            Ok(Event::Empty(start)) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| UpgradeError::CatalogParse("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Eof) => break,
            // Declarations, comments and whitespace text carry nothing here.
            Ok(_) => {}
            Err(err) => return Err(UpgradeError::CatalogParse(err.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(UpgradeError::CatalogParse(
            "document ended inside an open element".to_string(),
        ));
    }
    root.ok_or_else(|| UpgradeError::CatalogParse("document has no root element".to_string()))
}

fn element_from(start: &BytesStart<'_>) -> Result<Element> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(tag);
    for attr in start.attributes() {
        let attr = attr.map_err(|err| UpgradeError::CatalogParse(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| UpgradeError::CatalogParse(err.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_some() {
                return Err(UpgradeError::CatalogParse(
                    "multiple root elements".to_string(),
                ));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

/// Renders a document with an XML declaration and two-space indentation.
pub fn render_document(root: &Element) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|err| UpgradeError::Serialize(err.to_string()))?;
    write_element(&mut writer, root)?;
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(|err| UpgradeError::Serialize(err.to_string()))
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.tag.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if element.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|err| UpgradeError::Serialize(err.to_string()))?;
    } else {
        writer
            .write_event(Event::Start(start))
            .map_err(|err| UpgradeError::Serialize(err.to_string()))?;
        for child in &element.children {
            write_element(writer, child)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(element.tag.as_str())))
            .map_err(|err| UpgradeError::Serialize(err.to_string()))?;
    }
    Ok(())
}

pub async fn load_document(path: &Path) -> Result<Element> {
    let text = fsx::read_to_string(path).await?;
    parse_document(&text)
}

pub async fn save_document(path: &Path, root: &Element) -> Result<()> {
    let text = render_document(root)?;
    fsx::write_atomic(path, &text).await
}

// Catalog-entry property accessors. Properties live under a single
// `<Properties>` child as `<Property name=".." value=".."/>` rows.

pub fn property_value<'a>(entry: &'a Element, name: &str) -> Option<&'a str> {
    entry
        .first_child("Properties")?
        .children_named("Property")
        .find(|p| p.attr("name") == Some(name))?
        .attr("value")
}

/// Updates a property value, creating the `Properties` bag or the `Property`
/// row as needed.
pub fn set_property(entry: &mut Element, name: &str, value: &str) {
    if entry.first_child("Properties").is_none() {
        entry.push_child(Element::new("Properties"));
    }
    if let Some(properties) = entry.first_child_mut("Properties") {
        if let Some(property) = properties
            .children_named_mut("Property")
            .find(|p| p.attr("name") == Some(name))
        {
            property.set_attr("value", value);
        } else {
            properties.push_child(
                Element::new("Property")
                    .with_attr("name", name)
                    .with_attr("value", value),
            );
        }
    }
}

/// `Some(true)` / `Some(false)` for an explicit `Preset` property, `None` for
/// legacy entries that predate the flag.
pub fn preset_flag(entry: &Element) -> Option<bool> {
    property_value(entry, "Preset").map(|v| v == "true")
}
