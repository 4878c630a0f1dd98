//! XML wire format for configuration trees.
//!
//! Parsing turns an XML document into an owned [`Element`] tree, extracting
//! `combine.*` directives and the `xml:space` marker along the way. The
//! parser distinguishes a self-closed element (`<x/>`, no value) from an
//! explicitly empty one (`<x></x>`, empty string value) because the merge
//! engine treats the two differently.

use std::collections::BTreeMap;

use crate::directives::{
    ChildrenMode, Directives, SelfMode, CHILDREN_COMBINATION_ATTRIBUTE,
    ID_COMBINATION_ATTRIBUTE, KEYS_COMBINATION_ATTRIBUTE, SELF_COMBINATION_ATTRIBUTE,
    SPACE_PRESERVE_ATTRIBUTE,
};
use crate::error::MergeError;
use crate::node::Element;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Parse an XML document into a configuration tree.
///
/// # Errors
///
/// Returns [`MergeError::Xml`] if the input is not well-formed XML.
pub fn parse(input: &str) -> Result<Element, MergeError> {
    parse_inner(input, None)
}

/// Parse an XML document, tagging every node with a provenance source
/// (typically the file the document was read from).
///
/// # Errors
///
/// Returns [`MergeError::Xml`] if the input is not well-formed XML.
pub fn parse_with_source(input: &str, source: &str) -> Result<Element, MergeError> {
    parse_inner(input, Some(source))
}

fn parse_inner(input: &str, source: Option<&str>) -> Result<Element, MergeError> {
    let doc = roxmltree::Document::parse(input)?;
    Ok(convert(input, doc.root_element(), source))
}

fn convert(input: &str, node: roxmltree::Node<'_, '_>, source: Option<&str>) -> Element {
    let mut attributes = BTreeMap::new();
    for attr in node.attributes() {
        // attributes in the xml namespace (xml:space) keep their prefix so
        // the tree layer can recognize them by their familiar name
        let key = if attr.namespace() == Some(XML_NAMESPACE) {
            format!("xml:{}", attr.name())
        } else {
            attr.name().to_owned()
        };
        attributes.insert(key, attr.value().to_owned());
    }
    let preserve = attributes
        .get(SPACE_PRESERVE_ATTRIBUTE)
        .is_some_and(|v| v == "preserve");

    let children: Vec<Element> = node
        .children()
        .filter(roxmltree::Node::is_element)
        .map(|c| convert(input, c, source))
        .collect();

    let value = if children.is_empty() {
        element_value(input, &node, preserve)
    } else {
        // an element holds either children or a value, never both; any
        // whitespace between child elements is formatting, not data
        None
    };

    Element::new(
        node.tag_name().name(),
        value,
        attributes,
        children,
        source.map(str::to_owned),
    )
}

/// The text value of a childless element. `None` for a self-closed element,
/// `Some("")` for an explicitly empty one.
fn element_value(input: &str, node: &roxmltree::Node<'_, '_>, preserve: bool) -> Option<String> {
    let text: String = node
        .children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    let text = if preserve {
        text
    } else {
        text.trim().to_owned()
    };
    if text.is_empty() && is_self_closed(input, node) {
        None
    } else {
        Some(text)
    }
}

fn is_self_closed(input: &str, node: &roxmltree::Node<'_, '_>) -> bool {
    input
        .get(node.range())
        .is_some_and(|raw| raw.trim_end().ends_with("/>"))
}

/// Serialize a tree back to compact XML, re-emitting non-default combination
/// directives and the whitespace-preserve marker as attributes.
pub fn to_xml(element: &Element) -> String {
    let mut out = String::new();
    write_element(element, &mut out);
    out
}

fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(element.name());
    for (name, value) in element.attributes() {
        write_attribute(name, value, out);
    }
    write_directives(element.directives(), out);
    if element.preserve_space() {
        write_attribute(SPACE_PRESERVE_ATTRIBUTE, "preserve", out);
    }

    if !element.children().is_empty() {
        out.push('>');
        if let Some(value) = element.value() {
            escape_text(value, out);
        }
        for child in element.children() {
            write_element(child, out);
        }
        out.push_str("</");
        out.push_str(element.name());
        out.push('>');
    } else if let Some(value) = element.value() {
        out.push('>');
        escape_text(value, out);
        out.push_str("</");
        out.push_str(element.name());
        out.push('>');
    } else {
        out.push_str("/>");
    }
}

fn write_directives(directives: &Directives, out: &mut String) {
    match directives.self_mode {
        SelfMode::Merge => {}
        SelfMode::Override => write_attribute(SELF_COMBINATION_ATTRIBUTE, "override", out),
        SelfMode::Remove => write_attribute(SELF_COMBINATION_ATTRIBUTE, "remove", out),
    }
    if directives.children_mode == ChildrenMode::Append {
        write_attribute(CHILDREN_COMBINATION_ATTRIBUTE, "append", out);
    }
    if let Some(id) = directives.id.as_deref() {
        write_attribute(ID_COMBINATION_ATTRIBUTE, id, out);
    }
    if !directives.keys.is_empty() {
        write_attribute(KEYS_COMBINATION_ATTRIBUTE, &directives.keys.join(","), out);
    }
}

fn write_attribute(name: &str, value: &str, out: &mut String) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_attribute(value, out);
    out.push('"');
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
