//! The canonical immutable configuration tree node.

use std::collections::BTreeMap;

use crate::directives::{Directives, SPACE_PRESERVE_ATTRIBUTE};

/// A single node of an attributed configuration tree.
///
/// Nodes are immutable once built; the merge engine produces new nodes and
/// never mutates its inputs. The optional `source` tag records provenance
/// (e.g. which file the node came from) and is excluded from equality.
///
/// A node's value distinguishes "no value" (`None`, a self-closed element)
/// from an explicit empty string (`Some("")`) — the distinction is
/// observable in merge results.
#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    value: Option<String>,
    preserve_space: bool,
    attributes: BTreeMap<String, String>,
    directives: Directives,
    children: Vec<Element>,
    source: Option<String>,
}

impl Element {
    /// Build a node from raw parts, extracting combination directives and
    /// the whitespace-preserve marker from the attribute map.
    ///
    /// Directives are parsed exactly once here; the merge algorithm works
    /// on the parsed representation only.
    pub fn new(
        name: impl Into<String>,
        value: Option<String>,
        mut attributes: BTreeMap<String, String>,
        children: Vec<Element>,
        source: Option<String>,
    ) -> Self {
        let directives = Directives::extract(&mut attributes);
        let preserve_space = attributes
            .remove(SPACE_PRESERVE_ATTRIBUTE)
            .is_some_and(|v| v == "preserve");
        Self {
            name: name.into(),
            value,
            preserve_space,
            attributes,
            directives,
            children,
            source,
        }
    }

    /// A leaf node with no value, attributes, or children.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, None, BTreeMap::new(), Vec::new(), None)
    }

    /// A leaf node carrying a text value.
    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, Some(value.into()), BTreeMap::new(), Vec::new(), None)
    }

    /// Build a node from already-separated parts. Used by the merge engine
    /// to assemble output nodes without re-extracting directives.
    pub(crate) fn assemble(
        name: String,
        value: Option<String>,
        preserve_space: bool,
        attributes: BTreeMap<String, String>,
        directives: Directives,
        children: Vec<Element>,
        source: Option<String>,
    ) -> Self {
        Self {
            name,
            value,
            preserve_space,
            attributes,
            directives,
            children,
            source,
        }
    }

    /// The element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The text value, if any. `None` means a self-closed element;
    /// `Some("")` an explicitly empty one.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Whether the value is whitespace-preserving (`xml:space="preserve"`).
    pub fn preserve_space(&self) -> bool {
        self.preserve_space
    }

    /// The non-directive attributes.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The combination directives parsed from this node's reserved attributes.
    pub fn directives(&self) -> &Directives {
        &self.directives
    }

    /// The ordered child nodes.
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// The first child with the given name, if any.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given name, in order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// The provenance tag, if any.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

/// Structural equality: name, value (null vs. empty distinguished),
/// attributes, directives, and children in order. Provenance is excluded.
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.value == other.value
            && self.preserve_space == other.preserve_space
            && self.attributes == other.attributes
            && self.directives == other.directives
            && self.children == other.children
    }
}

impl Eq for Element {}
