//! Combination directives controlling how a node merges with its counterpart.
//!
//! Directives travel as reserved attributes in the XML wire format and are
//! parsed once at tree construction into a small closed representation, so
//! the merge algorithm never re-interprets free-form strings.

use std::collections::BTreeMap;

/// Reserved attribute selecting how a node combines with its counterpart.
pub const SELF_COMBINATION_ATTRIBUTE: &str = "combine.self";

/// Reserved attribute selecting how child lists combine.
pub const CHILDREN_COMBINATION_ATTRIBUTE: &str = "combine.children";

/// Reserved attribute matching children across trees by an explicit id.
pub const ID_COMBINATION_ATTRIBUTE: &str = "combine.id";

/// Reserved attribute matching children across trees by named attribute values.
pub const KEYS_COMBINATION_ATTRIBUTE: &str = "combine.keys";

/// Reserved attribute marking a value as whitespace-preserving.
pub const SPACE_PRESERVE_ATTRIBUTE: &str = "xml:space";

/// How a node itself combines with the corresponding recessive node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelfMode {
    /// Merge value, attributes and children with the recessive node.
    #[default]
    Merge,
    /// Keep the dominant node in isolation, ignoring the recessive entirely.
    Override,
    /// Drop this node from the merged result, deleting the inherited element.
    Remove,
}

/// How a node's children combine with the recessive node's children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChildrenMode {
    /// Pair children by id, keys, or position and merge matched pairs.
    #[default]
    Merge,
    /// Keep all dominant children, then all recessive children, unpaired.
    Append,
}

/// Parsed combination directives for a single node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    /// Self-combination mode, default merge.
    pub self_mode: SelfMode,
    /// Children-combination mode, default merge.
    pub children_mode: ChildrenMode,
    /// Explicit child-matching id, if any.
    pub id: Option<String>,
    /// Attribute names whose values key child matching, if any.
    pub keys: Vec<String>,
}

impl Directives {
    /// Extract directives from an attribute map, removing the reserved
    /// attributes in the process.
    ///
    /// Unrecognized directive values fall back to the defaults — user-authored
    /// configuration must degrade gracefully rather than fail.
    pub fn extract(attributes: &mut BTreeMap<String, String>) -> Self {
        let self_mode = match attributes.remove(SELF_COMBINATION_ATTRIBUTE).as_deref() {
            Some("override") => SelfMode::Override,
            Some("remove") => SelfMode::Remove,
            _ => SelfMode::Merge,
        };
        let children_mode = match attributes.remove(CHILDREN_COMBINATION_ATTRIBUTE).as_deref() {
            Some("append") => ChildrenMode::Append,
            _ => ChildrenMode::Merge,
        };
        let id = attributes.remove(ID_COMBINATION_ATTRIBUTE);
        let keys = attributes
            .remove(KEYS_COMBINATION_ATTRIBUTE)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            self_mode,
            children_mode,
            id,
            keys,
        }
    }

    /// Whether every directive is at its default.
    pub fn is_default(&self) -> bool {
        self.self_mode == SelfMode::Merge
            && self.children_mode == ChildrenMode::Merge
            && self.id.is_none()
            && self.keys.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn extract_defaults_from_empty() {
        let mut map = BTreeMap::new();
        let d = Directives::extract(&mut map);
        assert!(d.is_default());
    }

    #[test]
    fn extract_removes_reserved_attributes() {
        let mut map = attrs(&[
            ("combine.self", "override"),
            ("combine.children", "append"),
            ("combine.id", "the-id"),
            ("combine.keys", "name,group"),
            ("scope", "test"),
        ]);
        let d = Directives::extract(&mut map);

        assert_eq!(d.self_mode, SelfMode::Override);
        assert_eq!(d.children_mode, ChildrenMode::Append);
        assert_eq!(d.id.as_deref(), Some("the-id"));
        assert_eq!(d.keys, vec!["name".to_owned(), "group".to_owned()]);

        // only the non-reserved attribute survives
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("scope").map(String::as_str), Some("test"));
    }

    #[test]
    fn unrecognized_values_fall_back_to_defaults() {
        let mut map = attrs(&[("combine.self", "frobnicate"), ("combine.children", "zap")]);
        let d = Directives::extract(&mut map);
        assert_eq!(d.self_mode, SelfMode::Merge);
        assert_eq!(d.children_mode, ChildrenMode::Merge);
    }

    #[test]
    fn extract_remove_mode() {
        let mut map = attrs(&[("combine.self", "remove")]);
        let d = Directives::extract(&mut map);
        assert_eq!(d.self_mode, SelfMode::Remove);
    }

    #[test]
    fn keys_are_trimmed_and_empty_entries_dropped() {
        let mut map = attrs(&[("combine.keys", " name , , group ")]);
        let d = Directives::extract(&mut map);
        assert_eq!(d.keys, vec!["name".to_owned(), "group".to_owned()]);
    }
}
