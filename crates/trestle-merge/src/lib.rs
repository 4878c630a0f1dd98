#![forbid(unsafe_code)]
//! Hierarchical configuration tree merge engine for trestle.
//!
//! Merges two immutable attributed trees (dominant, recessive) into a third
//! tree, following per-node combination directives carried as reserved
//! `combine.*` attributes in the XML wire format. The engine is purely
//! functional: it never mutates its inputs and always allocates fresh
//! output nodes, so it is safe to call concurrently on independent trees.

pub mod directives;
pub mod error;
pub mod merge;
pub mod node;
pub mod xml;

pub use directives::{ChildrenMode, Directives, SelfMode};
pub use error::MergeError;
pub use merge::{merge, merge_opt, merge_with};
pub use node::Element;
pub use xml::{parse, parse_with_source, to_xml};
