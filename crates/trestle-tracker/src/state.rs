//! The build state snapshot model.
//!
//! One [`BuildState`] captures everything a build needs to remember between
//! invocations: the configuration fingerprint, which paths are outputs,
//! each resource's file fingerprint, input/output associations (kept
//! bidirectionally in sync), step-scoped resource attributes, and
//! diagnostic messages.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::filestate::FileState;

/// Configuration key marking a state as produced by a committed build, so
/// a genuinely empty configuration still differs from a never-built state.
const INCREMENTAL_MARKER: &str = "incremental";

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A diagnostic message attached to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub line: u32,
    pub column: u32,
    pub text: String,
    pub severity: Severity,
}

/// The full recorded state of one build.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BuildState {
    configuration: BTreeMap<String, serde_json::Value>,
    outputs: BTreeSet<PathBuf>,
    /// Outputs hold `None` until they are timestamped at commit.
    resources: BTreeMap<PathBuf, Option<FileState>>,
    resource_outputs: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    output_inputs: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    attributes: BTreeMap<PathBuf, BTreeMap<String, serde_json::Value>>,
    messages: BTreeMap<PathBuf, Vec<Message>>,
}

impl BuildState {
    /// An empty state, as used before any build has committed.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh state for the build starting now. The marker entry makes an
    /// empty configuration distinguishable from a never-built state.
    pub fn with_configuration(mut configuration: BTreeMap<String, serde_json::Value>) -> Self {
        configuration.insert(
            INCREMENTAL_MARKER.to_owned(),
            serde_json::Value::Bool(true),
        );
        Self {
            configuration,
            ..Self::default()
        }
    }

    pub fn configuration(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.configuration
    }

    /// Whether two states carry the same configuration fingerprint.
    pub fn configuration_matches(&self, other: &Self) -> bool {
        self.configuration == other.configuration
    }

    pub(crate) fn set_configuration(
        &mut self,
        configuration: BTreeMap<String, serde_json::Value>,
    ) {
        self.configuration = configuration;
    }

    pub fn outputs(&self) -> &BTreeSet<PathBuf> {
        &self.outputs
    }

    pub fn is_output(&self, path: &Path) -> bool {
        self.outputs.contains(path)
    }

    pub(crate) fn add_output(&mut self, path: PathBuf) {
        self.outputs.insert(path);
    }

    pub fn resources(&self) -> &BTreeMap<PathBuf, Option<FileState>> {
        &self.resources
    }

    pub fn contains_resource(&self, path: &Path) -> bool {
        self.resources.contains_key(path)
    }

    /// The recorded fingerprint for a resource, if it has been timestamped.
    pub fn file_state(&self, path: &Path) -> Option<&FileState> {
        self.resources.get(path).and_then(Option::as_ref)
    }

    pub(crate) fn put_resource(&mut self, path: PathBuf, state: Option<FileState>) {
        self.resources.insert(path, state);
    }

    pub(crate) fn remove_resource(&mut self, path: &Path) {
        self.resources.remove(path);
        self.outputs.remove(path);
        self.attributes.remove(path);
        self.messages.remove(path);
        if let Some(outs) = self.resource_outputs.remove(path) {
            for out in outs {
                if let Some(ins) = self.output_inputs.get_mut(&out) {
                    ins.remove(path);
                }
            }
        }
    }

    /// Record an input→output edge, keeping the inverse map in sync.
    pub(crate) fn associate(&mut self, input: PathBuf, output: PathBuf) {
        self.resource_outputs
            .entry(input.clone())
            .or_default()
            .insert(output.clone());
        self.output_inputs.entry(output).or_default().insert(input);
    }

    /// Outputs associated with an input.
    pub fn outputs_of(&self, input: &Path) -> Option<&BTreeSet<PathBuf>> {
        self.resource_outputs.get(input)
    }

    /// Inputs associated with an output (the inverse view).
    pub fn inputs_of(&self, output: &Path) -> Option<&BTreeSet<PathBuf>> {
        self.output_inputs.get(output)
    }

    pub fn resource_outputs(&self) -> &BTreeMap<PathBuf, BTreeSet<PathBuf>> {
        &self.resource_outputs
    }

    /// Store an attribute, returning the value it replaces in this state.
    pub(crate) fn set_attribute(
        &mut self,
        path: &Path,
        key: &str,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.attributes
            .entry(path.to_path_buf())
            .or_default()
            .insert(key.to_owned(), value)
    }

    pub fn attribute(&self, path: &Path, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(path).and_then(|m| m.get(key))
    }

    pub fn attributes_of(&self, path: &Path) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.attributes.get(path)
    }

    pub fn all_attributes(&self) -> &BTreeMap<PathBuf, BTreeMap<String, serde_json::Value>> {
        &self.attributes
    }

    pub(crate) fn add_message(&mut self, path: &Path, message: Message) {
        self.messages.entry(path.to_path_buf()).or_default().push(message);
    }

    pub fn messages_of(&self, path: &Path) -> &[Message] {
        self.messages.get(path).map_or(&[], Vec::as_slice)
    }

    pub fn all_messages(&self) -> &BTreeMap<PathBuf, Vec<Message>> {
        &self.messages
    }

    /// Copy one resource's fingerprint, attributes and messages from a
    /// previous build's state. Associations are re-established by the
    /// caller, which knows whether the outputs survive too.
    pub(crate) fn carry_over_from(&mut self, other: &Self, path: &Path) {
        self.resources
            .insert(path.to_path_buf(), other.resources.get(path).cloned().flatten());
        if let Some(attrs) = other.attributes.get(path) {
            self.attributes.insert(path.to_path_buf(), attrs.clone());
        }
        if let Some(msgs) = other.messages.get(path) {
            self.messages.insert(path.to_path_buf(), msgs.clone());
        }
    }

    /// Adopt a resource's attributes and messages from a previous build's
    /// state without touching the fingerprint recorded this build. Entries
    /// written this build take precedence.
    pub(crate) fn adopt_metadata_from(&mut self, other: &Self, path: &Path) {
        if !self.attributes.contains_key(path) {
            if let Some(attrs) = other.attributes.get(path) {
                self.attributes.insert(path.to_path_buf(), attrs.clone());
            }
        }
        if !self.messages.contains_key(path) {
            if let Some(msgs) = other.messages.get(path) {
                self.messages.insert(path.to_path_buf(), msgs.clone());
            }
        }
    }
}
