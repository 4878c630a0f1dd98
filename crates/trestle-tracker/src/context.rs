//! The build context: single owner of incremental build state.
//!
//! One context is created per build invocation, driven synchronously by one
//! build thread, and closed exactly once through [`BuildContext::commit`] or
//! [`BuildContext::mark_skip_execution`]. It owns the current state being
//! accumulated and the read-only state of the previous build, decides
//! per-resource staleness, and reconciles the two at commit.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::TrackerError;
use crate::filestate::FileState;
use crate::matcher::FileMatcher;
use crate::sink::Sink;
use crate::snapshot;
use crate::state::{BuildState, Message, Severity};
use crate::workspace::{escalate, Mode, Status, Workspace};

/// A registered input: its normalized path and its status relative to the
/// previous build, captured at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMetadata {
    path: PathBuf,
    status: Status,
}

impl InputMetadata {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> Status {
        self.status
    }
}

/// A registered output: its normalized path and its status relative to the
/// previous build, captured at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMetadata {
    path: PathBuf,
    status: Status,
}

impl OutputMetadata {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> Status {
        self.status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Skipped,
    Committed,
}

/// The incremental build tracker for one build invocation.
pub struct BuildContext {
    workspace: Box<dyn Workspace>,
    state_path: Option<PathBuf>,
    state: BuildState,
    old_state: BuildState,
    escalated: bool,
    registered: BTreeSet<PathBuf>,
    processed: BTreeSet<PathBuf>,
    deleted: BTreeSet<PathBuf>,
    phase: Phase,
    fail_on_error: bool,
}

impl BuildContext {
    /// Open a context for a new build.
    ///
    /// Loads the previous build's state from `state_path` (a context without
    /// a state path is transient and never persists), then decides whether
    /// the build must escalate to a full rebuild: the workspace demands it,
    /// no previous state exists, the configuration fingerprint changed, or a
    /// previously committed output has gone missing.
    ///
    /// # Errors
    /// Returns an error if the state path cannot be normalized.
    pub fn new(
        workspace: Box<dyn Workspace>,
        state_path: Option<&Path>,
        configuration: BTreeMap<String, serde_json::Value>,
    ) -> Result<Self, TrackerError> {
        let state_path = state_path.map(normalize).transpose()?;
        let old_state = state_path
            .as_deref()
            .map(snapshot::load)
            .unwrap_or_default();
        let state = BuildState::with_configuration(configuration);

        let escalation = escalation_reason(workspace.as_ref(), &old_state, &state);
        let escalated = escalation.is_some();
        let workspace = if escalated {
            escalate(workspace)
        } else {
            workspace
        };
        match &escalation {
            Some(reason) => eprintln!("    Performing full build: {reason}"),
            None => eprintln!("    Performing incremental build"),
        }

        Ok(Self {
            workspace,
            state_path,
            state,
            old_state,
            escalated,
            registered: BTreeSet::new(),
            processed: BTreeSet::new(),
            deleted: BTreeSet::new(),
            phase: Phase::Open,
            fail_on_error: true,
        })
    }

    /// When set (the default), commit fails if any error-severity message
    /// was reported or carried forward.
    pub fn set_fail_on_error(&mut self, fail_on_error: bool) {
        self.fail_on_error = fail_on_error;
    }

    /// The status of a resource relative to the previous build.
    ///
    /// # Errors
    /// Returns an error if the path cannot be normalized.
    pub fn status(&self, path: &Path) -> Result<Status, TrackerError> {
        let path = normalize(path)?;
        Ok(self.status_of(&path))
    }

    /// Register one input. The file must exist.
    ///
    /// # Errors
    /// Fails if the file is missing, already registered as an output, or
    /// the context is closed.
    pub fn register_input(&mut self, path: &Path) -> Result<InputMetadata, TrackerError> {
        self.ensure_open()?;
        let path = normalize(path)?;
        if self.state.is_output(&path) {
            return Err(TrackerError::AlreadyRegisteredAsOutput {
                path: path.display().to_string(),
            });
        }
        let fstate = FileState::read(&path);
        if fstate.is_absent() {
            return Err(TrackerError::ResourceNotFound {
                path: path.display().to_string(),
            });
        }
        if !self.state.contains_resource(&path) {
            self.state.put_resource(path.clone(), Some(fstate));
        }
        self.registered.insert(path.clone());
        let status = self.status_of(&path);
        Ok(InputMetadata { path, status })
    }

    /// Register every file under `basedir` matching the include/exclude
    /// patterns.
    ///
    /// With a delta workspace, resources tracked by the previous build that
    /// the delta did not report are still valid: they are re-adopted from
    /// the old state as unmodified, without touching the filesystem.
    ///
    /// # Errors
    /// Fails on an invalid pattern, an unwalkable directory, or any
    /// single-registration failure.
    pub fn register_inputs(
        &mut self,
        basedir: &Path,
        includes: &[String],
        excludes: &[String],
    ) -> Result<Vec<InputMetadata>, TrackerError> {
        self.ensure_open()?;
        let basedir = normalize(basedir)?;
        let matcher = FileMatcher::new(&basedir, includes, excludes)?;

        let mut registered = Vec::new();
        for entry in self.workspace.walk(&basedir)? {
            if entry.status == Status::Removed || !matcher.matches(&entry.path) {
                continue;
            }
            registered.push(self.register_input(&entry.path)?);
        }

        if self.workspace.mode() == Mode::Delta {
            let unreported: Vec<PathBuf> = self
                .old_state
                .resources()
                .keys()
                .filter(|p| !self.old_state.is_output(p))
                .filter(|p| matcher.matches(p))
                .filter(|p| !self.state.contains_resource(p))
                .cloned()
                .collect();
            for path in unreported {
                let fstate = self.old_state.file_state(&path).cloned();
                self.state.put_resource(path.clone(), fstate);
                registered.push(InputMetadata {
                    path,
                    status: Status::Unmodified,
                });
            }
        }

        Ok(registered)
    }

    /// Register matching files and mark every non-unmodified one as
    /// processed, returning only those — the set a build step must work on.
    ///
    /// # Errors
    /// Same failure modes as [`BuildContext::register_inputs`].
    pub fn register_and_process_inputs(
        &mut self,
        basedir: &Path,
        includes: &[String],
        excludes: &[String],
    ) -> Result<Vec<InputMetadata>, TrackerError> {
        let inputs = self.register_inputs(basedir, includes, excludes)?;
        let mut requiring_work = Vec::new();
        for meta in inputs {
            if meta.status != Status::Unmodified {
                self.processed.insert(meta.path.clone());
                requiring_work.push(meta);
            }
        }
        Ok(requiring_work)
    }

    /// Register an output, failing if the path was already registered in
    /// any role this build. One output, one registration.
    ///
    /// # Errors
    /// Fails on double registration or a closed context.
    pub fn register_output(&mut self, path: &Path) -> Result<OutputMetadata, TrackerError> {
        self.ensure_open()?;
        let path = normalize(path)?;
        if self.state.contains_resource(&path) {
            return Err(TrackerError::OutputAlreadyRegistered {
                path: path.display().to_string(),
            });
        }
        Ok(self.record_output(path))
    }

    /// Mark a path as an output being (re)generated this build.
    ///
    /// # Errors
    /// Fails if the path is already registered as a plain input, or the
    /// context is closed.
    pub fn process_output(&mut self, path: &Path) -> Result<OutputMetadata, TrackerError> {
        self.ensure_open()?;
        let path = normalize(path)?;
        if self.state.contains_resource(&path) && !self.state.is_output(&path) {
            return Err(TrackerError::AlreadyRegisteredAsInput {
                path: path.display().to_string(),
            });
        }
        Ok(self.record_output(path))
    }

    fn record_output(&mut self, path: PathBuf) -> OutputMetadata {
        let status = self.status_of(&path);
        self.state.add_output(path.clone());
        // outputs are timestamped at commit, after they have been written
        self.state.put_resource(path.clone(), None);
        self.processed.insert(path.clone());
        OutputMetadata { path, status }
    }

    /// Record an input→output edge. Edge-wise association keeps one input
    /// per output; re-associating the same input is a no-op.
    ///
    /// # Errors
    /// Fails if the input is itself a registered output, or the output is
    /// already associated with a different input.
    pub fn associate(
        &mut self,
        input: &InputMetadata,
        output: &OutputMetadata,
    ) -> Result<(), TrackerError> {
        self.ensure_open()?;
        if self.state.is_output(&input.path) {
            return Err(TrackerError::InputIsOutput {
                path: input.path.display().to_string(),
            });
        }
        if self
            .state
            .inputs_of(&output.path)
            .is_some_and(|existing| existing.iter().any(|p| *p != input.path))
        {
            return Err(TrackerError::OutputInputsConflict {
                path: output.path.display().to_string(),
            });
        }
        self.state.associate(input.path.clone(), output.path.clone());
        Ok(())
    }

    /// Associate an output with its complete input set.
    ///
    /// An output keeps one input set for the lifetime of the context;
    /// re-associating the same set is a no-op.
    ///
    /// # Errors
    /// Fails if the output already has a different input set, or an input
    /// is itself a registered output.
    pub fn associate_inputs(
        &mut self,
        inputs: &[InputMetadata],
        output: &OutputMetadata,
    ) -> Result<(), TrackerError> {
        self.ensure_open()?;
        for input in inputs {
            if self.state.is_output(&input.path) {
                return Err(TrackerError::InputIsOutput {
                    path: input.path.display().to_string(),
                });
            }
        }
        let new_set: BTreeSet<PathBuf> = inputs.iter().map(|i| i.path.clone()).collect();
        if let Some(existing) = self.state.inputs_of(&output.path) {
            if !existing.is_empty() && *existing != new_set {
                return Err(TrackerError::OutputInputsConflict {
                    path: output.path.display().to_string(),
                });
            }
        }
        for path in new_set {
            self.state.associate(path, output.path.clone());
        }
        Ok(())
    }

    /// The outputs currently associated with an input.
    pub fn associated_outputs(&self, input: &InputMetadata) -> Vec<PathBuf> {
        self.state
            .outputs_of(&input.path)
            .map(|outs| outs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Store a step-scoped attribute on a resource, returning the value the
    /// *previous* build recorded under the same key.
    ///
    /// # Errors
    /// Fails if the path cannot be normalized or the context is closed.
    pub fn set_attribute(
        &mut self,
        resource: &Path,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, TrackerError> {
        self.ensure_open()?;
        let path = normalize(resource)?;
        self.state.set_attribute(&path, key, value);
        Ok(self.old_state.attribute(&path, key).cloned())
    }

    /// Read an attribute, preferring this build's value over the previous
    /// build's.
    ///
    /// # Errors
    /// Fails if the path cannot be normalized.
    pub fn attribute(
        &self,
        resource: &Path,
        key: &str,
    ) -> Result<Option<serde_json::Value>, TrackerError> {
        let path = normalize(resource)?;
        Ok(self
            .state
            .attribute(&path, key)
            .or_else(|| self.old_state.attribute(&path, key))
            .cloned())
    }

    /// Attach a diagnostic message to a resource and log it immediately.
    ///
    /// # Errors
    /// Fails if the path cannot be normalized or the context is closed.
    pub fn add_message(
        &mut self,
        resource: &Path,
        line: u32,
        column: u32,
        severity: Severity,
        text: &str,
    ) -> Result<(), TrackerError> {
        self.ensure_open()?;
        let path = normalize(resource)?;
        let message = Message {
            line,
            column,
            text: text.to_owned(),
            severity,
        };
        log_message(&path, &message);
        self.state.add_message(&path, message);
        Ok(())
    }

    /// Delete a resource from the workspace and drop it from current state.
    /// Its status reports as removed for the rest of the build.
    ///
    /// # Errors
    /// Fails if the file exists but cannot be removed.
    pub fn delete(&mut self, resource: &Path) -> Result<(), TrackerError> {
        self.ensure_open()?;
        let path = normalize(resource)?;
        self.workspace.delete_file(&path)?;
        self.state.remove_resource(&path);
        self.deleted.insert(path.clone());
        self.processed.insert(path);
        Ok(())
    }

    /// Whole-build staleness summary: whether anything at all changed since
    /// the previous build. Useful as a cheap pre-check before registering.
    pub fn is_processing_required(&self) -> bool {
        if self.escalated {
            return true;
        }
        for (path, fstate) in self.old_state.resources() {
            if self.old_state.is_output(path) {
                continue;
            }
            let Some(fstate) = fstate else {
                return true;
            };
            if self.workspace.resource_status(fstate) != Status::Unmodified {
                return true;
            }
        }
        self.state
            .resources()
            .keys()
            .any(|p| !self.old_state.contains_resource(p))
    }

    /// Regenerate `output` from `inputs` if anything is stale, otherwise
    /// carry the previous build's record forward untouched.
    ///
    /// Staleness is the OR of: the output's own status is not unmodified,
    /// any input's status is not unmodified, or the output's recorded input
    /// set differs from `inputs`. Returns whether the creator ran.
    ///
    /// # Errors
    /// Propagates registration, association, and creator failures.
    pub fn aggregate<F>(
        &mut self,
        inputs: &[InputMetadata],
        output: &Path,
        creator: F,
    ) -> Result<bool, TrackerError>
    where
        F: FnOnce(&mut Self, &OutputMetadata, &[InputMetadata]) -> Result<(), TrackerError>,
    {
        self.ensure_open()?;
        let output_path = normalize(output)?;
        let new_inputs: BTreeSet<PathBuf> = inputs.iter().map(|i| i.path.clone()).collect();
        let old_inputs = self
            .old_state
            .inputs_of(&output_path)
            .cloned()
            .unwrap_or_default();

        let stale = self.status_of(&output_path) != Status::Unmodified
            || inputs.iter().any(|i| i.status != Status::Unmodified)
            || old_inputs != new_inputs;

        if !stale {
            self.carry_over_output(&output_path, inputs);
            return Ok(false);
        }

        let meta = self.process_output(&output_path)?;
        self.associate_inputs(inputs, &meta)?;
        for input in inputs {
            self.processed.insert(input.path.clone());
        }
        creator(self, &meta, inputs)?;
        Ok(true)
    }

    /// Like [`BuildContext::aggregate`], but the regeneration decision is
    /// keyed on a value folded from the inputs instead of raw staleness:
    /// each input is mapped to a serializable value, the values are folded
    /// from `identity`, and the writer runs only if the folded value differs
    /// from the one the previous build recorded (or the output itself is
    /// stale). Returns whether the writer ran.
    ///
    /// # Errors
    /// Propagates mapper, registration, association, and writer failures.
    #[allow(clippy::too_many_arguments)]
    pub fn aggregate_reduce<M, F, W>(
        &mut self,
        inputs: &[InputMetadata],
        output: &Path,
        step_id: &str,
        identity: serde_json::Value,
        mut mapper: M,
        fold: F,
        writer: W,
    ) -> Result<bool, TrackerError>
    where
        M: FnMut(&InputMetadata) -> Result<serde_json::Value, TrackerError>,
        F: Fn(serde_json::Value, serde_json::Value) -> serde_json::Value,
        W: FnOnce(&mut Self, &OutputMetadata, &serde_json::Value) -> Result<(), TrackerError>,
    {
        self.ensure_open()?;
        let output_path = normalize(output)?;
        let key = format!("{step_id}.reduce");

        let mut reduced = identity;
        for input in inputs {
            reduced = fold(reduced, mapper(input)?);
        }

        let stale = self.status_of(&output_path) != Status::Unmodified
            || self.old_state.attribute(&output_path, &key) != Some(&reduced);

        if !stale {
            self.carry_over_output(&output_path, inputs);
            return Ok(false);
        }

        let meta = self.process_output(&output_path)?;
        self.associate_inputs(inputs, &meta)?;
        for input in inputs {
            self.processed.insert(input.path.clone());
        }
        self.state.set_attribute(&meta.path, &key, reduced.clone());
        writer(self, &meta, &reduced)?;
        Ok(true)
    }

    /// Declare that this build step has no work to do at all. Only legal
    /// before anything has been processed; the previous build's state is
    /// persisted unchanged and the context closes.
    ///
    /// # Errors
    /// Fails if processing has already started or the state cannot be
    /// persisted.
    pub fn mark_skip_execution(&mut self) -> Result<(), TrackerError> {
        self.ensure_open()?;
        if !self.processed.is_empty() {
            return Err(TrackerError::SkipAfterProcessing);
        }
        if let Some(path) = &self.state_path {
            snapshot::store(self.workspace.as_ref(), path, &self.old_state)?;
        }
        self.phase = Phase::Skipped;
        Ok(())
    }

    /// Reconcile current state against the previous build's and persist.
    ///
    /// Three passes: (1) carry forward every old non-output resource the
    /// build did not process — untouched files with their recorded
    /// fingerprints, and registered-but-unmodified files with the previous
    /// build's attributes and messages; (2) carry forward every old output
    /// whose complete input set survived pass 1; (3) physically delete
    /// every old output that did not survive and was not re-registered.
    /// Inputs registered this build are then checked against the live
    /// filesystem — a change during the build is a fatal consistency
    /// error. New outputs are timestamped, the state is persisted (unless
    /// the context is transient), carried messages are replayed, and the
    /// sink is told what was dropped or reprocessed.
    ///
    /// # Errors
    /// Fails on an input that changed mid-build, on persistence failures,
    /// and, when fail-on-error is set, on any error-severity message.
    pub fn commit(&mut self, sink: &mut dyn Sink) -> Result<(), TrackerError> {
        self.ensure_open()?;

        // pass 1: untouched old inputs survive as-is
        let mut carried: BTreeSet<PathBuf> = BTreeSet::new();
        let untouched: Vec<PathBuf> = self
            .old_state
            .resources()
            .keys()
            .filter(|p| !self.old_state.is_output(p))
            .filter(|p| {
                !self.processed.contains(*p)
                    && !self.deleted.contains(*p)
                    && !self.state.contains_resource(p)
            })
            .cloned()
            .collect();
        for path in untouched {
            self.state.carry_over_from(&self.old_state, &path);
            carried.insert(path);
        }

        // a resource registered this build but never processed is equally
        // up to date when unmodified: keep its recorded fingerprint, adopt
        // the previous attributes and messages, and let its outputs survive
        // pass 2 (covers delta-adopted resources too)
        let uptodate_registered: Vec<PathBuf> = self
            .state
            .resources()
            .keys()
            .filter(|p| !self.state.is_output(p))
            .filter(|p| !self.processed.contains(*p) && !self.deleted.contains(*p))
            .filter(|p| self.old_state.contains_resource(p))
            .filter(|p| self.status_of(p) == Status::Unmodified)
            .cloned()
            .collect();
        for path in uptodate_registered {
            self.state.adopt_metadata_from(&self.old_state, &path);
            carried.insert(path);
        }

        // pass 2: an old output survives iff its whole input set did
        let old_outputs: Vec<PathBuf> = self.old_state.outputs().iter().cloned().collect();
        for output in &old_outputs {
            if self.state.is_output(output)
                || self.processed.contains(output)
                || self.deleted.contains(output)
            {
                continue;
            }
            let Some(inputs) = self.old_state.inputs_of(output) else {
                continue;
            };
            if inputs.is_empty() || !inputs.iter().all(|i| carried.contains(i)) {
                continue;
            }
            let inputs: Vec<PathBuf> = inputs.iter().cloned().collect();
            self.state.add_output(output.clone());
            self.state.carry_over_from(&self.old_state, output);
            for input in inputs {
                self.state.associate(input, output.clone());
            }
        }

        // inputs registered this build must not have changed under us;
        // carried resources were not read this build and are re-examined
        // by whichever later build registers them
        for path in &self.registered {
            if self.deleted.contains(path) {
                continue;
            }
            let Some(fstate) = self.state.file_state(path) else {
                return Err(TrackerError::InconsistentResourceState {
                    path: path.display().to_string(),
                    detail: "input has no recorded fingerprint".to_owned(),
                });
            };
            if fstate.status_on_disk() != Status::Unmodified {
                return Err(TrackerError::UnexpectedInputChange {
                    path: path.display().to_string(),
                });
            }
        }

        // timestamp outputs written this build
        let pending: Vec<PathBuf> = self
            .state
            .resources()
            .iter()
            .filter(|(_, s)| s.is_none())
            .map(|(p, _)| p.clone())
            .collect();
        for path in pending {
            let fstate = FileState::read(&path);
            self.state.put_resource(path, Some(fstate));
        }

        // pass 3: orphaned outputs are actively cleaned up
        let orphans: Vec<PathBuf> = old_outputs
            .iter()
            .filter(|o| !self.state.is_output(o))
            .cloned()
            .collect();
        for orphan in &orphans {
            self.workspace.delete_file(orphan)?;
        }

        if let Some(path) = &self.state_path {
            snapshot::store(self.workspace.as_ref(), path, &self.state)?;
        }

        for orphan in &orphans {
            sink.clear(orphan);
        }
        for path in &self.deleted {
            sink.clear(path);
        }
        let mut error_count = 0usize;
        for (path, messages) in self.state.all_messages() {
            let replayed = !self.processed.contains(path);
            if replayed {
                // carried messages are re-emitted so the build log stays
                // continuous across incremental runs
                for message in messages {
                    log_message(path, message);
                }
            }
            error_count += messages
                .iter()
                .filter(|m| m.severity == Severity::Error)
                .count();
            sink.messages(path, replayed, messages);
        }
        for path in &self.processed {
            if self.state.messages_of(path).is_empty() {
                sink.clear(path);
            }
        }

        self.phase = Phase::Committed;
        if self.fail_on_error && error_count > 0 {
            return Err(TrackerError::ErrorsReported { count: error_count });
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), TrackerError> {
        if self.phase == Phase::Open {
            Ok(())
        } else {
            Err(TrackerError::ContextClosed)
        }
    }

    fn status_of(&self, path: &Path) -> Status {
        if self.deleted.contains(path) {
            return Status::Removed;
        }
        let Some(old) = self.old_state.file_state(path) else {
            return Status::New;
        };
        let status = self.workspace.resource_status(old);
        if status == Status::Unmodified && self.escalated {
            Status::Modified
        } else {
            status
        }
    }

    fn carry_over_output(&mut self, output: &Path, inputs: &[InputMetadata]) {
        self.state.add_output(output.to_path_buf());
        self.state.carry_over_from(&self.old_state, output);
        for input in inputs {
            self.state.associate(input.path.clone(), output.to_path_buf());
        }
    }
}

fn escalation_reason(
    workspace: &dyn Workspace,
    old_state: &BuildState,
    state: &BuildState,
) -> Option<String> {
    match workspace.mode() {
        Mode::Escalated => return Some("full rebuild requested".to_owned()),
        Mode::Suppressed => return None,
        Mode::Normal | Mode::Delta => {}
    }
    if old_state.configuration().is_empty() {
        return Some("previous build state does not exist".to_owned());
    }
    if !state.configuration_matches(old_state) {
        return Some("configuration has changed".to_owned());
    }
    old_state
        .outputs()
        .iter()
        .find(|o| !workspace.is_regular_file(o))
        .map(|missing| format!("previous output is missing: {}", missing.display()))
}

fn normalize(path: &Path) -> Result<PathBuf, TrackerError> {
    std::path::absolute(path).map_err(|source| TrackerError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn log_message(path: &Path, message: &Message) {
    eprintln!(
        "{}: {}:{}:{}: {}",
        message.severity.label(),
        path.display(),
        message.line,
        message.column,
        message.text
    );
}
