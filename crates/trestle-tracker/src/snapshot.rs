//! Persistence of build state as a versioned, checksummed JSON snapshot.
//!
//! Every persisted record has an explicit schema; paths are stored as
//! strings and timestamps as epoch (secs, nanos) pairs at this boundary.
//! A missing, unreadable, corrupt, or incompatible snapshot degrades to an
//! empty state — the next build is simply a full one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use trestle_util::hash::sha256_multi;

use crate::error::TrackerError;
use crate::filestate::{FileState, FileTime};
use crate::state::{BuildState, Message};
use crate::workspace::Workspace;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    checksum: String,
    payload: String,
}

#[derive(Serialize, Deserialize, Default)]
struct StateRecord {
    configuration: BTreeMap<String, serde_json::Value>,
    outputs: Vec<String>,
    resources: Vec<ResourceRecord>,
    associations: Vec<AssociationRecord>,
    attributes: Vec<AttributeRecord>,
    messages: Vec<MessageRecord>,
}

#[derive(Serialize, Deserialize)]
struct ResourceRecord {
    path: String,
    state: Option<FileStateRecord>,
}

#[derive(Serialize, Deserialize)]
struct FileStateRecord {
    secs: u64,
    nanos: u32,
    size: u64,
}

#[derive(Serialize, Deserialize)]
struct AssociationRecord {
    input: String,
    outputs: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct AttributeRecord {
    path: String,
    values: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct MessageRecord {
    path: String,
    messages: Vec<Message>,
}

/// Load the state committed by the previous build.
///
/// A missing file is the normal first-build case and loads silently as an
/// empty state. Anything unreadable or inconsistent is reported as a
/// warning and also degrades to empty, forcing a full rebuild.
pub fn load(path: &Path) -> BuildState {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BuildState::new(),
        Err(e) => {
            eprintln!("warning: cannot read build state {}: {e}", path.display());
            return BuildState::new();
        }
    };
    let Ok(file) = serde_json::from_str::<SnapshotFile>(&text) else {
        eprintln!(
            "warning: ignoring corrupt build state {}",
            path.display()
        );
        return BuildState::new();
    };
    if file.version != FORMAT_VERSION {
        eprintln!(
            "warning: ignoring build state {} with unsupported version {}",
            path.display(),
            file.version
        );
        return BuildState::new();
    }
    if integrity_checksum(file.version, &file.payload) != file.checksum {
        eprintln!(
            "warning: ignoring build state {} with checksum mismatch",
            path.display()
        );
        return BuildState::new();
    }
    let Ok(record) = serde_json::from_str::<StateRecord>(&file.payload) else {
        eprintln!(
            "warning: ignoring corrupt build state {}",
            path.display()
        );
        return BuildState::new();
    };
    decode(record)
}

/// Persist a committed state through the workspace's crash-safe writer.
///
/// # Errors
/// Returns [`TrackerError::Snapshot`] if the state cannot be encoded, or
/// an I/O error if the write fails.
pub fn store(
    workspace: &dyn Workspace,
    path: &Path,
    state: &BuildState,
) -> Result<(), TrackerError> {
    let payload =
        serde_json::to_string(&encode(state)).map_err(|e| TrackerError::Snapshot {
            message: e.to_string(),
        })?;
    let file = SnapshotFile {
        version: FORMAT_VERSION,
        checksum: integrity_checksum(FORMAT_VERSION, &payload),
        payload,
    };
    let bytes = serde_json::to_vec(&file).map_err(|e| TrackerError::Snapshot {
        message: e.to_string(),
    })?;
    workspace.write_file(path, &bytes)
}

fn encode(state: &BuildState) -> StateRecord {
    StateRecord {
        configuration: state.configuration().clone(),
        outputs: state.outputs().iter().map(|p| path_string(p)).collect(),
        resources: state
            .resources()
            .iter()
            .map(|(path, fstate)| ResourceRecord {
                path: path_string(path),
                state: fstate.as_ref().map(|fs| FileStateRecord {
                    secs: fs.last_modified.secs,
                    nanos: fs.last_modified.nanos,
                    size: fs.size,
                }),
            })
            .collect(),
        associations: state
            .resource_outputs()
            .iter()
            .map(|(input, outputs)| AssociationRecord {
                input: path_string(input),
                outputs: outputs.iter().map(|p| path_string(p)).collect(),
            })
            .collect(),
        attributes: state
            .all_attributes()
            .iter()
            .map(|(path, values)| AttributeRecord {
                path: path_string(path),
                values: values.clone(),
            })
            .collect(),
        messages: state
            .all_messages()
            .iter()
            .map(|(path, messages)| MessageRecord {
                path: path_string(path),
                messages: messages.clone(),
            })
            .collect(),
    }
}

fn decode(record: StateRecord) -> BuildState {
    let mut state = BuildState::new();
    state.set_configuration(record.configuration);
    for output in record.outputs {
        state.add_output(PathBuf::from(output));
    }
    for resource in record.resources {
        let path = PathBuf::from(resource.path);
        let fstate = resource.state.map(|r| FileState {
            path: path.clone(),
            last_modified: FileTime {
                secs: r.secs,
                nanos: r.nanos,
            },
            size: r.size,
        });
        state.put_resource(path, fstate);
    }
    for assoc in record.associations {
        let input = PathBuf::from(assoc.input);
        for output in assoc.outputs {
            state.associate(input.clone(), PathBuf::from(output));
        }
    }
    for attrs in record.attributes {
        let path = PathBuf::from(attrs.path);
        for (key, value) in attrs.values {
            state.set_attribute(&path, &key, value);
        }
    }
    for msgs in record.messages {
        let path = PathBuf::from(msgs.path);
        for message in msgs.messages {
            state.add_message(&path, message);
        }
    }
    state
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

// The checksum covers the version too, so a snapshot cannot be replayed
// under a different format version.
fn integrity_checksum(version: u32, payload: &str) -> String {
    sha256_multi(&[&version.to_string(), payload])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;
    use crate::state::Severity;
    use crate::workspace::FilesystemWorkspace;

    fn sample_state(dir: &Path) -> BuildState {
        let input = dir.join("src").join("a.txt");
        fs::create_dir_all(input.parent().unwrap()).unwrap();
        fs::write(&input, b"content").unwrap();
        let output = dir.join("out").join("a.o");

        let mut config = BTreeMap::new();
        config.insert("target".to_owned(), serde_json::json!("x64"));
        let mut state = BuildState::with_configuration(config);
        state.put_resource(input.clone(), Some(FileState::read(&input)));
        state.add_output(output.clone());
        state.put_resource(output.clone(), Some(FileState::absent(&output)));
        state.associate(input.clone(), output);
        state.set_attribute(&input, "digest", serde_json::json!("abc123"));
        state.add_message(
            &input,
            Message {
                line: 3,
                column: 7,
                text: "deprecated".to_owned(),
                severity: Severity::Warning,
            },
        );
        state
    }

    #[test]
    fn round_trip_preserves_state() {
        let tmp = tempfile::tempdir().unwrap();
        let state = sample_state(tmp.path());
        let file = tmp.path().join("state.json");

        store(&FilesystemWorkspace::new(), &file, &state).unwrap();
        let loaded = load(&file);
        assert_eq!(loaded, state);
    }

    #[test]
    fn missing_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let loaded = load(&tmp.path().join("absent.json"));
        assert_eq!(loaded, BuildState::new());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("state.json");
        fs::write(&file, b"definitely { not json").unwrap();
        assert_eq!(load(&file), BuildState::new());
    }

    #[test]
    fn checksum_mismatch_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let state = sample_state(tmp.path());
        let file = tmp.path().join("state.json");
        store(&FilesystemWorkspace::new(), &file, &state).unwrap();

        // flip the stored checksum
        let mut snapshot: SnapshotFile =
            serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        snapshot.checksum = integrity_checksum(FORMAT_VERSION, "tampered");
        fs::write(&file, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        assert_eq!(load(&file), BuildState::new());
    }

    #[test]
    fn tampered_payload_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let state = sample_state(tmp.path());
        let file = tmp.path().join("state.json");
        store(&FilesystemWorkspace::new(), &file, &state).unwrap();

        // edit the payload while leaving the stored checksum alone
        let mut snapshot: SnapshotFile =
            serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        snapshot.payload.push(' ');
        fs::write(&file, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        assert_eq!(load(&file), BuildState::new());
    }

    #[test]
    fn unknown_version_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let state = sample_state(tmp.path());
        let file = tmp.path().join("state.json");
        store(&FilesystemWorkspace::new(), &file, &state).unwrap();

        let mut snapshot: SnapshotFile =
            serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        snapshot.version = 99;
        fs::write(&file, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        assert_eq!(load(&file), BuildState::new());
    }
}
