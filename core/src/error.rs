use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::role::Role;

pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Fatal bootstrap failures. Each one aborts dispatch immediately; exit
/// codes reported by collaborator subprocesses propagate unchanged.
#[derive(Debug, Error)]
pub enum BootstrapError {
    // Readiness gate
    #[error("backing store did not become ready (exit code {code})")]
    StoreUnavailable { code: i32 },

    // Collaborator subprocesses
    #[error("{step} exited with code {code}")]
    CollaboratorFailed { step: &'static str, code: i32 },
    #[error("failed to launch {step}")]
    CollaboratorSpawn {
        step: &'static str,
        #[source]
        source: io::Error,
    },

    // Mode recording
    #[error("failed to record mode {role} at {path}")]
    RecordMode {
        role: Role,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // Privilege adjustment
    #[error("failed to create group {group} with gid {gid} (exit code {code})")]
    GroupCreate { group: String, gid: u32, code: i32 },
    #[error("failed to add {user} to group {group} (exit code {code})")]
    GroupMembership {
        user: String,
        group: String,
        code: i32,
    },
    #[error("no group name resolves for gid {gid}")]
    GroupLookup { gid: u32 },
    #[error("failed to change ownership of {path}")]
    Chown {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare report file {path}")]
    ReportFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BootstrapError {
    /// Exit code the entrypoint reports for this failure. Collaborator exit
    /// codes pass through; a collaborator that could not be launched at all
    /// maps to the conventional 127 when the binary is missing, otherwise 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::StoreUnavailable { code }
            | BootstrapError::CollaboratorFailed { code, .. }
            | BootstrapError::GroupCreate { code, .. }
            | BootstrapError::GroupMembership { code, .. } => *code,
            BootstrapError::CollaboratorSpawn { source, .. } => {
                if source.kind() == io::ErrorKind::NotFound {
                    127
                } else {
                    1
                }
            }
            BootstrapError::RecordMode { .. }
            | BootstrapError::GroupLookup { .. }
            | BootstrapError::Chown { .. }
            | BootstrapError::ReportFile { .. } => 1,
        }
    }
}
