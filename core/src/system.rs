//! Seams between dispatch logic and the host: collaborator subprocesses and
//! the mutations the privilege adjuster may perform. Both are traits so the
//! sequences stay testable and so non-root runs can be shown to perform no
//! mutations at all.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::Command;
use std::process::ExitStatus;

use walkdir::WalkDir;

use crate::accounts;
use crate::error::BootstrapError;
use crate::error::Result;

/// Runs a collaborator argv to completion.
pub trait CommandRunner {
    fn status(&self, argv: &[String]) -> io::Result<ExitStatus>;
}

/// Real runner. Stdio is inherited so collaborator output lands in the
/// container log stream.
pub struct HostRunner;

impl CommandRunner for HostRunner {
    fn status(&self, argv: &[String]) -> io::Result<ExitStatus> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argv"))?;
        Command::new(program).args(args).status()
    }
}

/// Conventional exit code for a status: the code itself, or 128 plus the
/// signal number for signal deaths.
pub fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

/// Host mutations the privilege adjuster may perform.
pub trait HostOps {
    /// Create `name` bound to `gid`. Only called after a lookup showed no
    /// group owns the gid.
    fn create_group(&self, name: &str, gid: u32) -> Result<()>;
    /// Add `user` to the supplementary group `group`.
    fn add_user_to_group(&self, user: &str, group: &str) -> Result<()>;
    /// Name of the group owning `gid`, if any.
    fn group_name_for_gid(&self, gid: u32) -> Option<String>;
    /// Re-own `path` and everything under it to `user:group`.
    fn chown_recursive(&self, path: &Path, user: &str, group: &str) -> Result<()>;
}

pub struct Host;

impl HostOps for Host {
    fn create_group(&self, name: &str, gid: u32) -> Result<()> {
        let status = Command::new("groupadd")
            .args(["-g", &gid.to_string(), name])
            .status()
            .map_err(|source| BootstrapError::CollaboratorSpawn {
                step: "groupadd",
                source,
            })?;
        if !status.success() {
            return Err(BootstrapError::GroupCreate {
                group: name.to_string(),
                gid,
                code: exit_code(status),
            });
        }
        Ok(())
    }

    fn add_user_to_group(&self, user: &str, group: &str) -> Result<()> {
        let status = Command::new("usermod")
            .args(["-a", "-G", group, user])
            .status()
            .map_err(|source| BootstrapError::CollaboratorSpawn {
                step: "usermod",
                source,
            })?;
        if !status.success() {
            return Err(BootstrapError::GroupMembership {
                user: user.to_string(),
                group: group.to_string(),
                code: exit_code(status),
            });
        }
        Ok(())
    }

    fn group_name_for_gid(&self, gid: u32) -> Option<String> {
        accounts::group_name(gid)
    }

    fn chown_recursive(&self, path: &Path, user: &str, group: &str) -> Result<()> {
        let chown_err = |path: &Path, source: io::Error| BootstrapError::Chown {
            path: path.to_path_buf(),
            source,
        };
        let (uid, _) = accounts::user_ids(user)
            .map_err(|source| chown_err(path, source))?
            .ok_or_else(|| {
                chown_err(
                    path,
                    io::Error::new(io::ErrorKind::NotFound, format!("no such user: {user}")),
                )
            })?;
        let gid = accounts::group_gid(group)
            .map_err(|source| chown_err(path, source))?
            .ok_or_else(|| {
                chown_err(
                    path,
                    io::Error::new(io::ErrorKind::NotFound, format!("no such group: {group}")),
                )
            })?;
        for entry in WalkDir::new(path) {
            let entry = entry.map_err(|source| chown_err(path, io::Error::from(source)))?;
            std::os::unix::fs::chown(entry.path(), Some(uid), Some(gid))
                .map_err(|source| chown_err(entry.path(), source))?;
        }
        Ok(())
    }
}
