//! Privilege probing and the pre-launch adjustment.
//!
//! Containers may start as root (so ownership of mounted volumes can be
//! repaired and the control socket group derived) or as an arbitrary
//! unprivileged user. The probe runs once at startup; everything downstream
//! receives the result explicitly instead of asking the OS again.

use std::fmt;
use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::fs::MetadataExt;

use tracing::info;

use crate::error::BootstrapError;
use crate::error::Result;
use crate::launch::LaunchIdentity;
use crate::launch::LaunchSpec;
use crate::layout::Layout;
use crate::layout::SERVICE_GROUP;
use crate::layout::SERVICE_HOME;
use crate::layout::SERVICE_USER;
use crate::system::HostOps;

/// Name given to the control-socket group when its gid is not yet bound.
const CONTROL_SOCKET_GROUP: &str = "docker";

/// Privilege facts probed once at startup and passed down explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeContext {
    pub euid: u32,
    /// Group owning the container runtime control socket, when the socket
    /// exists.
    pub control_socket_gid: Option<u32>,
}

impl PrivilegeContext {
    /// Probe the real environment. Only an actual socket at the control
    /// path counts as present; any other inode there is ignored.
    pub fn probe(layout: &Layout) -> Self {
        // SAFETY: geteuid has no failure modes.
        let euid = unsafe { libc::geteuid() };
        let control_socket_gid = fs::metadata(&layout.control_socket)
            .ok()
            .filter(|meta| meta.file_type().is_socket())
            .map(|meta| meta.gid());
        Self {
            euid,
            control_socket_gid,
        }
    }

    pub fn is_root(self) -> bool {
        self.euid == 0
    }
}

/// Primary service group plus the optional control-socket group. Dual
/// membership keeps the service account's own files accessible while
/// granting the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub primary: String,
    pub supplementary: Option<String>,
}

impl fmt::Display for GroupSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.supplementary {
            Some(extra) => write!(f, "{}:{extra}", self.primary),
            None => f.write_str(&self.primary),
        }
    }
}

/// Decide how `command` runs relative to the current privilege level.
///
/// Unprivileged containers run the command as-is. Root containers derive
/// the control-socket group when the socket is present, re-own the two data
/// directories, and hand back a spec that drops to the service account.
pub fn prepare(
    command: Vec<String>,
    privilege: PrivilegeContext,
    layout: &Layout,
    host: &dyn HostOps,
) -> Result<LaunchSpec> {
    if !privilege.is_root() {
        info!(
            euid = privilege.euid,
            "running unprivileged; permission fixes disabled"
        );
        return Ok(LaunchSpec::current(command));
    }

    let mut groups = GroupSpec {
        primary: SERVICE_GROUP.to_string(),
        supplementary: None,
    };
    if let Some(gid) = privilege.control_socket_gid {
        let name = match host.group_name_for_gid(gid) {
            Some(name) => name,
            None => {
                host.create_group(CONTROL_SOCKET_GROUP, gid)?;
                host.group_name_for_gid(gid)
                    .ok_or(BootstrapError::GroupLookup { gid })?
            }
        };
        host.add_user_to_group(SERVICE_USER, &name)?;
        info!(gid, group = %name, "granting control socket access");
        groups.supplementary = Some(name);
    }

    for dir in [&layout.media_dir, &layout.certs_dir] {
        host.chown_recursive(dir, SERVICE_USER, SERVICE_GROUP)?;
    }

    Ok(LaunchSpec {
        command,
        identity: LaunchIdentity::Switch {
            user: SERVICE_USER.to_string(),
            groups,
        },
        env: vec![("HOME".to_string(), SERVICE_HOME.to_string())],
    })
}
