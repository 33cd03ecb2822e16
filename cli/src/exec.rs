//! Process replacement with the optional identity drop.

use std::ffi::CString;
use std::ffi::OsStr;
use std::io;
use std::os::unix::ffi::OsStrExt;

use vessel_core::accounts;
use vessel_core::launch::LaunchIdentity;
use vessel_core::launch::LaunchSpec;
use vessel_core::privilege::GroupSpec;

/// Replace the current process with `spec`.
///
/// Returns only on failure: exit 1 when the identity cannot be applied, 127
/// when the target cannot be resolved or executed.
pub(crate) fn exec_launch_spec(spec: LaunchSpec) -> ! {
    let LaunchSpec {
        command,
        identity,
        env,
    } = spec;
    let Some(program) = command.first() else {
        eprintln!("vessel: empty launch command");
        std::process::exit(1);
    };

    if let LaunchIdentity::Switch { user, groups } = &identity {
        match switch_identity(user, groups) {
            Ok(()) => tracing::info!(user = %user, groups = %groups, "dropped privileges"),
            Err(err) => {
                eprintln!("vessel: failed to drop privileges to {user}: {err}");
                std::process::exit(1);
            }
        }
    }

    let resolved = match which::which(program) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("vessel: {program}: {err}");
            std::process::exit(127);
        }
    };

    let Ok(c_program) = CString::new(resolved.as_os_str().as_bytes()) else {
        eprintln!("vessel: target path contains NUL");
        std::process::exit(127);
    };
    let c_args: Vec<CString> = match command
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect()
    {
        Ok(args) => args,
        Err(_) => {
            eprintln!("vessel: argument contains NUL");
            std::process::exit(127);
        }
    };
    let mut arg_ptrs: Vec<*const libc::c_char> = c_args.iter().map(|arg| arg.as_ptr()).collect();
    arg_ptrs.push(std::ptr::null());

    let c_env = build_envp(&env);
    let mut env_ptrs: Vec<*const libc::c_char> = c_env.iter().map(|entry| entry.as_ptr()).collect();
    env_ptrs.push(std::ptr::null());

    // SAFETY: argv and envp are NUL-terminated arrays of NUL-terminated
    // strings, all of which outlive the call.
    unsafe {
        libc::execve(c_program.as_ptr(), arg_ptrs.as_ptr(), env_ptrs.as_ptr());
    }
    let err = io::Error::last_os_error();
    eprintln!("vessel: failed to exec {}: {err}", resolved.display());
    std::process::exit(127);
}

/// Drop to `user` with the given groups. Memberships can only change while
/// still root, so groups are applied before the uid.
fn switch_identity(user: &str, groups: &GroupSpec) -> io::Result<()> {
    let not_found = |what: String| io::Error::new(io::ErrorKind::NotFound, what);
    let (uid, _) = accounts::user_ids(user)?
        .ok_or_else(|| not_found(format!("no such user: {user}")))?;
    let primary = accounts::group_gid(&groups.primary)?
        .ok_or_else(|| not_found(format!("no such group: {}", groups.primary)))?;
    let mut gids: Vec<libc::gid_t> = vec![primary];
    if let Some(name) = &groups.supplementary {
        let gid = accounts::group_gid(name)?
            .ok_or_else(|| not_found(format!("no such group: {name}")))?;
        if gid != primary {
            gids.push(gid);
        }
    }
    // SAFETY: gids points at a live array of gids.len() entries.
    if unsafe { libc::setgroups(gids.len(), gids.as_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: plain syscalls on numeric ids.
    if unsafe { libc::setgid(primary) } != 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::setuid(uid) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Current environment with `overrides` substituted, as NUL-terminated
/// KEY=VALUE entries.
fn build_envp(overrides: &[(String, String)]) -> Vec<CString> {
    let mut entries = Vec::new();
    for (key, value) in std::env::vars_os() {
        if overrides
            .iter()
            .any(|(name, _)| key.as_os_str() == OsStr::new(name))
        {
            continue;
        }
        let mut bytes = key.as_bytes().to_vec();
        bytes.push(b'=');
        bytes.extend_from_slice(value.as_bytes());
        if let Ok(entry) = CString::new(bytes) {
            entries.push(entry);
        }
    }
    for (name, value) in overrides {
        if let Ok(entry) = CString::new(format!("{name}={value}")) {
            entries.push(entry);
        }
    }
    entries
}
