//! Lookups against the host account database (NSS), used to resolve the
//! service account and socket groups to numeric ids and back.

use std::ffi::CStr;
use std::ffi::CString;
use std::io;

const INITIAL_BUF: usize = 1024;
const MAX_BUF: usize = 1 << 20;

fn nul_free(name: &str) -> io::Result<CString> {
    CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "name contains NUL byte"))
}

/// uid and primary gid for `user`, or `None` when no such account exists.
pub fn user_ids(user: &str) -> io::Result<Option<(u32, u32)>> {
    let c_user = nul_free(user)?;
    // SAFETY: passwd is a plain C struct; zeroed is a valid initial value.
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0 as libc::c_char; INITIAL_BUF];
    loop {
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        // SAFETY: all pointers reference live storage for the duration of
        // the call and buflen matches the buffer.
        let rc = unsafe {
            libc::getpwnam_r(
                c_user.as_ptr(),
                &mut pwd,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE && buf.len() < MAX_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        if result.is_null() {
            return Ok(None);
        }
        return Ok(Some((pwd.pw_uid, pwd.pw_gid)));
    }
}

/// gid for the group named `group`, or `None` when it does not exist.
pub fn group_gid(group: &str) -> io::Result<Option<u32>> {
    let c_group = nul_free(group)?;
    // SAFETY: group is a plain C struct; zeroed is a valid initial value.
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut buf = vec![0 as libc::c_char; INITIAL_BUF];
    loop {
        let mut result: *mut libc::group = std::ptr::null_mut();
        // SAFETY: all pointers reference live storage for the duration of
        // the call and buflen matches the buffer.
        let rc = unsafe {
            libc::getgrnam_r(
                c_group.as_ptr(),
                &mut grp,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE && buf.len() < MAX_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        if result.is_null() {
            return Ok(None);
        }
        return Ok(Some(grp.gr_gid));
    }
}

/// Name of the group owning `gid`. Absent and unresolvable both read as
/// `None`.
pub fn group_name(gid: u32) -> Option<String> {
    // SAFETY: group is a plain C struct; zeroed is a valid initial value.
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut buf = vec![0 as libc::c_char; INITIAL_BUF];
    loop {
        let mut result: *mut libc::group = std::ptr::null_mut();
        // SAFETY: all pointers reference live storage for the duration of
        // the call and buflen matches the buffer.
        let rc = unsafe {
            libc::getgrgid_r(
                gid as libc::gid_t,
                &mut grp,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE && buf.len() < MAX_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return None;
        }
        // SAFETY: gr_name points at a NUL-terminated string inside buf.
        let name = unsafe { CStr::from_ptr(grp.gr_name) };
        return Some(name.to_string_lossy().into_owned());
    }
}
