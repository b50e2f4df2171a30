//! Privilege change before the run
//!
//! With a user (and optionally a group) configured, the process switches
//! group first and user second. A group without a user is ignored.

use anyhow::{Result, bail};

#[cfg(unix)]
pub fn change_privilege(user: Option<&str>, group: Option<&str>) -> Result<()> {
    let Some(user) = user else {
        if let Some(group) = group {
            log::warn!("Group {group} given without a user, not changing privileges");
        }
        return Ok(());
    };
    unix::switch_to(user, group.unwrap_or(user))
}

#[cfg(not(unix))]
pub fn change_privilege(user: Option<&str>, group: Option<&str>) -> Result<()> {
    if user.is_some() || group.is_some() {
        bail!("Changing privileges is only supported on Unix");
    }
    Ok(())
}

#[cfg(unix)]
mod unix {
    use super::{Result, bail};
    use anyhow::Context;
    use std::ffi::CString;
    use std::io;

    pub fn switch_to(user: &str, group: &str) -> Result<()> {
        let c_user = CString::new(user).context("User name contains a NUL byte")?;
        let c_group = CString::new(group).context("Group name contains a NUL byte")?;

        // SAFETY: getpwnam/getgrnam take valid C strings and return null or a
        // pointer to static storage, read before any other call.
        let uid = unsafe {
            let pw = libc::getpwnam(c_user.as_ptr());
            if pw.is_null() {
                bail!("Failed to get UID for user {user}, does it exist?");
            }
            (*pw).pw_uid
        };
        let gid = unsafe {
            let gr = libc::getgrnam(c_group.as_ptr());
            if gr.is_null() {
                bail!("Failed to get GID for group {group}, does it exist?");
            }
            (*gr).gr_gid
        };

        // SAFETY: plain syscalls without pointer arguments.
        let (euid, egid) = unsafe { (libc::geteuid(), libc::getegid()) };
        if uid == euid && gid == egid {
            log::debug!("Already running as {user}:{group}");
            return Ok(());
        }

        log::info!("Changing privileges to {user}:{group}");
        // SAFETY: c_user outlives the call; the remaining calls take ids only.
        unsafe {
            if libc::initgroups(c_user.as_ptr(), gid as _) != 0 {
                bail!("Failed to initialize groups for {user}: {}", io::Error::last_os_error());
            }
            if libc::setgid(gid) != 0 {
                bail!("Failed to change GID to {group}: {}", io::Error::last_os_error());
            }
            if libc::setuid(uid) != 0 {
                bail!("Failed to change UID to {user}: {}", io::Error::last_os_error());
            }
        }
        Ok(())
    }
}
