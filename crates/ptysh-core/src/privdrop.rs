//! Privilege drop performed in the child between fork and exec.
//!
//! Everything that needs the user database or an allocation is prepared in
//! the parent by [`PrivilegeDrop::new`]. [`PrivilegeDrop::apply`] only issues
//! raw system calls, so it is safe to run from a `pre_exec` hook.
//!
//! Every step is best effort. A failed step is skipped and the sequence goes
//! on, with one exception: the uid is only changed once the gid change has
//! succeeded.

use std::ffi::{CStr, CString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;

use crate::identity::ResolvedIdentity;

/// The system calls the privilege drop is built from.
pub trait PrivilegeOps {
    fn chown_tty(&mut self, tty: &CStr, uid: libc::uid_t) -> io::Result<()>;
    fn init_groups(&mut self, name: &CStr, gid: libc::gid_t) -> io::Result<()>;
    fn chdir(&mut self, dir: &CStr) -> io::Result<()>;
    fn set_gids(&mut self, gid: libc::gid_t) -> io::Result<()>;
    fn set_uids(&mut self, uid: libc::uid_t) -> io::Result<()>;
    fn new_session(&mut self) -> io::Result<()>;
    fn set_controlling_tty(&mut self, fd: RawFd) -> io::Result<()>;
}

#[derive(Debug, Clone)]
struct DropTarget {
    uid: libc::uid_t,
    gid: libc::gid_t,
    name: Option<CString>,
    home: Option<CString>,
}

/// A prepared privilege-drop sequence.
#[derive(Debug, Clone)]
pub struct PrivilegeDrop {
    target: Option<DropTarget>,
    tty_path: Option<CString>,
    tty_fd: RawFd,
}

impl PrivilegeDrop {
    /// Prepare the sequence for `identity`, using `tty_path` for the
    /// ownership change. The controlling terminal is taken from stdin,
    /// which is the pty slave once the child's stdio is wired up.
    pub fn new(identity: Option<&ResolvedIdentity>, tty_path: Option<&Path>) -> Self {
        let target = identity.map(|id| DropTarget {
            uid: id.uid.as_raw(),
            gid: id.gid.as_raw(),
            name: CString::new(id.name.as_bytes()).ok(),
            home: CString::new(id.home.as_os_str().as_bytes()).ok(),
        });
        let tty_path = tty_path.and_then(|p| CString::new(p.as_os_str().as_bytes()).ok());
        Self {
            target,
            tty_path,
            tty_fd: libc::STDIN_FILENO,
        }
    }

    /// Whether a target identity is part of this sequence.
    pub fn drops_privileges(&self) -> bool {
        self.target.is_some()
    }

    /// Run the sequence. Never fails; see the module docs.
    pub fn apply<O: PrivilegeOps>(&self, ops: &mut O) {
        if let Some(target) = &self.target {
            if let Some(tty) = &self.tty_path {
                let _ = ops.chown_tty(tty, target.uid);
            }

            if let Some(name) = &target.name {
                let _ = ops.init_groups(name, target.gid);
            }
            if let Some(home) = &target.home {
                let _ = ops.chdir(home);
            }

            if ops.set_gids(target.gid).is_ok() {
                let _ = ops.set_uids(target.uid);
            }
        }

        let _ = ops.new_session();
        let _ = ops.set_controlling_tty(self.tty_fd);
    }
}

/// [`PrivilegeOps`] backed by libc. Async-signal-safe apart from
/// `initgroups`, which is what every login program calls at this point.
pub(crate) struct LibcOps;

fn cvt(ret: libc::c_int) -> io::Result<()> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

impl PrivilegeOps for LibcOps {
    fn chown_tty(&mut self, tty: &CStr, uid: libc::uid_t) -> io::Result<()> {
        // gid of -1 leaves the group unchanged
        cvt(unsafe { libc::chown(tty.as_ptr(), uid, libc::gid_t::MAX) })
    }

    fn init_groups(&mut self, name: &CStr, gid: libc::gid_t) -> io::Result<()> {
        cvt(unsafe { libc::initgroups(name.as_ptr(), gid) })
    }

    fn chdir(&mut self, dir: &CStr) -> io::Result<()> {
        cvt(unsafe { libc::chdir(dir.as_ptr()) })
    }

    fn set_gids(&mut self, gid: libc::gid_t) -> io::Result<()> {
        cvt(unsafe { libc::setresgid(gid, gid, gid) })
    }

    fn set_uids(&mut self, uid: libc::uid_t) -> io::Result<()> {
        cvt(unsafe { libc::setresuid(uid, uid, uid) })
    }

    fn new_session(&mut self) -> io::Result<()> {
        if unsafe { libc::setsid() } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn set_controlling_tty(&mut self, fd: RawFd) -> io::Result<()> {
        cvt(unsafe { libc::ioctl(fd, libc::TIOCSCTTY as _, 0) })
    }
}
