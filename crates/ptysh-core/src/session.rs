//! PTY session lifecycle: spawn, write, resize and close.
//!
//! A [`PtySession`] owns one pty master and one child process. Output is
//! consumed either by the background relay ([`PtySession::start_read_loop`],
//! [`PtySession::subscribe`]) or by the foreground interactive bridge
//! ([`PtySession::interact`]), never both.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::File;
use std::os::fd::AsFd;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{PtyshError, PtyshResult};
use crate::identity::{ResolvedIdentity, TargetIdentity};
use crate::privdrop::{LibcOps, PrivilegeDrop};
use crate::pty::{self, PtySize};
use crate::shell;

/// Parameters for [`PtySession::spawn`].
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Program and arguments. Empty means the default shell.
    pub argv: Vec<String>,
    /// Value for `TERM` in the child.
    pub term: Option<String>,
    /// User to drop privileges to before exec.
    pub user: Option<TargetIdentity>,
    /// Initial window size.
    pub size: Option<PtySize>,
}

/// Shared handle on the child process, used for status queries from the
/// relay thread while the owner keeps writing.
#[derive(Clone)]
pub(crate) struct ChildHandle(Arc<Mutex<Child>>);

impl ChildHandle {
    fn lock(&self) -> MutexGuard<'_, Child> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Non-blocking status query.
    pub(crate) fn try_status(&self) -> PtyshResult<Option<ExitStatus>> {
        Ok(self.lock().try_wait()?)
    }

    /// Whether the child is gone. A child that can no longer be queried
    /// counts as exited.
    pub(crate) fn has_exited(&self) -> bool {
        !matches!(self.try_status(), Ok(None))
    }
}

/// A child process running on a pseudo-terminal.
pub struct PtySession {
    master: Option<Arc<File>>,
    child: ChildHandle,
    pid: u32,
    argv: Vec<String>,
    env: BTreeMap<OsString, OsString>,
    user: Option<TargetIdentity>,
    term: Option<String>,
    reader_claimed: AtomicBool,
    closed: bool,
}

impl PtySession {
    /// Spawn a program on a new pty.
    ///
    /// Failing to resolve the target user is logged and the child runs
    /// without a privilege drop. Failing to allocate the pty or to start the
    /// program is an error.
    pub fn spawn(opts: SpawnOptions) -> PtyshResult<Self> {
        let argv = shell::resolve_argv_from_env(&opts.argv);
        let resolved = opts.user.as_ref().and_then(resolve_best_effort);
        let env = shell::child_env(std::env::vars_os(), opts.term.as_deref(), resolved.as_ref());

        let pair = pty::open_pair(opts.size)?;
        let sequence = PrivilegeDrop::new(resolved.as_ref(), pair.slave_path.as_deref());
        let drops_privileges = sequence.drops_privileges();

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .env_clear()
            .envs(&env)
            .stdin(Stdio::from(pair.slave.try_clone()?))
            .stdout(Stdio::from(pair.slave.try_clone()?))
            .stderr(Stdio::from(pair.slave.try_clone()?));

        // SAFETY: `apply` only performs raw system calls on data prepared
        // before the fork.
        unsafe {
            cmd.pre_exec(move || {
                sequence.apply(&mut LibcOps);
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(|source| PtyshError::Spawn {
            program: argv[0].clone(),
            source,
        })?;

        // The command still holds slave duplicates for its stdio.
        drop(cmd);
        drop(pair.slave);

        let pid = child.id();
        info!(
            pid,
            program = %argv[0],
            user = ?opts.user.as_ref().map(|u| u.to_string()),
            drops_privileges,
            "PTY session spawned"
        );

        Ok(Self {
            master: Some(Arc::new(pair.master)),
            child: ChildHandle(Arc::new(Mutex::new(child))),
            pid,
            argv,
            env,
            user: opts.user,
            term: opts.term,
            reader_claimed: AtomicBool::new(false),
            closed: false,
        })
    }

    /// Send bytes to the child.
    ///
    /// A failed write closes this session's master handle; later writes are
    /// dropped silently.
    pub fn write(&mut self, data: &[u8]) {
        let Some(master) = &self.master else {
            debug!(bytes = data.len(), "write on closed PTY ignored");
            return;
        };
        if let Err(e) = pty::write_all(master, data) {
            warn!(pid = self.pid, error = %e, "PTY write failed, closing master");
            self.master = None;
        }
    }

    /// Change the window size. Arguments are in `TIOCSWINSZ` order.
    pub fn set_pty_size(
        &self,
        rows: u16,
        cols: u16,
        pixel_width: u16,
        pixel_height: u16,
    ) -> PtyshResult<()> {
        let master = self.master.as_ref().ok_or(PtyshError::Closed)?;
        let size = PtySize {
            rows,
            cols,
            pixel_width,
            pixel_height,
        };
        pty::set_size(master.as_fd(), size)?;
        debug!(rows, cols, "PTY resized");
        Ok(())
    }

    /// Current window size as seen by the terminal.
    pub fn pty_size(&self) -> PtyshResult<PtySize> {
        let master = self.master.as_ref().ok_or(PtyshError::Closed)?;
        pty::get_size(master.as_fd())
    }

    /// Terminate the child and release the master.
    ///
    /// Idempotent. A running child gets `SIGTERM` and one non-blocking reap
    /// attempt; this never waits for it.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.master = None;

        let mut child = self.child.lock();
        match child.try_wait() {
            Ok(Some(status)) => debug!(pid = self.pid, %status, "child already exited"),
            Ok(None) => {
                if let Err(e) = signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
                    debug!(pid = self.pid, error = %e, "SIGTERM failed");
                }
                if let Ok(Some(status)) = child.try_wait() {
                    debug!(pid = self.pid, %status, "child reaped");
                }
            }
            Err(e) => debug!(pid = self.pid, error = %e, "child status unavailable"),
        }
        info!(pid = self.pid, "PTY session closed");
    }

    /// Non-blocking exit status query.
    pub fn try_status(&self) -> PtyshResult<Option<ExitStatus>> {
        self.child.try_status()
    }

    pub fn is_running(&self) -> bool {
        !self.child.has_exited()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The argv the child was executed with.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The environment the child was started with.
    pub fn env(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }

    pub fn user(&self) -> Option<&TargetIdentity> {
        self.user.as_ref()
    }

    pub fn term(&self) -> Option<&str> {
        self.term.as_deref()
    }

    /// Hand out the read side to exactly one relay or bridge.
    pub(crate) fn claim_reader(&self) -> PtyshResult<(Arc<File>, ChildHandle)> {
        let master = self.master.clone().ok_or(PtyshError::Closed)?;
        if self.reader_claimed.swap(true, Ordering::SeqCst) {
            return Err(PtyshError::RelayActive);
        }
        Ok((master, self.child.clone()))
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.close();
    }
}

fn resolve_best_effort(id: &TargetIdentity) -> Option<ResolvedIdentity> {
    match id.resolve() {
        Ok(resolved) => Some(resolved),
        Err(e) => {
            warn!(user = %id, error = %e, "cannot resolve target user, running without privilege drop");
            None
        }
    }
}
