//! Interactive bridge between the local terminal and a PTY session.
//!
//! Only meaningful when this process's own stdin is a terminal; remote
//! consumers use the relay instead.

use nix::sys::termios::{self, SetArg, Termios};
use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::os::fd::{AsFd, BorrowedFd};
use tracing::debug;

use crate::error::{PtyshError, PtyshResult};
use crate::pty::{self, ReadOutcome};
use crate::session::{ChildHandle, PtySession};

/// Upper bound on a single read from the master.
pub const BRIDGE_CHUNK_SIZE: usize = 1024;

const DRAIN_LIMIT: usize = 64;

/// Puts a terminal into raw mode and restores the exact previous
/// attributes when dropped.
pub struct TerminalGuard<'fd> {
    fd: BorrowedFd<'fd>,
    saved: Termios,
}

impl<'fd> TerminalGuard<'fd> {
    pub fn enter(fd: BorrowedFd<'fd>) -> PtyshResult<Self> {
        let saved = termios::tcgetattr(fd)?;
        let mut raw = saved.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(fd, SetArg::TCSANOW, &raw)?;
        Ok(Self { fd, saved })
    }
}

impl Drop for TerminalGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = termios::tcsetattr(self.fd, SetArg::TCSADRAIN, &self.saved) {
            debug!(error = %e, "failed to restore terminal attributes");
        }
    }
}

impl PtySession {
    /// Attach the session to this process's terminal until either side ends.
    ///
    /// Local stdin goes to raw mode for the duration and is restored before
    /// the session is closed, on every exit path.
    pub fn interact(mut self) -> PtyshResult<()> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Err(PtyshError::NotATerminal);
        }
        let (master, child) = self.claim_reader()?;

        let result = {
            let _guard = TerminalGuard::enter(stdin.as_fd())?;
            let mut stdout = io::stdout().lock();
            run_bridge(stdin.as_fd(), &mut stdout, &master, &child)
        };

        self.close();
        result
    }

    /// Run the bridge over arbitrary descriptors, leaving terminal modes
    /// alone. `input` must be pollable.
    pub fn bridge<W: Write>(mut self, input: BorrowedFd<'_>, output: &mut W) -> PtyshResult<()> {
        let (master, child) = self.claim_reader()?;
        let result = run_bridge(input, output, &master, &child);
        self.close();
        result
    }
}

fn run_bridge<W: Write>(
    input: BorrowedFd<'_>,
    output: &mut W,
    master: &File,
    child: &ChildHandle,
) -> PtyshResult<()> {
    let mut buf = [0u8; BRIDGE_CHUNK_SIZE];
    let mut not_eof = true;

    while not_eof {
        let [from_pty, from_input] = pty::wait_ready([master.as_fd(), input])?;

        if from_pty.readable {
            match pty::read_chunk(master, &mut buf) {
                ReadOutcome::Data(n) => {
                    output.write_all(&buf[..n])?;
                    output.flush()?;
                }
                ReadOutcome::WouldBlock => {}
                ReadOutcome::Eof => not_eof = false,
            }
        }

        if not_eof && from_input.readable {
            let mut byte = [0u8; 1];
            match pty::read_fd(input, &mut byte) {
                ReadOutcome::Data(_) => {
                    if let Err(e) = pty::write_all(master, &byte) {
                        debug!(error = %e, "write to pty failed");
                        not_eof = false;
                    }
                }
                ReadOutcome::WouldBlock => {}
                ReadOutcome::Eof => not_eof = false,
            }
        }

        if (from_pty.exceptional && !from_pty.readable)
            || (from_input.exceptional && !from_input.readable)
        {
            not_eof = false;
        }

        if child.has_exited() {
            drain(master, &mut buf, output)?;
            output.write_all(b"\n")?;
            output.flush()?;
            not_eof = false;
        }
    }
    Ok(())
}

fn drain<W: Write>(master: &File, buf: &mut [u8], output: &mut W) -> io::Result<()> {
    for _ in 0..DRAIN_LIMIT {
        match pty::read_chunk(master, buf) {
            ReadOutcome::Data(n) => output.write_all(&buf[..n])?,
            ReadOutcome::WouldBlock | ReadOutcome::Eof => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SpawnOptions;
    use std::os::fd::OwnedFd;

    fn spawn(argv: &[&str]) -> PtySession {
        PtySession::spawn(SpawnOptions {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
        .expect("spawn should succeed")
    }

    fn pipe() -> (OwnedFd, OwnedFd) {
        nix::unistd::pipe().expect("pipe")
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn child_output_reaches_output_and_ends_with_newline() {
        let session = spawn(&["/bin/sh", "-c", "echo bridge-ok"]);
        let (read_end, _write_end) = pipe();
        let mut out = Vec::new();
        session.bridge(read_end.as_fd(), &mut out).unwrap();
        assert!(contains(&out, b"bridge-ok"));
        assert_eq!(out.last(), Some(&b'\n'));
    }

    #[test]
    fn input_is_forwarded_to_child() {
        let session = spawn(&["/bin/sh", "-c", "read line; echo got-$line"]);
        let (read_end, write_end) = pipe();
        let mut writer = File::from(write_end);
        writer.write_all(b"ping\n").unwrap();
        let mut out = Vec::new();
        session.bridge(read_end.as_fd(), &mut out).unwrap();
        assert!(
            contains(&out, b"got-ping"),
            "unexpected output: {}",
            String::from_utf8_lossy(&out)
        );
    }

    #[test]
    fn input_eof_ends_bridge() {
        let session = spawn(&["/bin/sh", "-c", "sleep 30"]);
        let (read_end, write_end) = pipe();
        drop(write_end);
        let mut out = Vec::new();
        let started = std::time::Instant::now();
        session.bridge(read_end.as_fd(), &mut out).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[test]
    fn interact_requires_a_terminal() {
        if io::stdin().is_terminal() {
            return;
        }
        let session = spawn(&["/bin/sh", "-c", "exit 0"]);
        assert!(matches!(session.interact(), Err(PtyshError::NotATerminal)));
    }

    #[test]
    fn guard_restores_attributes() {
        let pair = pty::open_pair(None).unwrap();
        let before = termios::tcgetattr(pair.slave.as_fd()).unwrap();
        {
            let _guard = TerminalGuard::enter(pair.slave.as_fd()).unwrap();
            let raw = termios::tcgetattr(pair.slave.as_fd()).unwrap();
            assert!(!raw.local_flags.contains(termios::LocalFlags::ECHO));
            assert!(!raw.local_flags.contains(termios::LocalFlags::ICANON));
            assert!(!raw.local_flags.contains(termios::LocalFlags::ISIG));
        }
        let after = termios::tcgetattr(pair.slave.as_fd()).unwrap();
        assert_eq!(before.local_flags, after.local_flags);
        assert_eq!(before.input_flags, after.input_flags);
        assert_eq!(before.output_flags, after.output_flags);
    }
}
