//! Pseudo-terminal plumbing: pair allocation, descriptor flags, window size
//! and the readiness wait shared by the relay and the interactive bridge.

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::pty::{openpty, Winsize};
use std::ffi::CStr;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use crate::error::{PtyshError, PtyshResult};

nix::ioctl_write_ptr_bad!(tiocswinsz, libc::TIOCSWINSZ, libc::winsize);
nix::ioctl_read_bad!(tiocgwinsz, libc::TIOCGWINSZ, libc::winsize);

/// Terminal window size, in character cells and pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    pub rows: u16,
    pub cols: u16,
    pub pixel_width: u16,
    pub pixel_height: u16,
}

impl Default for PtySize {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

impl From<PtySize> for Winsize {
    fn from(size: PtySize) -> Self {
        Winsize {
            ws_row: size.rows,
            ws_col: size.cols,
            ws_xpixel: size.pixel_width,
            ws_ypixel: size.pixel_height,
        }
    }
}

impl From<Winsize> for PtySize {
    fn from(ws: Winsize) -> Self {
        Self {
            rows: ws.ws_row,
            cols: ws.ws_col,
            pixel_width: ws.ws_xpixel,
            pixel_height: ws.ws_ypixel,
        }
    }
}

/// A freshly allocated master/slave pair.
pub struct PtyPair {
    /// Master side, unbuffered.
    pub master: File,
    /// Slave side, handed to the child.
    pub slave: OwnedFd,
    /// Device path of the slave, if the system could name it.
    pub slave_path: Option<PathBuf>,
}

/// Allocate a pty pair. The master is made non-blocking and close-on-exec.
pub fn open_pair(size: Option<PtySize>) -> PtyshResult<PtyPair> {
    let winsize = size.map(Winsize::from);
    let pair = openpty(winsize.as_ref(), None).map_err(|e| PtyshError::Pty(e.to_string()))?;

    let master = File::from(pair.master);
    set_nonblocking(master.as_fd())?;
    set_cloexec(master.as_fd())?;

    let slave_path = tty_name(pair.slave.as_fd());
    Ok(PtyPair {
        master,
        slave: pair.slave,
        slave_path,
    })
}

/// Put a descriptor into non-blocking mode.
pub fn set_nonblocking(fd: BorrowedFd<'_>) -> PtyshResult<()> {
    let raw = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error().into());
    }
    if unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}

fn set_cloexec(fd: BorrowedFd<'_>) -> PtyshResult<()> {
    let raw = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error().into());
    }
    if unsafe { libc::fcntl(raw, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}

fn tty_name(fd: BorrowedFd<'_>) -> Option<PathBuf> {
    let mut buf = [0 as libc::c_char; 128];
    let ret = unsafe { libc::ttyname_r(fd.as_raw_fd(), buf.as_mut_ptr(), buf.len()) };
    if ret != 0 {
        return None;
    }
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Some(PathBuf::from(std::ffi::OsStr::from_bytes(name.to_bytes())))
}

/// Set the window size of the terminal behind `fd`.
pub fn set_size(fd: BorrowedFd<'_>, size: PtySize) -> PtyshResult<()> {
    let ws = Winsize::from(size);
    unsafe { tiocswinsz(fd.as_raw_fd(), &ws) }?;
    Ok(())
}

/// Query the window size of the terminal behind `fd`.
pub fn get_size(fd: BorrowedFd<'_>) -> PtyshResult<PtySize> {
    let mut ws = Winsize::from(PtySize::default());
    unsafe { tiocgwinsz(fd.as_raw_fd(), &mut ws) }?;
    Ok(ws.into())
}

/// What a poll reported for one descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Readiness {
    pub readable: bool,
    /// Error, invalid descriptor, urgent data, or a hangup with nothing
    /// left to read.
    pub exceptional: bool,
}

impl Readiness {
    fn from_revents(revents: Option<PollFlags>) -> Self {
        let revents = revents.unwrap_or(PollFlags::empty());
        let readable = revents.contains(PollFlags::POLLIN);
        let exceptional = revents
            .intersects(PollFlags::POLLPRI | PollFlags::POLLERR | PollFlags::POLLNVAL)
            || (revents.contains(PollFlags::POLLHUP) && !readable);
        Self {
            readable,
            exceptional,
        }
    }
}

/// Block without timeout until at least one descriptor is readable or
/// exceptional. Interrupted waits are restarted.
pub(crate) fn wait_ready<const N: usize>(fds: [BorrowedFd<'_>; N]) -> PtyshResult<[Readiness; N]> {
    let mut poll_fds = fds.map(|fd| PollFd::new(fd, PollFlags::POLLIN | PollFlags::POLLPRI));
    loop {
        match poll(&mut poll_fds, PollTimeout::NONE) {
            Ok(_) => break,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(poll_fds.map(|fd| Readiness::from_revents(fd.revents())))
}

/// Result of one read from a non-blocking descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    Data(usize),
    WouldBlock,
    /// End of stream. Read errors other than would-block count as this;
    /// a pty master reports EIO once the last slave is gone.
    Eof,
}

pub(crate) fn read_chunk(mut file: &File, buf: &mut [u8]) -> ReadOutcome {
    classify(file.read(buf))
}

/// Read from a descriptor we do not own (e.g. the process's stdin),
/// bypassing any userspace buffering.
pub(crate) fn read_fd(fd: BorrowedFd<'_>, buf: &mut [u8]) -> ReadOutcome {
    let ret = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
    if ret < 0 {
        classify(Err(io::Error::last_os_error()))
    } else {
        classify(Ok(ret as usize))
    }
}

fn classify(result: io::Result<usize>) -> ReadOutcome {
    match result {
        Ok(0) => ReadOutcome::Eof,
        Ok(n) => ReadOutcome::Data(n),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            ReadOutcome::WouldBlock
        }
        Err(_) => ReadOutcome::Eof,
    }
}

/// Write all of `data` to a non-blocking descriptor, waiting for
/// writability whenever the kernel buffer is full.
pub(crate) fn write_all(mut file: &File, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match file.write(data) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => wait_writable(file.as_fd())?,
            Err(e) => return Err(e),
        }
    }
    file.flush()
}

fn wait_writable(fd: BorrowedFd<'_>) -> io::Result<()> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLOUT)];
    loop {
        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => return Ok(()),
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
