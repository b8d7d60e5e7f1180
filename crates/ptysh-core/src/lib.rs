//! ptysh-core: PTY-backed shell sessions.
//!
//! Spawns a program on a pseudo-terminal, optionally dropping privileges to
//! a target user between fork and exec, and moves the terminal's byte stream
//! either to a remote consumer (the relay) or to the local terminal (the
//! interactive bridge).

pub mod bridge;
pub mod error;
pub mod identity;
pub mod privdrop;
pub mod pty;
pub mod relay;
pub mod session;
pub mod shell;

// Re-export commonly used items at crate root.
pub use bridge::TerminalGuard;
pub use error::{PtyshError, PtyshResult};
pub use identity::{ResolvedIdentity, TargetIdentity};
pub use pty::PtySize;
pub use relay::{FnSink, RelayEvent, RelayHandle, RelaySink};
pub use session::{PtySession, SpawnOptions};
