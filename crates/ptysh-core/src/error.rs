use thiserror::Error;

/// Errors produced by PTY session handling.
#[derive(Debug, Error)]
pub enum PtyshError {
    #[error("failed to allocate pty: {0}")]
    Pty(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("a relay or interactive bridge is already running on this session")]
    RelayActive,

    #[error("standard input is not a terminal")]
    NotATerminal,

    #[error("session is closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("system call failed: {0}")]
    Sys(#[from] nix::errno::Errno),

    #[error("{0}")]
    Other(String),
}

pub type PtyshResult<T> = Result<T, PtyshError>;
