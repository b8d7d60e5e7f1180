//! `ptysh shell`: run a program attached to this terminal.

use anyhow::{Context, Result};
use ptysh_core::{PtySession, SpawnOptions};
use tracing::info;

pub fn run(opts: SpawnOptions) -> Result<()> {
    let session = PtySession::spawn(opts).context("failed to start session")?;
    info!(pid = session.pid(), argv = ?session.argv(), "interactive session started");
    session.interact().context("interactive session failed")
}
