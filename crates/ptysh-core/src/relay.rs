//! Background relay of PTY output.
//!
//! A dedicated reader thread drains the master and pushes chunks into an
//! unbounded channel, so it never waits on whoever consumes the output.
//! Consumers either take the receiving end directly ([`PtySession::subscribe`])
//! or hand a [`RelaySink`] to [`PtySession::start_read_loop`], which runs the
//! callbacks on a separate delivery thread.

use std::fs::File;
use std::os::fd::AsFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::error::PtyshResult;
use crate::pty::{self, ReadOutcome};
use crate::session::{ChildHandle, PtySession};

/// Upper bound on a single read from the master.
pub const RELAY_CHUNK_SIZE: usize = 8192;

/// Reads performed after the child is seen exiting, to pick up output it
/// left in the pty buffer.
const DRAIN_LIMIT: usize = 64;

/// Events produced by the relay, in pty order. `Closed` is always last
/// and sent exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Output(Vec<u8>),
    Closed,
}

/// The two entry points a transport exposes to the relay.
pub trait RelaySink: Send + 'static {
    /// Called with each non-empty chunk, in order.
    fn deliver(&self, data: Vec<u8>);
    /// Called once after the last `deliver`.
    fn notify_closed(&self);
}

/// A [`RelaySink`] built from two closures.
pub struct FnSink<D, C> {
    deliver: D,
    closed: C,
}

impl<D, C> FnSink<D, C>
where
    D: Fn(Vec<u8>) + Send + 'static,
    C: Fn() + Send + 'static,
{
    pub fn new(deliver: D, closed: C) -> Self {
        Self { deliver, closed }
    }
}

impl<D, C> RelaySink for FnSink<D, C>
where
    D: Fn(Vec<u8>) + Send + 'static,
    C: Fn() + Send + 'static,
{
    fn deliver(&self, data: Vec<u8>) {
        (self.deliver)(data)
    }

    fn notify_closed(&self) {
        (self.closed)()
    }
}

/// Threads behind a running relay. Dropping the handle detaches them.
pub struct RelayHandle {
    reader: JoinHandle<()>,
    delivery: JoinHandle<()>,
}

impl RelayHandle {
    /// Wait until the close notification has been delivered.
    pub fn join(self) {
        let _ = self.reader.join();
        let _ = self.delivery.join();
    }

    pub fn is_finished(&self) -> bool {
        self.reader.is_finished() && self.delivery.is_finished()
    }
}

impl PtySession {
    /// Start the relay and return the event stream.
    ///
    /// The reader thread outlives this call and ends on its own when the
    /// pty reaches end of stream or the child exits.
    pub fn subscribe(&self) -> PtyshResult<UnboundedReceiver<RelayEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.spawn_reader(tx)?;
        Ok(rx)
    }

    /// Start the relay, delivering to `sink` from a separate thread.
    pub fn start_read_loop<S: RelaySink>(&self, sink: S) -> PtyshResult<RelayHandle> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reader = self.spawn_reader(tx)?;

        let delivery = thread::Builder::new()
            .name("ptysh-delivery".into())
            .spawn(move || {
                while let Some(event) = rx.blocking_recv() {
                    match event {
                        RelayEvent::Output(data) => sink.deliver(data),
                        RelayEvent::Closed => break,
                    }
                }
                // Also reached if the reader died without saying goodbye.
                sink.notify_closed();
            })?;

        Ok(RelayHandle { reader, delivery })
    }

    fn spawn_reader(&self, tx: UnboundedSender<RelayEvent>) -> PtyshResult<JoinHandle<()>> {
        let (master, child) = self.claim_reader()?;
        let pid = self.pid();
        let handle = thread::Builder::new()
            .name("ptysh-relay".into())
            .spawn(move || {
                debug!(pid, "relay started");
                read_loop(&master, &child, &tx);
                let _ = tx.send(RelayEvent::Closed);
                info!(pid, "relay finished");
            })?;
        Ok(handle)
    }
}

fn read_loop(master: &Arc<File>, child: &ChildHandle, tx: &UnboundedSender<RelayEvent>) {
    let mut buf = vec![0u8; RELAY_CHUNK_SIZE];
    let mut not_eof = true;

    while not_eof {
        let [ready] = match pty::wait_ready([master.as_fd()]) {
            Ok(ready) => ready,
            Err(e) => {
                debug!(error = %e, "relay poll failed");
                break;
            }
        };

        if ready.readable {
            match pty::read_chunk(master, &mut buf) {
                ReadOutcome::Data(n) => {
                    let _ = tx.send(RelayEvent::Output(buf[..n].to_vec()));
                }
                ReadOutcome::WouldBlock => {}
                ReadOutcome::Eof => not_eof = false,
            }
        }

        if ready.exceptional {
            not_eof = false;
            let _ = child.has_exited();
        }

        if not_eof && child.has_exited() {
            drain(master, &mut buf, tx);
            not_eof = false;
        }
    }
}

fn drain(master: &File, buf: &mut [u8], tx: &UnboundedSender<RelayEvent>) {
    for _ in 0..DRAIN_LIMIT {
        match pty::read_chunk(master, buf) {
            ReadOutcome::Data(n) => {
                let _ = tx.send(RelayEvent::Output(buf[..n].to_vec()));
            }
            ReadOutcome::WouldBlock | ReadOutcome::Eof => return,
        }
    }
}
