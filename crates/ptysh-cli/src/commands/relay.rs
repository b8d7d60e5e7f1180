//! `ptysh relay`: drive a session over plain stdin/stdout.
//!
//! Stdin bytes are written to the pty as they arrive. Pty output goes to
//! stdout either raw or as one JSON event per line. The command finishes
//! when the relay reports the session closed; end of stdin only stops
//! forwarding input.

use anyhow::{Context, Result};
use ptysh_core::{PtySession, RelayEvent, SpawnOptions};
use serde::Serialize;
use std::io::Read;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

const STDIN_CHUNK_SIZE: usize = 4096;

/// NDJSON event written in `--json` mode.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireEvent {
    Output { data: String },
    Closed,
}

impl WireEvent {
    /// Output is converted lossily; invalid UTF-8 becomes U+FFFD.
    pub fn from_relay(event: &RelayEvent) -> Self {
        match event {
            RelayEvent::Output(data) => WireEvent::Output {
                data: String::from_utf8_lossy(data).into_owned(),
            },
            RelayEvent::Closed => WireEvent::Closed,
        }
    }
}

pub async fn run(opts: SpawnOptions, json: bool) -> Result<()> {
    let mut session = PtySession::spawn(opts).context("failed to start session")?;
    let mut events = session.subscribe().context("failed to start relay")?;
    info!(pid = session.pid(), argv = ?session.argv(), "relay session started");

    let mut input = spawn_stdin_reader()?;
    let mut input_open = true;
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = event.unwrap_or(RelayEvent::Closed);
                emit(&mut stdout, &event, json).await?;
                if event == RelayEvent::Closed {
                    break;
                }
            }
            data = input.recv(), if input_open => match data {
                Some(data) => session.write(&data),
                None => {
                    debug!("stdin closed");
                    input_open = false;
                }
            },
        }
    }

    session.close();
    if let Ok(Some(status)) = session.try_status() {
        info!(%status, "child exited");
    }
    Ok(())
}

/// Read stdin on a plain thread. A blocking read there never holds up
/// runtime shutdown.
fn spawn_stdin_reader() -> Result<mpsc::Receiver<Vec<u8>>> {
    let (tx, rx) = mpsc::channel(64);
    std::thread::Builder::new()
        .name("ptysh-stdin".into())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = [0u8; STDIN_CHUNK_SIZE];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        debug!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
        })
        .context("failed to spawn stdin reader")?;
    Ok(rx)
}

async fn emit<W: AsyncWrite + Unpin>(out: &mut W, event: &RelayEvent, json: bool) -> Result<()> {
    if json {
        let mut line = serde_json::to_vec(&WireEvent::from_relay(event))?;
        line.push(b'\n');
        out.write_all(&line).await?;
    } else if let RelayEvent::Output(data) = event {
        out.write_all(data).await?;
    }
    out.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_event_json_shape() {
        let out = WireEvent::from_relay(&RelayEvent::Output(b"hi\r\n".to_vec()));
        assert_eq!(
            serde_json::to_string(&out).unwrap(),
            r#"{"type":"output","data":"hi\r\n"}"#
        );
        let closed = WireEvent::from_relay(&RelayEvent::Closed);
        assert_eq!(serde_json::to_string(&closed).unwrap(), r#"{"type":"closed"}"#);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let out = WireEvent::from_relay(&RelayEvent::Output(vec![b'a', 0xff]));
        match out {
            WireEvent::Output { data } => assert_eq!(data, "a\u{fffd}"),
            WireEvent::Closed => panic!("expected output"),
        }
    }

    #[tokio::test]
    async fn raw_mode_writes_bytes_only() {
        let mut out = Vec::new();
        emit(&mut out, &RelayEvent::Output(b"abc".to_vec()), false)
            .await
            .unwrap();
        emit(&mut out, &RelayEvent::Closed, false).await.unwrap();
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn json_mode_writes_one_line_per_event() {
        let mut out = Vec::new();
        emit(&mut out, &RelayEvent::Output(b"x".to_vec()), true)
            .await
            .unwrap();
        emit(&mut out, &RelayEvent::Closed, true).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, [r#"{"type":"output","data":"x"}"#, r#"{"type":"closed"}"#]);
    }
}
