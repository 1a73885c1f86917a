//! Forwarding of child stdout/stderr into the log buffer

use crate::error::SupervisorError;
use crate::host::StreamSource;
use crate::log_buffer::LogBuffer;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Which output stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamTag {
    #[serde(rename = "OUT")]
    Out,
    #[serde(rename = "ERR")]
    Err,
}

impl StreamTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamTag::Out => "OUT",
            StreamTag::Err => "ERR",
        }
    }
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read `source` line by line into `log` until EOF, a read error, or shutdown.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD; they never end the stream.
pub async fn drain_stream(
    source: StreamSource,
    tag: StreamTag,
    log: Arc<LogBuffer>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut reader = BufReader::new(source);
    // Partial reads stay in `buf` if a shutdown change wins the select
    let mut buf = Vec::new();
    // Once the owner lets go of the sender, read on until EOF
    let mut interruptible = true;

    if *shutdown_rx.borrow() {
        return;
    }

    loop {
        tokio::select! {
            changed = shutdown_rx.changed(), if interruptible => {
                match changed {
                    Ok(()) if *shutdown_rx.borrow() => {
                        debug!(stream = %tag, "Drainer interrupted");
                        break;
                    }
                    Ok(()) => {}
                    Err(_) => interruptible = false,
                }
            }
            read = reader.read_until(b'\n', &mut buf) => {
                match read {
                    Ok(0) => {
                        if !buf.is_empty() {
                            push_line(&log, tag, &buf);
                        }
                        debug!(stream = %tag, "Stream reached end of file");
                        break;
                    }
                    Ok(_) => {
                        push_line(&log, tag, &buf);
                        buf.clear();
                    }
                    Err(e) => {
                        let err = SupervisorError::StreamRead { stream: tag, source: e };
                        warn!(stream = %tag, error = %err, "Error reading child output");
                        log.push(err.log_line());
                        break;
                    }
                }
            }
        }
    }
}

fn push_line(log: &LogBuffer, tag: StreamTag, raw: &[u8]) {
    let line = decode_line(raw);
    debug!(target: "frp", stream = %tag, "{}", line);
    log.push(format!("[{}] {}", tag, line));
}

/// Strip the line terminator (`\n` or `\r\n`) and decode lossily
fn decode_line(raw: &[u8]) -> String {
    let mut line = raw;
    if let Some(rest) = line.strip_suffix(b"\n") {
        line = rest;
    }
    if let Some(rest) = line.strip_suffix(b"\r") {
        line = rest;
    }
    String::from_utf8_lossy(line).into_owned()
}

/// The pair of drainer tasks attached to one child
pub struct Drainers {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drainers {
    /// Spawn one drainer per stream
    pub fn spawn(stdout: StreamSource, stderr: StreamSource, log: Arc<LogBuffer>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(drain_stream(
                stdout,
                StreamTag::Out,
                Arc::clone(&log),
                shutdown_rx.clone(),
            )),
            tokio::spawn(drain_stream(stderr, StreamTag::Err, log, shutdown_rx)),
        ];
        Self { shutdown_tx, tasks }
    }

    /// Ask both drainers to stop reading
    pub fn interrupt(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|task| task.is_finished())
    }

    /// Wait up to `timeout` for both drainers, aborting any that are still running.
    ///
    /// Returns `true` if both finished on their own.
    pub async fn join(self, timeout: Duration) -> bool {
        let Drainers { shutdown_tx, tasks } = self;
        let aborts: Vec<_> = tasks.iter().map(|task| task.abort_handle()).collect();

        let joined = tokio::time::timeout(timeout, futures::future::join_all(tasks))
            .await
            .is_ok();
        if !joined {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Drainers did not finish in time, aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }
        drop(shutdown_tx);
        joined
    }
}
