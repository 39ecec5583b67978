//! Concurrent relay of a child process's stdout and stderr
//!
//! Both streams are read by their own task while the process runs, so a
//! full pipe never blocks the child. Every line goes to the deployment log,
//! the live observer (if any) and the operational log.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::broadcast::BroadcastRegistry;
use crate::deploy::record::Deployment;
use crate::errors::DockyardError;

/// Marker prepended to every stderr line
pub const ERROR_PREFIX: &str = "ERROR: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Result of a relayed process run
#[derive(Debug)]
pub struct RelayOutput {
    pub status: ExitStatus,
    /// Raw stderr text, one line per row
    pub stderr: String,
}

/// Relay bound to one deployment for one process invocation
pub struct StreamRelay {
    deployment: Arc<Deployment>,
    broadcaster: Arc<BroadcastRegistry>,
    drain_timeout: Duration,
}

impl StreamRelay {
    pub fn new(
        deployment: Arc<Deployment>,
        broadcaster: Arc<BroadcastRegistry>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            deployment,
            broadcaster,
            drain_timeout,
        }
    }

    /// Relay `child`'s output until it exits and both streams are drained.
    ///
    /// A consumer that has not drained within the drain timeout after exit
    /// is aborted; its partial output is already in the deployment log.
    pub async fn run(&self, mut child: Child) -> Result<RelayOutput, DockyardError> {
        let stdout = child.stdout.take().map(|out| self.spawn_consumer(out, Stream::Stdout));
        let stderr = child.stderr.take().map(|err| self.spawn_consumer(err, Stream::Stderr));

        let status = child.wait().await?;

        self.join(stdout, Stream::Stdout).await;
        let stderr = self.join(stderr, Stream::Stderr).await;

        Ok(RelayOutput { status, stderr })
    }

    fn spawn_consumer<R>(&self, reader: R, stream: Stream) -> JoinHandle<String>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(consume(
            reader,
            stream,
            self.deployment.clone(),
            self.broadcaster.clone(),
        ))
    }

    async fn join(&self, task: Option<JoinHandle<String>>, stream: Stream) -> String {
        let Some(mut task) = task else {
            return String::new();
        };

        match tokio::time::timeout(self.drain_timeout, &mut task).await {
            Ok(Ok(diagnostic)) => diagnostic,
            Ok(Err(e)) => {
                error!(deployment_id = %self.deployment.id(), "{:?} consumer failed: {}", stream, e);
                String::new()
            }
            Err(_) => {
                warn!(
                    deployment_id = %self.deployment.id(),
                    "{:?} not drained after {:?}, abandoning",
                    stream,
                    self.drain_timeout
                );
                task.abort();
                String::new()
            }
        }
    }
}

/// Read `reader` line by line until EOF or a read error.
///
/// Returns the accumulated stderr text (empty for stdout).
async fn consume<R>(
    reader: R,
    stream: Stream,
    deployment: Arc<Deployment>,
    broadcaster: Arc<BroadcastRegistry>,
) -> String
where
    R: AsyncRead + Unpin,
{
    let id = deployment.id().to_string();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut diagnostic = String::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(trim_line_ending(&buf)).into_owned();
                match stream {
                    Stream::Stdout => {
                        info!(deployment_id = %id, "{}", line);
                        deployment.append_log(line.clone());
                        broadcaster.publish(&id, &line);
                    }
                    Stream::Stderr => {
                        warn!(deployment_id = %id, "{}", line);
                        diagnostic.push_str(&line);
                        diagnostic.push('\n');
                        let line = format!("{}{}", ERROR_PREFIX, line);
                        deployment.append_log(line.clone());
                        broadcaster.publish(&id, &line);
                    }
                }
            }
            Err(e) => {
                error!(deployment_id = %id, "Error reading {:?}: {}", stream, e);
                break;
            }
        }
    }

    diagnostic
}

fn trim_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}
