//! One attempt at a task: spawn, stream output, wait, judge

use super::outcome::{OutputCapture, RunOutcome};
use super::registry::{KillReason, ProcessRegistry};
use super::{CommandSpec, OutputPipe, ProcessHandle, ProcessRunner};
use crate::output::{OutputRegistry, OutputStream};
use crate::task::TaskId;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long a killed process gets to exit before its handle is dropped
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// How long to wait for pipes to drain after the process has exited
const READER_DRAIN: Duration = Duration::from_secs(2);

/// Runs single attempts and keeps the shared registries up to date
#[derive(Clone)]
pub struct ProcessRun {
    runner: Arc<dyn ProcessRunner>,
    processes: ProcessRegistry,
    output: OutputRegistry,
    timeout: Duration,
    kill_grace: Duration,
}

enum Ended {
    Exited(relay_foundation::Result<Option<i32>>),
    TimedOut,
    Killed(KillReason),
}

impl ProcessRun {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        processes: ProcessRegistry,
        output: OutputRegistry,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            processes,
            output,
            timeout,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Run `spec` for task `id` to a terminal outcome.
    ///
    /// `kill_rx` comes from [`ProcessRegistry::register`]; the entry is
    /// removed again before this returns.
    pub async fn run(
        &self,
        id: &TaskId,
        spec: &CommandSpec,
        mut kill_rx: oneshot::Receiver<KillReason>,
    ) -> RunOutcome {
        self.output.open(id).await;
        let outcome = self.attempt(id, spec, &mut kill_rx).await;
        self.processes.unregister(id).await;
        self.output.close(id).await;
        debug!("Task {} attempt ended: {}", id, outcome.label());
        outcome
    }

    async fn attempt(
        &self,
        id: &TaskId,
        spec: &CommandSpec,
        kill_rx: &mut oneshot::Receiver<KillReason>,
    ) -> RunOutcome {
        // Killed between dispatch and spawn
        if let Ok(reason) = kill_rx.try_recv() {
            return killed_outcome(reason);
        }

        debug!(
            "Spawning task {} with the {} runner: {}",
            id,
            self.runner.name(),
            spec.program
        );
        let mut process = match self.runner.spawn(spec).await {
            Ok(process) => process,
            Err(e) => {
                warn!("Task {} failed to start: {}", id, e);
                return RunOutcome::Failure {
                    output: String::new(),
                    reason: e.to_string(),
                };
            }
        };
        self.processes.set_pid(id, process.pid()).await;

        let capture = Arc::new(Mutex::new(OutputCapture::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(pipe) = process.stdout() {
            readers.push(self.pump(id, pipe, OutputStream::Stdout, &capture));
        }
        if let Some(pipe) = process.stderr() {
            readers.push(self.pump(id, pipe, OutputStream::Stderr, &capture));
        }

        let ended = tokio::select! {
            status = process.wait() => Ended::Exited(status),
            _ = tokio::time::sleep(self.timeout) => Ended::TimedOut,
            Ok(reason) = &mut *kill_rx => Ended::Killed(reason),
        };

        match ended {
            Ended::Exited(Ok(code)) => {
                drain(readers).await;
                let capture = std::mem::take(&mut *capture.lock());
                capture.into_outcome(code)
            }
            Ended::Exited(Err(e)) => {
                drain(readers).await;
                RunOutcome::Failure {
                    output: std::mem::take(&mut *capture.lock()).into_output(),
                    reason: e.to_string(),
                }
            }
            Ended::TimedOut => {
                warn!(
                    "Task {} timed out after {:.0}s, killing process",
                    id,
                    self.timeout.as_secs_f64()
                );
                self.terminate(id, process).await;
                drain(readers).await;
                RunOutcome::TimedOut {
                    output: std::mem::take(&mut *capture.lock()).into_output(),
                }
            }
            Ended::Killed(reason) => {
                self.terminate(id, process).await;
                drain(readers).await;
                killed_outcome(reason)
            }
        }
    }

    /// Best effort: ask nicely, give it the grace period, then drop the
    /// handle (which force-kills on drop)
    async fn terminate(&self, id: &TaskId, mut process: Box<dyn ProcessHandle>) {
        if let Err(e) = process.kill().await {
            warn!("Failed to kill process of task {}: {}", id, e);
        }
        if tokio::time::timeout(self.kill_grace, process.wait())
            .await
            .is_err()
        {
            warn!(
                "Process of task {} still alive after {:.0}s, forcing",
                id,
                self.kill_grace.as_secs_f64()
            );
        }
    }

    fn pump(
        &self,
        id: &TaskId,
        pipe: OutputPipe,
        stream: OutputStream,
        capture: &Arc<Mutex<OutputCapture>>,
    ) -> JoinHandle<()> {
        let id = id.clone();
        let capture = Arc::clone(capture);
        let output = self.output.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(pipe);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&buf);
                        let line = text.trim_end_matches(['\r', '\n']);
                        capture.lock().push_line(stream, line);
                        output.push_line(&id, line).await;
                    }
                    Err(e) => {
                        debug!("Task {} {} read error: {}", id, stream.as_str(), e);
                        break;
                    }
                }
            }
        })
    }
}

fn killed_outcome(reason: KillReason) -> RunOutcome {
    match reason {
        KillReason::Cancelled => RunOutcome::Cancelled,
        KillReason::Shutdown => RunOutcome::Interrupted,
    }
}

/// Wait for the pipe readers; a grandchild holding a pipe open must not
/// stall the run
async fn drain(mut readers: Vec<JoinHandle<()>>) {
    let finished = tokio::time::timeout(READER_DRAIN, join_all(readers.iter_mut())).await;
    if finished.is_err() {
        for reader in &readers {
            reader.abort();
        }
    }
}
