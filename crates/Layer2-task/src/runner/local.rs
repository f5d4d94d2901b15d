//! Local runner - spawns processes on the host with tokio

use super::{CommandSpec, OutputPipe, ProcessHandle, ProcessRunner};
use async_trait::async_trait;
use relay_foundation::{Error, Result};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// Runs commands directly on the host
#[derive(Debug, Clone, Default)]
pub struct LocalRunner;

impl LocalRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(spec: &CommandSpec) -> Command {
        // npm installs `claude` as a .cmd shim, which only runs through cmd.exe
        let mut cmd = if cfg!(windows) && is_batch_script(&spec.program) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&spec.program);
            cmd
        } else {
            Command::new(&spec.program)
        };

        cmd.args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

fn is_batch_script(program: &str) -> bool {
    let lower = program.to_ascii_lowercase();
    lower.ends_with(".cmd") || lower.ends_with(".bat")
}

#[async_trait]
impl ProcessRunner for LocalRunner {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>> {
        let child = Self::command(spec)
            .spawn()
            .map_err(|e| Error::Process(format!("failed to spawn {}: {}", spec.program, e)))?;
        debug!("Spawned {} (pid {:?})", spec.program, child.id());
        Ok(Box::new(LocalProcess { child }))
    }
}

struct LocalProcess {
    child: Child,
}

#[async_trait]
impl ProcessHandle for LocalProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn stdout(&mut self) -> Option<OutputPipe> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as OutputPipe)
    }

    fn stderr(&mut self) -> Option<OutputPipe> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as OutputPipe)
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    async fn kill(&mut self) -> Result<()> {
        let Some(pid) = self.child.id() else {
            // Already reaped
            return Ok(());
        };
        terminate(pid).await
    }
}

/// Kill the whole process tree; `claude` spawns helpers of its own
#[cfg(windows)]
async fn terminate(pid: u32) -> Result<()> {
    let status = Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/f", "/t"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| Error::Process(format!("failed to run taskkill: {}", e)))?;
    if !status.success() {
        return Err(Error::Process(format!(
            "taskkill exited with {:?} for pid {}",
            status.code(),
            pid
        )));
    }
    Ok(())
}

#[cfg(unix)]
async fn terminate(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| Error::Process(format!("pid {} out of range", pid)))?;
    kill(Pid::from_raw(raw), Signal::SIGTERM)
        .map_err(|e| Error::Process(format!("failed to send SIGTERM to {}: {}", pid, e)))
}
