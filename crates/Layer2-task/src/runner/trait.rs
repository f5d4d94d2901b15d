//! Process runner traits

use async_trait::async_trait;
use relay_foundation::Result;
use std::path::PathBuf;
use tokio::io::AsyncRead;

/// Boxed pipe of a spawned process
pub type OutputPipe = Box<dyn AsyncRead + Unpin + Send>;

/// A fully resolved command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment
    pub envs: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// Spawns processes. Implement to swap the host process backend.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &'static str;

    /// Start a process with piped stdout and stderr
    async fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>>;
}

/// A live process owned by exactly one run
#[async_trait]
pub trait ProcessHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// Take the stdout pipe; `None` once taken
    fn stdout(&mut self) -> Option<OutputPipe>;

    /// Take the stderr pipe; `None` once taken
    fn stderr(&mut self) -> Option<OutputPipe>;

    /// Wait for exit. `None` when the process died without an exit code
    /// (killed by a signal).
    async fn wait(&mut self) -> Result<Option<i32>>;

    /// Ask the process (tree) to terminate. Returns once the request is sent,
    /// not when the process has exited.
    async fn kill(&mut self) -> Result<()>;
}
