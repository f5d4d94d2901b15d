#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_foundation::{Error, Result};
use relay_task::runner::OutputPipe;
use relay_task::{
    ChannelNotifier, ClaudeCommand, CommandSpec, Executor, ExecutorConfig, LifecycleEvent,
    ProcessHandle, ProcessRunner, TaskStore,
};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// What a fake process does when spawned
#[derive(Debug, Clone)]
pub enum Script {
    /// Print, optionally take a while, then exit with `code`
    Exit {
        stdout: Vec<String>,
        stderr: Vec<String>,
        code: Option<i32>,
        delay: Duration,
    },
    /// Print, then run until killed
    Hang { stdout: Vec<String> },
    /// Fail to spawn at all
    SpawnError(String),
}

impl Script {
    pub fn succeed(lines: &[&str]) -> Self {
        Script::Exit {
            stdout: lines.iter().map(|l| l.to_string()).collect(),
            stderr: Vec::new(),
            code: Some(0),
            delay: Duration::ZERO,
        }
    }

    pub fn fail(code: i32, stderr: &[&str]) -> Self {
        Script::Exit {
            stdout: Vec::new(),
            stderr: stderr.iter().map(|l| l.to_string()).collect(),
            code: Some(code),
            delay: Duration::ZERO,
        }
    }

    pub fn exit_with(code: i32, stdout: &[&str]) -> Self {
        Script::Exit {
            stdout: stdout.iter().map(|l| l.to_string()).collect(),
            stderr: Vec::new(),
            code: Some(code),
            delay: Duration::ZERO,
        }
    }

    pub fn hang(stdout: &[&str]) -> Self {
        Script::Hang {
            stdout: stdout.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Hands out scripted processes in order; `fallback` once the queue is empty
pub struct FakeRunner {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    spawned: Mutex<Vec<CommandSpec>>,
    kills: Arc<AtomicUsize>,
}

impl FakeRunner {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self::with_fallback(scripts, Script::succeed(&["ok"]))
    }

    pub fn with_fallback(scripts: Vec<Script>, fallback: Script) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            fallback,
            spawned: Mutex::new(Vec::new()),
            kills: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn spawned(&self) -> Vec<CommandSpec> {
        self.spawned.lock().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().len()
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>> {
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        self.spawned.lock().push(spec.clone());

        let pid = 1000 + self.spawned.lock().len() as u32;
        let process = match script {
            Script::SpawnError(message) => return Err(Error::Process(message)),
            Script::Exit {
                stdout,
                stderr,
                code,
                delay,
            } => FakeProcess::new(pid, &stdout, &stderr, Some((code, delay)), &self.kills),
            Script::Hang { stdout } => FakeProcess::new(pid, &stdout, &[], None, &self.kills),
        };
        Ok(Box::new(process))
    }
}

struct FakeProcess {
    pid: u32,
    stdout: Option<OutputPipe>,
    stderr: Option<OutputPipe>,
    /// `None` hangs until killed
    exit: Option<(Option<i32>, Duration)>,
    killed: Arc<AtomicBool>,
    kill_signal: Arc<Notify>,
    kills: Arc<AtomicUsize>,
}

impl FakeProcess {
    fn new(
        pid: u32,
        stdout: &[String],
        stderr: &[String],
        exit: Option<(Option<i32>, Duration)>,
        kills: &Arc<AtomicUsize>,
    ) -> Self {
        Self {
            pid,
            stdout: Some(pipe(stdout)),
            stderr: Some(pipe(stderr)),
            exit,
            killed: Arc::new(AtomicBool::new(false)),
            kill_signal: Arc::new(Notify::new()),
            kills: Arc::clone(kills),
        }
    }
}

fn pipe(lines: &[String]) -> OutputPipe {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    Box::new(Cursor::new(text.into_bytes()))
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn stdout(&mut self) -> Option<OutputPipe> {
        self.stdout.take()
    }

    fn stderr(&mut self) -> Option<OutputPipe> {
        self.stderr.take()
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        if self.killed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        match self.exit {
            Some((code, delay)) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => Ok(code),
                    _ = self.kill_signal.notified() => Ok(None),
                }
            }
            None => {
                self.kill_signal.notified().await;
                Ok(None)
            }
        }
    }

    async fn kill(&mut self) -> Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.kill_signal.notify_one();
        Ok(())
    }
}

/// Executor settings tuned for tests: no dispatch stagger, short grace
pub fn test_config(parallel: bool, max_parallel: usize) -> ExecutorConfig {
    ExecutorConfig {
        parallel,
        max_parallel,
        task_timeout: Duration::from_secs(10),
        poll_interval: Duration::from_millis(20),
        dispatch_delay: Duration::ZERO,
        kill_grace: Duration::from_millis(200),
        command: ClaudeCommand::new("claude"),
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub store: Arc<TaskStore>,
    pub runner: Arc<FakeRunner>,
    pub executor: Arc<Executor>,
    pub events: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl Harness {
    pub fn new(runner: FakeRunner, config: ExecutorConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::open(dir.path(), 15).unwrap());
        let runner = Arc::new(runner);
        let (notifier, events) = ChannelNotifier::new();
        let executor = Arc::new(Executor::new(
            Arc::clone(&store),
            runner.clone(),
            Arc::new(notifier),
            config,
        ));
        Self {
            dir,
            store,
            runner,
            executor,
            events,
        }
    }

    /// Every notification received so far, as `kind` strings
    pub fn drain_events(&mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn kinds(events: &[LifecycleEvent]) -> Vec<&'static str> {
    events.iter().map(LifecycleEvent::kind).collect()
}

/// Poll `check` until it holds or a second passes
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
