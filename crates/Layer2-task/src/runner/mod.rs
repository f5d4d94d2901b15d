//! Process runner
//!
//! - `ProcessRunner` / `ProcessHandle` - the spawning seam (`LocalRunner` on
//!   the host, fakes in tests)
//! - `ClaudeCommand` - argument list and prompt for the coding CLI
//! - `ProcessRun` - one attempt: stream output, enforce the timeout, honour
//!   kill requests, judge the result
//! - `ProcessRegistry` - live processes by task id

pub mod command;
pub mod local;
pub mod outcome;
pub mod registry;
pub mod run;
pub mod r#trait;

pub use command::{ClaudeCommand, COMPLETE_MARKER, FAILED_MARKER};
pub use local::LocalRunner;
pub use outcome::{OutputCapture, RunOutcome, ERROR_TAIL_CHARS, TIMEOUT_ERROR};
pub use r#trait::{CommandSpec, OutputPipe, ProcessHandle, ProcessRunner};
pub use registry::{KillReason, ProcessRegistry, RunningProcess};
pub use run::{ProcessRun, DEFAULT_KILL_GRACE};
