//! Command line for the external coding CLI

use super::CommandSpec;
use crate::task::{Complexity, Task};
use std::path::PathBuf;
use tracing::debug;

/// Executable looked up on `PATH` when nothing else is found
pub const DEFAULT_PROGRAM: &str = "claude";

pub const COMPLETE_MARKER: &str = "<promise>COMPLETE</promise>";
pub const FAILED_MARKER: &str = "<promise>FAILED</promise>";

/// Builds the `claude` invocation for a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudeCommand {
    program: String,
    work_dir: Option<PathBuf>,
}

impl ClaudeCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            work_dir: None,
        }
    }

    /// Use the configured path, else the first install location that exists,
    /// else whatever `PATH` resolves, else the bare name
    pub fn resolve(configured: Option<&str>) -> Self {
        if let Some(program) = configured.map(str::trim).filter(|p| !p.is_empty()) {
            return Self::new(program);
        }

        if let Some(found) = default_locations().into_iter().find(|p| p.is_file()) {
            debug!("Using claude at {}", found.display());
            return Self::new(found.to_string_lossy());
        }

        match which::which(DEFAULT_PROGRAM) {
            Ok(found) => Self::new(found.to_string_lossy()),
            Err(_) => Self::new(DEFAULT_PROGRAM),
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full command line for one attempt at `task`
    pub fn spec_for(&self, task: &Task) -> CommandSpec {
        let mut spec = CommandSpec {
            program: self.program.clone(),
            args: build_args(task),
            envs: vec![("FORCE_COLOR".to_string(), "0".to_string())],
            cwd: None,
        };
        if let Some(dir) = &self.work_dir {
            spec = spec.cwd(dir);
        }
        spec
    }
}

impl Default for ClaudeCommand {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

#[cfg(windows)]
fn default_locations() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(appdata) = std::env::var_os("APPDATA") {
        paths.push(PathBuf::from(appdata).join("npm").join("claude.cmd"));
    }
    if let Some(local) = std::env::var_os("LOCALAPPDATA") {
        paths.push(
            PathBuf::from(local)
                .join("Programs")
                .join("claude")
                .join("claude.exe"),
        );
    }
    paths
}

#[cfg(not(windows))]
fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/usr/local/bin/claude")];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".npm-global").join("bin").join("claude"));
    }
    paths
}

/// `--dangerously-skip-permissions [--permission-mode plan] --print <prompt>`
pub fn build_args(task: &Task) -> Vec<String> {
    let mut args = vec!["--dangerously-skip-permissions".to_string()];
    if task.complexity == Complexity::Complex && task.has_criteria() {
        args.push("--permission-mode".to_string());
        args.push("plan".to_string());
    }
    args.push("--print".to_string());
    args.push(build_prompt(task));
    args
}

pub fn build_prompt(task: &Task) -> String {
    let mut prompt = task.requirement.clone();
    if let Some(criteria) = &task.completion_criteria {
        prompt.push_str("\n\nCompletion criteria: ");
        prompt.push_str(criteria);
        prompt.push_str("\n\nWhen the task is complete, output ");
        prompt.push_str(COMPLETE_MARKER);
        prompt.push_str("\nIf the task fails, output ");
        prompt.push_str(FAILED_MARKER);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::NewTask;
    use std::path::Path;

    fn task(new: NewTask) -> Task {
        Task::from_new(new, 3)
    }

    #[test]
    fn test_plain_prompt() {
        let task = task(NewTask::new("Add a README"));
        assert_eq!(
            build_args(&task),
            vec!["--dangerously-skip-permissions", "--print", "Add a README"]
        );
    }

    #[test]
    fn test_criteria_prompt_adds_markers() {
        let task = task(NewTask::new("Fix the login bug").with_criteria("login test passes"));
        assert_eq!(
            build_prompt(&task),
            "Fix the login bug\n\nCompletion criteria: login test passes\n\n\
             When the task is complete, output <promise>COMPLETE</promise>\n\
             If the task fails, output <promise>FAILED</promise>"
        );
        // Simple tasks never use plan mode
        assert!(!build_args(&task).contains(&"plan".to_string()));
    }

    #[test]
    fn test_complex_with_criteria_uses_plan_mode() {
        let task = task(
            NewTask::new("Migrate the schema")
                .with_criteria("migration applies cleanly")
                .with_complexity(Complexity::Complex),
        );
        let args = build_args(&task);
        assert_eq!(&args[..3], ["--dangerously-skip-permissions", "--permission-mode", "plan"]);
        assert_eq!(args[3], "--print");
    }

    #[test]
    fn test_complex_without_criteria_skips_plan_mode() {
        let task = task(NewTask::new("Explore").with_complexity(Complexity::Complex));
        assert_eq!(build_args(&task).len(), 3);
    }

    #[test]
    fn test_spec_sets_env_and_cwd() {
        let command = ClaudeCommand::new("/opt/claude").with_work_dir("/tmp/project");
        let spec = command.spec_for(&task(NewTask::new("x")));
        assert_eq!(spec.program, "/opt/claude");
        assert_eq!(spec.envs, vec![("FORCE_COLOR".to_string(), "0".to_string())]);
        assert_eq!(spec.cwd.as_deref(), Some(Path::new("/tmp/project")));
    }

    #[test]
    fn test_configured_path_wins() {
        assert_eq!(ClaudeCommand::resolve(Some(" /custom/claude ")).program(), "/custom/claude");
        // Blank configuration falls through to discovery, which always yields something
        assert!(!ClaudeCommand::resolve(Some("  ")).program().is_empty());
    }
}
