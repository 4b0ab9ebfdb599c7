use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Captured result of one `arduino-cli` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exited_with_error: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exited_with_error: false,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exited_with_error: true,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// The process never produced an exit status.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {} seconds", .after.as_secs())]
    TimedOut { program: String, after: Duration },
}

/// Arguments for one `arduino-cli` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    /// `arduino-cli compile --fqbn <board> <sketch>`
    pub fn compile(board: &str, sketch_path: &Path, working_dir: &Path) -> Self {
        Self {
            args: vec![
                "compile".to_string(),
                "--fqbn".to_string(),
                board.to_string(),
                sketch_path.display().to_string(),
            ],
            working_dir: Some(working_dir.to_path_buf()),
        }
    }

    /// `arduino-cli board list`
    pub fn board_list() -> Self {
        Self {
            args: vec!["board".to_string(), "list".to_string()],
            working_dir: None,
        }
    }

    /// `arduino-cli upload -p <port> --fqbn <board> <sketch>`
    pub fn upload(port: &str, board: &str, sketch_path: &Path, working_dir: &Path) -> Self {
        Self {
            args: vec![
                "upload".to_string(),
                "-p".to_string(),
                port.to_string(),
                "--fqbn".to_string(),
                board.to_string(),
                sketch_path.display().to_string(),
            ],
            working_dir: Some(working_dir.to_path_buf()),
        }
    }

    /// First argument, e.g. `compile`.
    pub fn subcommand(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }
}

/// Abstraction over running `arduino-cli` for testability.
/// Real implementation: `ArduinoCli`. Test double: `MockRunner`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, RunnerError>;
}

/// Runs the real `arduino-cli` binary.
#[derive(Debug, Clone)]
pub struct ArduinoCli {
    program: String,
    timeout: Option<Duration>,
}

impl ArduinoCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Kill any invocation still running after `limit`.
    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }
}

#[async_trait]
impl CommandRunner for ArduinoCli {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, RunnerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(program = %self.program, args = ?invocation.args, "running arduino-cli");

        let spawn_err = |source: std::io::Error| RunnerError::Spawn {
            program: self.program.clone(),
            source,
        };
        let child = cmd.spawn().map_err(spawn_err)?;

        // Dropping the timed-out future drops the child, which kills it.
        let output = match self.timeout {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| RunnerError::TimedOut {
                    program: self.program.clone(),
                    after: limit,
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(spawn_err)?;

        Ok(ProcessOutput {
            exited_with_error: !output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
