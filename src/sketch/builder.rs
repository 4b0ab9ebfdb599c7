//! Compile and upload orchestration.
//!
//! Both operations follow the same linear chain and stop at the first
//! failure:
//!
//! ```text
//! compile:  stage ─> arduino-cli compile
//! upload:   stage ─> arduino-cli compile ─> arduino-cli board list
//!                 ─> select port ─> lock port ─> arduino-cli upload
//! ```

use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use super::locks::PortLocks;
use super::ports::{PortSelection, PortSelector};
use super::runner::{ArduinoCli, CommandRunner, Invocation, ProcessOutput, RunnerError};
use super::workspace::{SketchWorkspace, WorkspaceManager};
use crate::config::ServiceConfig;
use crate::errors::{
    BOARD_LIST_FAILED, BuildError, COMPILE_FAILED, MISSING_FIELDS, UPLOAD_FAILED,
    diagnostic_message,
};

/// A validated compile or upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub source_code: String,
    /// Fully qualified board name, e.g. `arduino:avr:uno`
    pub board: String,
}

impl BuildRequest {
    /// Both fields must be present and non-empty.
    pub fn new(source_code: Option<String>, board: Option<String>) -> Result<Self, BuildError> {
        match (source_code, board) {
            (Some(source_code), Some(board)) if !source_code.is_empty() && !board.is_empty() => {
                Ok(Self { source_code, board })
            }
            _ => Err(BuildError::Validation(MISSING_FIELDS.to_string())),
        }
    }
}

/// Successful outcome of a compile or upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub sketch_id: Uuid,
    /// Port flashed; `None` for compile-only requests
    pub port: Option<String>,
    pub output: String,
}

pub struct SketchBuilder {
    runner: Arc<dyn CommandRunner>,
    workspaces: WorkspaceManager,
    selector: PortSelector,
    port_locks: PortLocks,
}

impl SketchBuilder {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        workspaces: WorkspaceManager,
        selector: PortSelector,
    ) -> Self {
        Self {
            runner,
            workspaces,
            selector,
            port_locks: PortLocks::new(),
        }
    }

    /// Wire up the real `arduino-cli` runner from configuration.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let runner = ArduinoCli::new(config.arduino.cli_path.clone())
            .with_timeout(config.command_timeout());
        let workspaces = WorkspaceManager::new(config.temp_root(), config.cleanup_delay())?;
        let selector = PortSelector::with_preferred_boards(config.arduino.preferred_boards.clone());
        Ok(Self::new(Arc::new(runner), workspaces, selector))
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    pub fn port_locks(&self) -> &PortLocks {
        &self.port_locks
    }

    /// Stage the request's source into a fresh workspace.
    pub async fn stage(&self, request: &BuildRequest) -> Result<SketchWorkspace, BuildError> {
        self.workspaces.allocate(&request.source_code).await
    }

    /// Stage and compile. The workspace is released when this returns.
    pub async fn compile(&self, request: &BuildRequest) -> Result<BuildReport, BuildError> {
        let workspace = self.stage(request).await?;
        self.compile_staged(&workspace, &request.board).await
    }

    /// Stage, compile and upload. The workspace is released when this returns.
    pub async fn upload(&self, request: &BuildRequest) -> Result<BuildReport, BuildError> {
        let workspace = self.stage(request).await?;
        self.upload_staged(&workspace, &request.board).await
    }

    /// Compile an already staged sketch. Output is the compiler's stdout.
    pub async fn compile_staged(
        &self,
        workspace: &SketchWorkspace,
        board: &str,
    ) -> Result<BuildReport, BuildError> {
        let output = self.run_compile(workspace, board).await?;
        tracing::info!(sketch_id = %workspace.id(), board, "compiled sketch");
        Ok(BuildReport {
            sketch_id: workspace.id(),
            port: None,
            output,
        })
    }

    /// Compile, find a board, and flash it.
    pub async fn upload_staged(
        &self,
        workspace: &SketchWorkspace,
        board: &str,
    ) -> Result<BuildReport, BuildError> {
        let compile_log = self.run_compile(workspace, board).await?;

        let selection = self.detect_port().await?;
        tracing::info!(
            sketch_id = %workspace.id(),
            port = %selection.port,
            rule = %selection.rule,
            "selected upload port"
        );

        let _port_guard = self.port_locks.acquire(&selection.port).await;
        let invocation = Invocation::upload(
            &selection.port,
            board,
            workspace.sketch_path(),
            workspace.dir(),
        );
        let upload = match self.runner.run(&invocation).await {
            Ok(out) if !out.exited_with_error => out,
            Ok(out) => {
                return Err(BuildError::UploadFailed(diagnostic_message(
                    &out.stderr,
                    &out.stdout,
                    UPLOAD_FAILED,
                )));
            }
            Err(e) => return Err(BuildError::UploadFailed(runner_failure(&e, UPLOAD_FAILED))),
        };

        tracing::info!(sketch_id = %workspace.id(), port = %selection.port, board, "uploaded sketch");
        Ok(BuildReport {
            sketch_id: workspace.id(),
            port: Some(selection.port),
            output: format!(
                "Compilation output:\n{}\n\nUpload output:\n{}",
                compile_log, upload.stdout
            ),
        })
    }

    /// Run `arduino-cli board list` and pick a port from its output.
    pub async fn detect_port(&self) -> Result<PortSelection, BuildError> {
        let listing = self.list_boards().await?;
        self.selector.select(&listing).ok_or_else(|| {
            tracing::warn!("no board matched the port rules");
            BuildError::NoBoardDetected
        })
    }

    async fn run_compile(&self, workspace: &SketchWorkspace, board: &str) -> Result<String, BuildError> {
        let invocation = Invocation::compile(board, workspace.sketch_path(), workspace.dir());
        match self.runner.run(&invocation).await {
            Ok(ProcessOutput {
                exited_with_error: false,
                stdout,
                ..
            }) => Ok(stdout),
            Ok(out) => {
                tracing::info!(sketch_id = %workspace.id(), board, "compilation failed");
                Err(BuildError::CompileFailed(diagnostic_message(
                    &out.stderr,
                    &out.stdout,
                    COMPILE_FAILED,
                )))
            }
            Err(e) => Err(BuildError::CompileFailed(runner_failure(&e, COMPILE_FAILED))),
        }
    }

    async fn list_boards(&self) -> Result<String, BuildError> {
        match self.runner.run(&Invocation::board_list()).await {
            Ok(out) if !out.exited_with_error => {
                tracing::debug!(listing = %out.stdout, "available ports");
                Ok(out.stdout)
            }
            Ok(out) => {
                tracing::warn!(stderr = %out.stderr, "board list exited with an error");
                Err(BuildError::BoardListFailed(BOARD_LIST_FAILED.to_string()))
            }
            Err(e) => Err(BuildError::BoardListFailed(runner_failure(&e, BOARD_LIST_FAILED))),
        }
    }
}

/// Message for an invocation that never produced an exit status.
fn runner_failure(err: &RunnerError, fallback: &str) -> String {
    match err {
        RunnerError::TimedOut { after, .. } => {
            tracing::warn!(error = %err, "arduino-cli killed");
            format!("{} (timed out after {} seconds)", fallback, after.as_secs())
        }
        RunnerError::Spawn { .. } => {
            tracing::error!(error = %err, "arduino-cli could not run");
            fallback.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::NO_BOARD_DETECTED;
    use crate::sketch::runner::mock::{MockRunner, Reply};
    use crate::sketch::workspace::tests::wait_until_removed;
    use std::path::PathBuf;
    use std::time::Duration;

    const UNO_LISTING: &str = "\
Port         Protocol Type              Board Name  FQBN            Core
COM19        serial   Serial Port (USB) Arduino Uno arduino:avr:uno arduino:avr
";

    fn request() -> BuildRequest {
        BuildRequest::new(
            Some("void setup() {}\nvoid loop() {}\n".to_string()),
            Some("arduino:avr:uno".to_string()),
        )
        .unwrap()
    }

    fn builder(runner: Arc<MockRunner>, root: &std::path::Path) -> SketchBuilder {
        let workspaces = WorkspaceManager::new(root, Duration::ZERO).unwrap();
        SketchBuilder::new(runner, workspaces, PortSelector::default())
    }

    fn ok(stdout: &str) -> Reply {
        Reply::Output(ProcessOutput::success(stdout))
    }

    fn failed(stdout: &str, stderr: &str) -> Reply {
        Reply::Output(ProcessOutput::failure(stdout, stderr))
    }

    #[test]
    fn test_request_requires_both_fields() {
        let missing = [
            (None, Some("arduino:avr:uno".to_string())),
            (Some("code".to_string()), None),
            (Some(String::new()), Some("arduino:avr:uno".to_string())),
            (Some("code".to_string()), Some(String::new())),
            (None, None),
        ];
        for (code, board) in missing {
            let err = BuildRequest::new(code, board).unwrap_err();
            assert!(matches!(err, BuildError::Validation(ref m) if m == MISSING_FIELDS));
        }
    }

    #[tokio::test]
    async fn test_compile_success_returns_stdout_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::new().reply("compile", ok("Sketch uses 444 bytes.\n")));
        let report = builder(runner.clone(), tmp.path())
            .compile(&request())
            .await
            .unwrap();

        assert_eq!(report.output, "Sketch uses 444 bytes.\n");
        assert!(report.port.is_none());

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let dir = tmp.path().join(report.sketch_id.to_string());
        let sketch = dir.join(format!("{}.ino", report.sketch_id));
        assert_eq!(
            calls[0].args,
            vec![
                "compile".to_string(),
                "--fqbn".to_string(),
                "arduino:avr:uno".to_string(),
                sketch.display().to_string()
            ]
        );
        assert_eq!(calls[0].working_dir, Some(dir));
    }

    #[tokio::test]
    async fn test_compile_failure_message_preference() {
        let cases = [
            (failed("out", "err"), "err"),
            (failed("out", ""), "out"),
            (failed("", ""), COMPILE_FAILED),
        ];
        for (reply, expected) in cases {
            let tmp = tempfile::tempdir().unwrap();
            let runner = Arc::new(MockRunner::new().reply("compile", reply));
            let err = builder(runner, tmp.path())
                .compile(&request())
                .await
                .unwrap_err();
            assert!(matches!(err, BuildError::CompileFailed(ref m) if m == expected));
        }
    }

    #[tokio::test]
    async fn test_compile_spawn_failure_uses_generic_message() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::new().reply("compile", Reply::SpawnError));
        let err = builder(runner, tmp.path())
            .compile(&request())
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), COMPILE_FAILED);
    }

    #[tokio::test]
    async fn test_upload_success_combines_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            MockRunner::new()
                .reply("compile", ok("compiled"))
                .reply("board", ok(UNO_LISTING))
                .reply("upload", ok("flashed")),
        );
        let report = builder(runner.clone(), tmp.path())
            .upload(&request())
            .await
            .unwrap();

        assert_eq!(report.port.as_deref(), Some("COM19"));
        assert_eq!(
            report.output,
            "Compilation output:\ncompiled\n\nUpload output:\nflashed"
        );
        assert_eq!(runner.subcommands(), vec!["compile", "board", "upload"]);

        let upload = &runner.calls()[2];
        assert_eq!(&upload.args[..5], &["upload", "-p", "COM19", "--fqbn", "arduino:avr:uno"]);
        assert!(upload.working_dir.is_some());
    }

    #[tokio::test]
    async fn test_upload_short_circuits_on_compile_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            MockRunner::new()
                .reply("compile", failed("", "syntax error"))
                .reply("board", ok(UNO_LISTING))
                .reply("upload", ok("flashed")),
        );
        let err = builder(runner.clone(), tmp.path())
            .upload(&request())
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "syntax error");
        assert_eq!(runner.subcommands(), vec!["compile"]);
    }

    #[tokio::test]
    async fn test_upload_board_list_failure() {
        for reply in [failed("", "daemon error"), Reply::SpawnError] {
            let tmp = tempfile::tempdir().unwrap();
            let runner = Arc::new(
                MockRunner::new()
                    .reply("compile", ok("compiled"))
                    .reply("board", reply),
            );
            let err = builder(runner.clone(), tmp.path())
                .upload(&request())
                .await
                .unwrap_err();
            assert_eq!(err.user_message(), BOARD_LIST_FAILED);
            assert_eq!(runner.subcommands(), vec!["compile", "board"]);
        }
    }

    #[tokio::test]
    async fn test_timed_out_step_reports_fallback_with_duration() {
        let cases = [
            ("compile", "Compilation failed (timed out after 7 seconds)", vec!["compile"]),
            (
                "board",
                "Failed to find Arduino boards (timed out after 7 seconds)",
                vec!["compile", "board"],
            ),
            (
                "upload",
                "Upload failed (timed out after 7 seconds)",
                vec!["compile", "board", "upload"],
            ),
        ];
        for (step, expected, ran) in cases {
            let tmp = tempfile::tempdir().unwrap();
            let mut runner = MockRunner::new();
            for (subcommand, reply) in [
                ("compile", ok("compiled")),
                ("board", ok(UNO_LISTING)),
                ("upload", ok("flashed")),
            ] {
                let reply = if subcommand == step {
                    Reply::TimedOut(7)
                } else {
                    reply
                };
                runner = runner.reply(subcommand, reply);
            }
            let runner = Arc::new(runner);

            let err = builder(runner.clone(), tmp.path())
                .upload(&request())
                .await
                .unwrap_err();
            assert_eq!(err.user_message(), expected, "step: {}", step);
            assert_eq!(err.status_code(), axum::http::StatusCode::OK);
            assert_eq!(runner.subcommands(), ran);
        }
    }

    #[tokio::test]
    async fn test_detect_port_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::new().reply("board", Reply::TimedOut(30)));
        let err = builder(runner, tmp.path()).detect_port().await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::BoardListFailed(ref m)
                if m == "Failed to find Arduino boards (timed out after 30 seconds)"
        ));
    }

    #[tokio::test]
    async fn test_upload_without_board_never_flashes() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            MockRunner::new()
                .reply("compile", ok("compiled"))
                .reply("board", ok("No boards found.\n"))
                .reply("upload", ok("flashed")),
        );
        let err = builder(runner.clone(), tmp.path())
            .upload(&request())
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::NoBoardDetected));
        assert_eq!(err.user_message(), NO_BOARD_DETECTED);
        assert_eq!(runner.subcommands(), vec!["compile", "board"]);
    }

    #[tokio::test]
    async fn test_upload_uses_serial_fallback_port() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            MockRunner::new()
                .reply("compile", ok(""))
                .reply("board", ok("/dev/ttyACM0 Serial Port (serial)\n"))
                .reply("upload", ok("")),
        );
        let report = builder(runner.clone(), tmp.path())
            .upload(&request())
            .await
            .unwrap();
        assert_eq!(report.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(runner.calls()[2].args[2], "/dev/ttyACM0");
    }

    #[tokio::test]
    async fn test_upload_failure_message_preference() {
        let cases = [
            (failed("out", "avrdude: stk500_recv()"), "avrdude: stk500_recv()"),
            (failed("out", ""), "out"),
            (failed("", ""), UPLOAD_FAILED),
            (Reply::SpawnError, UPLOAD_FAILED),
        ];
        for (reply, expected) in cases {
            let tmp = tempfile::tempdir().unwrap();
            let runner = Arc::new(
                MockRunner::new()
                    .reply("compile", ok("compiled"))
                    .reply("board", ok(UNO_LISTING))
                    .reply("upload", reply),
            );
            let err = builder(runner, tmp.path())
                .upload(&request())
                .await
                .unwrap_err();
            assert!(matches!(err, BuildError::UploadFailed(ref m) if m == expected));
        }
    }

    #[tokio::test]
    async fn test_workspace_removed_after_success_and_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            MockRunner::new()
                .reply("compile", ok("first"))
                .reply("compile", failed("", "second fails")),
        );
        let builder = builder(runner, tmp.path());

        let report = builder.compile(&request()).await.unwrap();
        let dir: PathBuf = tmp.path().join(report.sketch_id.to_string());
        assert!(wait_until_removed(&dir, Duration::from_secs(2)).await);

        assert!(builder.compile(&request()).await.is_err());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_identical_requests_get_independent_workspaces() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            MockRunner::new()
                .with_delay(Duration::from_millis(20))
                .reply("compile", ok("done")),
        );
        let builder = builder(runner.clone(), tmp.path());
        let req = request();

        let (a, b) = tokio::join!(builder.compile(&req), builder.compile(&req));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.sketch_id, b.sketch_id);

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].working_dir, calls[1].working_dir);
        assert_ne!(calls[0].args[3], calls[1].args[3]);
    }

    #[tokio::test]
    async fn test_uploads_to_same_port_are_serialized() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            MockRunner::new()
                .reply("compile", ok("compiled"))
                .reply("board", ok(UNO_LISTING))
                .reply("upload", ok("flashed")),
        );
        let builder = Arc::new(builder(runner, tmp.path()));

        // Hold the port so both uploads queue behind it.
        let guard = builder.port_locks().acquire("COM19").await;
        let b1 = builder.clone();
        let first = tokio::spawn(async move { b1.upload(&request()).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!first.is_finished());

        drop(guard);
        let report = tokio::time::timeout(Duration::from_secs(2), first)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(report.port.as_deref(), Some("COM19"));
    }

    #[tokio::test]
    async fn test_detect_port_without_workspace() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::new().reply("board", ok(UNO_LISTING)));
        let selection = builder(runner.clone(), tmp.path())
            .detect_port()
            .await
            .unwrap();
        assert_eq!(selection.port, "COM19");
        assert_eq!(selection.rule, "Arduino Uno");
        assert_eq!(runner.subcommands(), vec!["board"]);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
