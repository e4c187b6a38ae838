//! Bounded execution of external tools (linters, comparison tools, git).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use pbl_guardian_domain::SourceFile;
use tokio::process::Command;

use crate::error::{CollaboratorError, CollaboratorResult};

/// Invocation of one external program.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Zero disables the time bound.
    pub timeout_secs: u64,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        ToolCommand {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout_secs: 60,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Captured result of a finished tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a tool to completion and capture its output.
///
/// A non-zero exit is not an error here: several linters exit non-zero
/// when they find issues. Failing to spawn and timing out are errors.
pub async fn run_tool(cmd: &ToolCommand) -> CollaboratorResult<ToolOutput> {
    let start = Instant::now();

    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &cmd.cwd {
        command.current_dir(dir);
    }

    let child = command.spawn().map_err(|e| CollaboratorError::Command {
        program: cmd.program.clone(),
        message: e.to_string(),
    })?;

    let output = if cmd.timeout_secs > 0 {
        tokio::time::timeout(
            Duration::from_secs(cmd.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| CollaboratorError::Timeout {
            secs: cmd.timeout_secs,
        })??
    } else {
        child.wait_with_output().await?
    };

    Ok(ToolOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Run a tool and require exit code 0.
pub async fn run_tool_checked(cmd: &ToolCommand) -> CollaboratorResult<ToolOutput> {
    let output = run_tool(cmd).await?;
    if !output.success() {
        return Err(CollaboratorError::Command {
            program: cmd.program.clone(),
            message: format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
        });
    }
    Ok(output)
}

/// Write files below `root`, creating parent directories.
pub(crate) fn write_files(root: &Path, files: &[SourceFile]) -> std::io::Result<()> {
    for file in files {
        let target = root.join(&file.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, &file.content)?;
    }
    Ok(())
}

/// Scratch directory removed on drop.
pub(crate) struct Scratch(PathBuf);

impl Scratch {
    pub(crate) fn create() -> std::io::Result<Self> {
        let dir = std::env::temp_dir().join(format!("pbl-guardian-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;
        Ok(Scratch(dir))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}
