//! External command execution.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::error::{MigrationError, MigrationResult};

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// One external command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    pub cwd: Option<&'a Path>,
    /// Zero disables the timeout.
    pub timeout_secs: u64,
}

impl<'a> CommandSpec<'a> {
    pub fn new<I, S>(program: &'a str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program,
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            timeout_secs: 0,
        }
    }

    pub fn current_dir(mut self, dir: &'a Path) -> Self {
        self.cwd = Some(dir);
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn rendered_args(&self) -> String {
        self.args.join(" ")
    }

    /// Run and capture output regardless of exit status.
    pub async fn output(&self) -> MigrationResult<CommandOutput> {
        let start = Instant::now();
        debug!(program = self.program, args = %self.rendered_args(), "running command");

        let mut cmd = Command::new(self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.cwd {
            cmd.current_dir(dir);
        }
        let child = cmd.spawn().map_err(|source| MigrationError::Spawn {
            program: self.program.to_string(),
            source,
        })?;

        let output = if self.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| MigrationError::Command {
                program: self.program.to_string(),
                args: self.rendered_args(),
                status: format!("timeout after {}s", self.timeout_secs),
                stderr: String::new(),
            })??
        } else {
            child.wait_with_output().await?
        };

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Run and return stdout; a non-zero exit is an error.
    pub async fn run(&self) -> MigrationResult<String> {
        let out = self.output().await?;
        if !out.success {
            return Err(MigrationError::Command {
                program: self.program.to_string(),
                args: self.rendered_args(),
                status: out.status,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out.stdout)
    }
}
