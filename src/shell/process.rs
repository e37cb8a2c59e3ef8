//! Process-backed command runner

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{CommandOutput, CommandRunner, ShellCommand};
use crate::CdflowError;

/// Runs commands as child processes via tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn build(command: &ShellCommand) -> Command {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        cmd.envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }
        if command.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }
        cmd
    }

    fn spawn(mut cmd: Command, command: &ShellCommand) -> Result<Child, CdflowError> {
        cmd.spawn()
            .map_err(|e| CdflowError::Command(format!("{}: {}", command.program, e)))
    }

    /// Feed the configured stdin payload and close the pipe
    async fn feed_stdin(child: &mut Child, command: &ShellCommand) -> Result<(), CdflowError> {
        if let (Some(input), Some(mut pipe)) = (&command.stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
            pipe.shutdown().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn output(&self, command: &ShellCommand) -> Result<CommandOutput, CdflowError> {
        debug!("Running command: {}", command);

        let mut cmd = Self::build(command);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = Self::spawn(cmd, command)?;
        Self::feed_stdin(&mut child, command).await?;
        let output = child.wait_with_output().await?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn check(&self, command: &ShellCommand) -> Result<(), CdflowError> {
        debug!("Running command: {}", command);

        let mut child = Self::spawn(Self::build(command), command)?;
        Self::feed_stdin(&mut child, command).await?;
        let status = child.wait().await?;

        if !status.success() {
            warn!(
                "Command exited with status {}: {}",
                status.code().unwrap_or(-1),
                command
            );
            return Err(CdflowError::command_status(command.to_string(), status.code()));
        }

        Ok(())
    }
}
