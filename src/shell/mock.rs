//! Recording command runner for testing
//!
//! Records every invocation instead of spawning processes. Outputs and
//! failures are scripted by command-line prefix.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

use super::{CommandOutput, CommandRunner, ShellCommand};
use crate::CdflowError;

/// Command runner that records invocations
///
/// # Example
/// ```
/// use cdflow::shell::mock::RecordingRunner;
/// use cdflow::shell::CommandOutput;
///
/// let runner = RecordingRunner::new()
///     .with_output("git config", CommandOutput::success("git@github.com:org/app.git\n"))
///     .with_failure("docker push");
/// ```
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<ShellCommand>>,
    outputs: Vec<(String, CommandOutput)>,
    failures: Vec<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `output` for commands whose command line starts with `prefix`
    pub fn with_output(mut self, prefix: &str, output: CommandOutput) -> Self {
        self.outputs.push((prefix.to_string(), output));
        self
    }

    /// Fail commands whose command line starts with `prefix`
    pub fn with_failure(mut self, prefix: &str) -> Self {
        self.failures.push(prefix.to_string());
        self
    }

    /// All recorded invocations, in order
    pub fn calls(&self) -> Vec<ShellCommand> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded command lines, in order
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    /// First recorded invocation whose command line starts with `prefix`
    pub fn find(&self, prefix: &str) -> Option<ShellCommand> {
        self.calls()
            .into_iter()
            .find(|c| c.to_string().starts_with(prefix))
    }

    fn record(&self, command: &ShellCommand) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());
    }

    fn scripted_output(&self, line: &str) -> Option<&CommandOutput> {
        self.outputs
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output)
    }

    fn should_fail(&self, line: &str) -> bool {
        self.failures.iter().any(|prefix| line.starts_with(prefix.as_str()))
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn output(&self, command: &ShellCommand) -> Result<CommandOutput, CdflowError> {
        self.record(command);
        let line = command.to_string();

        if let Some(output) = self.scripted_output(&line) {
            return Ok(output.clone());
        }
        if self.should_fail(&line) {
            return Ok(CommandOutput::failure(1, "", "scripted failure"));
        }
        Ok(CommandOutput::success(""))
    }

    async fn check(&self, command: &ShellCommand) -> Result<(), CdflowError> {
        self.record(command);
        let line = command.to_string();

        let failed = self.should_fail(&line)
            || self
                .scripted_output(&line)
                .is_some_and(|output| !output.is_success());
        if failed {
            return Err(CdflowError::command_status(line, Some(1)));
        }
        Ok(())
    }
}
