//! Error types for cdflow

use thiserror::Error;

/// Main error type for cdflow operations
#[derive(Error, Debug)]
pub enum CdflowError {
    /// Problems the user can fix in their project (missing files, bad
    /// metadata, missing variables). Reported without a backtrace-style prefix.
    #[error("{0}")]
    User(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Command execution failed: {0}")]
    Command(String),

    #[error("Command '{command}' exited with status {status}")]
    CommandStatus { command: String, status: i32 },

    #[error("AWS error: {0}")]
    Aws(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl CdflowError {
    /// Create a user error
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    /// Create an error for a command that exited unsuccessfully
    pub fn command_status(command: impl Into<String>, status: Option<i32>) -> Self {
        Self::CommandStatus {
            command: command.into(),
            status: status.unwrap_or(-1),
        }
    }

    /// Whether this error was caused by the user's project setup
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_display_is_bare_message() {
        let err = CdflowError::user("service.json not found");
        assert_eq!(err.to_string(), "service.json not found");
        assert!(err.is_user_error());
    }

    #[test]
    fn test_command_status_without_code() {
        let err = CdflowError::command_status("docker push", None);
        assert_eq!(err.to_string(), "Command 'docker push' exited with status -1");
        assert!(!err.is_user_error());
    }
}
