//! Component name resolution
//!
//! The component name comes from `--component-name`, then the
//! `COMPONENT_NAME` environment variable, then the name of the git
//! repository (`remote.origin.url`).

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::CdflowError;
use crate::shell::{CommandRunner, ShellCommand};

static REMOTE_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/([^/.]+)(?:\.git)?$").expect("valid remote pattern"));

/// Resolve the component name
pub async fn resolve_component_name(
    option: Option<&str>,
    env: &HashMap<String, String>,
    runner: &dyn CommandRunner,
) -> Result<String, CdflowError> {
    if let Some(name) = option {
        return Ok(name.to_string());
    }

    if let Some(name) = env.get("COMPONENT_NAME") {
        return Ok(name.clone());
    }

    component_name_from_git(runner).await
}

/// Repository name from `git config remote.origin.url`
pub async fn component_name_from_git(runner: &dyn CommandRunner) -> Result<String, CdflowError> {
    let output = runner
        .output(&ShellCommand::new("git").args(["config", "remote.origin.url"]))
        .await?;

    if !output.is_success() {
        if output.stdout.is_empty() {
            return Err(CdflowError::user(format!(
                "could not get component name from name of remote - no remote returned from \"git config remote.origin.url\": {}",
                output.stderr
            )));
        }
        return Err(CdflowError::Command(format!(
            "git returned non-zero exit status - {}",
            output.stderr
        )));
    }

    let name = component_name_from_remote(&output.stdout)?;
    debug!("Component name from git remote: {}", name);
    Ok(name)
}

/// Last path segment of a remote URL without its `.git` suffix
pub fn component_name_from_remote(remote: &str) -> Result<String, CdflowError> {
    REMOTE_NAME_PATTERN
        .captures(remote.trim_end())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            CdflowError::InvalidData(format!(
                "could not get component name from remote \"{}\"",
                remote
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::CommandOutput;
    use crate::shell::mock::RecordingRunner;

    #[test]
    fn test_name_from_remote() {
        assert_eq!(
            component_name_from_remote("git@github.com:org/search-service.git\n").unwrap(),
            "search-service"
        );
        assert_eq!(
            component_name_from_remote("https://github.com/org/website").unwrap(),
            "website"
        );
        assert_eq!(
            component_name_from_remote("ssh://git@host/a/b/c/app.git").unwrap(),
            "app"
        );
    }

    #[test]
    fn test_name_from_remote_no_match() {
        assert!(component_name_from_remote("no-slashes-here").is_err());
        assert!(component_name_from_remote("https://github.com/org/my.app.git").is_err());
    }

    #[tokio::test]
    async fn test_option_wins() {
        let runner = RecordingRunner::new();
        let env = HashMap::from([("COMPONENT_NAME".to_string(), "from-env".to_string())]);

        let name = resolve_component_name(Some("from-arg"), &env, &runner).await.unwrap();
        assert_eq!(name, "from-arg");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_env_before_git() {
        let runner = RecordingRunner::new();
        let env = HashMap::from([("COMPONENT_NAME".to_string(), "from-env".to_string())]);

        let name = resolve_component_name(None, &env, &runner).await.unwrap();
        assert_eq!(name, "from-env");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_to_git() {
        let runner = RecordingRunner::new().with_output(
            "git config remote.origin.url",
            CommandOutput::success("git@github.com:org/alerts-subscriber.git\n"),
        );

        let name = resolve_component_name(None, &HashMap::new(), &runner).await.unwrap();
        assert_eq!(name, "alerts-subscriber");
    }

    #[tokio::test]
    async fn test_no_remote_is_user_error() {
        let runner = RecordingRunner::new().with_output(
            "git config",
            CommandOutput::failure(1, "", "fatal: not a git repository"),
        );

        let err = component_name_from_git(&runner).await.unwrap_err();
        assert!(err.is_user_error());
        assert!(err.to_string().contains("no remote returned"));
        assert!(err.to_string().contains("not a git repository"));
    }

    #[tokio::test]
    async fn test_git_failure_with_output() {
        let runner = RecordingRunner::new()
            .with_output("git config", CommandOutput::failure(2, "partial", "oops"));

        let err = component_name_from_git(&runner).await.unwrap_err();
        assert!(!err.is_user_error());
        assert!(matches!(err, CdflowError::Command(_)));
    }
}
