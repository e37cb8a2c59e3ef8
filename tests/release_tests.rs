//! Integration tests for the release flow

use cdflow::aws::mock::{AwsCall, MockAws};
use cdflow::config::ServiceMetadata;
use cdflow::paths::ProjectPaths;
use cdflow::release::repository_policy;
use cdflow::shell::mock::RecordingRunner;
use cdflow::{Release, ReleaseConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const IMAGE_REPO: &str = "111111111111.dkr.ecr.eu-west-1.amazonaws.com/search-service";

fn config() -> ReleaseConfig {
    ReleaseConfig {
        dev_account_id: "111111111111".to_string(),
        prod_account_id: "222222222222".to_string(),
        aws_region: "eu-west-1".to_string(),
    }
}

fn ci_env() -> HashMap<String, String> {
    HashMap::from([("JOB_NAME".to_string(), "search/release".to_string())])
}

fn release(
    temp: &TempDir,
    metadata_json: &str,
    version: Option<&str>,
    runner: &Arc<RecordingRunner>,
    aws: &MockAws,
) -> Release {
    let metadata = ServiceMetadata::from_json(metadata_json, "search-service").unwrap();
    Release::new(
        config(),
        "search-service",
        version.map(str::to_string),
        metadata,
        runner.clone(),
        Arc::new(aws.clone()),
    )
    .with_paths(ProjectPaths::with_root(temp.path()))
    .with_env(ci_env())
}

#[cfg(unix)]
fn write_hook(temp: &TempDir, name: &str) {
    use std::os::unix::fs::PermissionsExt;

    let path = temp.path().join(name);
    std::fs::write(&path, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

// ==================== Docker Builds ====================

/// Without a version the image is built locally and nothing is pushed
#[tokio::test]
async fn test_release_without_version_builds_only() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let aws = MockAws::new();

    let image = assert_ok!(
        release(&temp, r#"{"TEAM": "search"}"#, None, &runner, &aws)
            .create()
            .await
    );

    assert_eq!(image, format!("{}:dev", IMAGE_REPO));
    assert_eq!(
        runner.command_lines(),
        vec![format!("docker build -t {}:dev .", IMAGE_REPO)]
    );
    assert_eq!(
        runner.calls()[0].current_dir.as_deref(),
        Some(temp.path())
    );
    assert!(aws.calls().is_empty());
}

/// DOCKER_BUILD_DIR changes the build context
#[tokio::test]
async fn test_release_custom_build_dir() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let aws = MockAws::new();

    assert_ok!(
        release(
            &temp,
            r#"{"TEAM": "search", "DOCKER_BUILD_DIR": "app"}"#,
            None,
            &runner,
            &aws
        )
        .create()
        .await
    );

    assert_eq!(
        runner.command_lines(),
        vec![format!("docker build -t {}:dev app", IMAGE_REPO)]
    );
}

/// A failed build aborts before any push
#[tokio::test]
async fn test_release_build_failure_aborts() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new().with_failure("docker build"));
    let aws = MockAws::new();

    assert_err!(
        release(&temp, r#"{"TEAM": "search"}"#, Some("1"), &runner, &aws)
            .create()
            .await
    );

    assert_eq!(runner.calls().len(), 1);
    assert!(aws.calls().is_empty());
}

// ==================== Pushing ====================

/// A versioned release creates the repository, sets its policy, logs in and pushes
#[tokio::test]
async fn test_release_with_version_pushes() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let aws = MockAws::new().with_registry_auth(
        "AWS",
        "registry-password",
        "https://111111111111.dkr.ecr.eu-west-1.amazonaws.com",
    );

    let image = assert_ok!(
        release(&temp, r#"{"TEAM": "search"}"#, Some("7"), &runner, &aws)
            .create()
            .await
    );
    assert_eq!(image, format!("{}:7", IMAGE_REPO));

    assert_eq!(
        aws.calls(),
        vec![
            AwsCall::AssumeRole {
                role_arn: "arn:aws:iam::111111111111:role/admin".to_string(),
                session_name: "search-release".to_string(),
            },
            AwsCall::DescribeRepository("search-service".to_string()),
            AwsCall::CreateRepository("search-service".to_string()),
            AwsCall::SetRepositoryPolicy {
                repository: "search-service".to_string(),
                policy: repository_policy("222222222222"),
            },
            AwsCall::GetAuthorization,
        ]
    );
    assert!(aws.repositories().contains("search-service"));

    assert_eq!(
        runner.command_lines(),
        vec![
            format!("docker build -t {}:7 .", IMAGE_REPO),
            "docker login -u AWS --password-stdin https://111111111111.dkr.ecr.eu-west-1.amazonaws.com"
                .to_string(),
            format!("docker push {}:7", IMAGE_REPO),
        ]
    );

    let login = runner.find("docker login").unwrap();
    assert_eq!(login.stdin.as_deref(), Some(b"registry-password".as_slice()));
    assert!(!login.args.iter().any(|a| a.contains("registry-password")));
}

/// An existing repository is not recreated but still gets the policy
#[tokio::test]
async fn test_release_existing_repository() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let aws = MockAws::new().with_repository("search-service");

    assert_ok!(
        release(&temp, r#"{"TEAM": "search"}"#, Some("7"), &runner, &aws)
            .create()
            .await
    );

    let calls = aws.calls();
    assert!(!calls.iter().any(|c| matches!(c, AwsCall::CreateRepository(_))));
    assert!(calls.iter().any(|c| matches!(c, AwsCall::SetRepositoryPolicy { .. })));
}

/// Repository lookup errors other than "not found" abort the release
#[tokio::test]
async fn test_release_describe_error_propagates() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let aws = MockAws::new().with_describe_error("AccessDeniedException");

    let err = assert_err!(
        release(&temp, r#"{"TEAM": "search"}"#, Some("7"), &runner, &aws)
            .create()
            .await
    );

    assert!(err.to_string().contains("AccessDeniedException"));
    assert!(runner.find("docker push").is_none());
}

/// Pushing needs a session name
#[tokio::test]
async fn test_release_push_requires_session_name() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let aws = MockAws::new();

    let err = assert_err!(
        release(&temp, r#"{"TEAM": "search"}"#, Some("7"), &runner, &aws)
            .with_env(HashMap::new())
            .create()
            .await
    );

    assert!(err.is_user_error());
    assert!(aws.calls().is_empty());
}

// ==================== Hooks ====================

/// Executable hooks run around the build with absolute paths
#[cfg(unix)]
#[tokio::test]
async fn test_release_runs_hooks() {
    let temp = TempDir::new().unwrap();
    write_hook(&temp, "prepare-docker-build");
    write_hook(&temp, "on-docker-build");
    let runner = Arc::new(RecordingRunner::new());
    let aws = MockAws::new();

    assert_ok!(
        release(&temp, r#"{"TEAM": "search"}"#, None, &runner, &aws)
            .create()
            .await
    );

    let root = temp.path().display();
    assert_eq!(
        runner.command_lines(),
        vec![
            format!("{}/prepare-docker-build search-service-dev .", root),
            format!("docker build -t {}:dev .", IMAGE_REPO),
            format!("{}/on-docker-build {}:dev", root, IMAGE_REPO),
        ]
    );
}

/// Hooks that are not executable are ignored
#[tokio::test]
async fn test_release_ignores_plain_hook_files() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("on-docker-build"), "#!/bin/sh\n").unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let aws = MockAws::new();

    assert_ok!(
        release(&temp, r#"{"TEAM": "search"}"#, None, &runner, &aws)
            .create()
            .await
    );

    assert_eq!(runner.calls().len(), 1);
}

/// A failing hook aborts the release
#[cfg(unix)]
#[tokio::test]
async fn test_release_failing_hook_aborts() {
    let temp = TempDir::new().unwrap();
    write_hook(&temp, "prepare-docker-build");
    let hook = temp.path().join("prepare-docker-build");
    let runner = Arc::new(RecordingRunner::new().with_failure(&hook.display().to_string()));
    let aws = MockAws::new();

    assert_err!(
        release(&temp, r#"{"TEAM": "search"}"#, None, &runner, &aws)
            .create()
            .await
    );

    assert!(runner.find("docker build").is_none());
}

// ==================== Slug Builds ====================

/// Slug builds produce target/slug.tgz and build from target/
#[tokio::test]
async fn test_release_slug_build() {
    let temp = TempDir::new().unwrap();
    let slug_dockerfile = temp.path().join("Dockerfile_slug");
    std::fs::write(&slug_dockerfile, "FROM flynn/slugrunner\nADD slug.tgz /app\n").unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let aws = MockAws::new();

    assert_ok!(
        release(
            &temp,
            r#"{"TEAM": "search", "TYPE": "slug", "SLUG_BUILDER_DOCKER_OPTS": "-e BUILDPACK_URL=x"}"#,
            None,
            &runner,
            &aws
        )
        .with_slug_dockerfile(&slug_dockerfile)
        .create()
        .await
    );

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].program, "sh");
    assert!(calls[0].args[1].contains("-e BUILDPACK_URL=x flynn/slugbuilder - > target/slug.tgz"));
    assert_eq!(
        calls[1].to_string(),
        format!("docker build -t {}:dev target", IMAGE_REPO)
    );

    let copied = std::fs::read_to_string(temp.path().join("target/Dockerfile")).unwrap();
    assert!(copied.starts_with("FROM flynn/slugrunner"));
}

/// A missing slug Dockerfile fails the release
#[tokio::test]
async fn test_release_slug_missing_dockerfile() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let aws = MockAws::new();

    assert_err!(
        release(&temp, r#"{"TEAM": "search", "TYPE": "slug"}"#, None, &runner, &aws)
            .with_slug_dockerfile(temp.path().join("missing"))
            .create()
            .await
    );

    assert!(runner.find("docker build").is_none());
}
