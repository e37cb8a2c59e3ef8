//! Release - build the service image and push it to ECR
//!
//! Without a version the image is only built locally (tagged `dev`). With a
//! version it is pushed to the component's repository in the dev account,
//! which the prod account is allowed to pull from.

use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use crate::aws::{Ecr, RoleAssumer};
use crate::config::{BuildType, PlatformConfig, ServiceMetadata};
use crate::paths::{ProjectPaths, SLUG_DOCKERFILE};
use crate::shell::{CommandRunner, ShellCommand, is_executable};
use crate::{CdflowError, naming};

/// Hook run before `docker build` with `<component>-<version> <build dir>`
pub const PREPARE_HOOK: &str = "prepare-docker-build";

/// Hook run after `docker build` with the image name
pub const BUILT_HOOK: &str = "on-docker-build";

/// Top-level entries never shipped in a slug
const SLUG_EXCLUDES: [&str; 5] = [".git", "build", "target", "infrastructure", "node_modules"];

/// Image that turns a source tarball into a slug
const SLUG_BUILDER_IMAGE: &str = "flynn/slugbuilder";

/// Accounts and region a release is published to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseConfig {
    pub dev_account_id: String,
    pub prod_account_id: String,
    pub aws_region: String,
}

impl ReleaseConfig {
    pub fn from_platform(platform: &PlatformConfig, region: &str) -> Self {
        Self {
            dev_account_id: platform.account_id(false).to_string(),
            prod_account_id: platform.account_id(true).to_string(),
            aws_region: region.to_string(),
        }
    }
}

/// ECR policy letting the prod account pull images
pub fn repository_policy(prod_account_id: &str) -> String {
    json!({
        "Version": "2008-10-17",
        "Statement": [{
            "Sid": "allow production",
            "Effect": "Allow",
            "Principal": { "AWS": naming::account_root_arn(prod_account_id) },
            "Action": [
                "ecr:GetDownloadUrlForLayer",
                "ecr:BatchGetImage",
                "ecr:BatchCheckLayerAvailability"
            ]
        }]
    })
    .to_string()
}

/// Top-level entries of the project shipped in a slug, one per line
fn slug_source_listing() -> String {
    let excludes: String = SLUG_EXCLUDES
        .iter()
        .map(|name| format!(" -e '{}'", name))
        .collect();
    format!("ls -A | grep -v -x -F{}", excludes)
}

/// Shell pipeline that builds `target/slug.tgz` from the project tree
fn slug_build_script(docker_opts: &str) -> String {
    let mut docker_run = vec![
        "docker run -v /tmp/cache:/tmp/cache:rw --rm -i -a stdin -a stdout -a stderr",
    ];
    if !docker_opts.trim().is_empty() {
        docker_run.push(docker_opts.trim());
    }
    docker_run.push(SLUG_BUILDER_IMAGE);

    format!(
        "tar -cf - $({}) | {} - > target/slug.tgz",
        slug_source_listing(),
        docker_run.join(" ")
    )
}

/// Manages the creation of a release
pub struct Release {
    config: ReleaseConfig,
    component_name: String,
    version: Option<String>,
    metadata: ServiceMetadata,
    paths: ProjectPaths,
    runner: Arc<dyn CommandRunner>,
    aws: Arc<dyn RoleAssumer>,
    env: HashMap<String, String>,
    slug_dockerfile: PathBuf,
}

impl Release {
    pub fn new(
        config: ReleaseConfig,
        component_name: impl Into<String>,
        version: Option<String>,
        metadata: ServiceMetadata,
        runner: Arc<dyn CommandRunner>,
        aws: Arc<dyn RoleAssumer>,
    ) -> Self {
        Self {
            config,
            component_name: component_name.into(),
            version,
            metadata,
            paths: ProjectPaths::new(),
            runner,
            aws,
            env: HashMap::new(),
            slug_dockerfile: PathBuf::from(SLUG_DOCKERFILE),
        }
    }

    /// Use custom project paths
    pub fn with_paths(mut self, paths: ProjectPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Environment used for the assumed role's session name
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Dockerfile copied next to the slug (default: /infra/Dockerfile_slug)
    pub fn with_slug_dockerfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.slug_dockerfile = path.into();
        self
    }

    /// Name the image is built and pushed as
    pub fn image_name(&self) -> String {
        naming::ecr_image_name(
            &self.config.dev_account_id,
            &self.config.aws_region,
            &self.component_name,
            self.version.as_deref(),
        )
    }

    /// Build (and for versioned releases push) the image, returning its name
    pub async fn create(&self) -> Result<String, CdflowError> {
        let image = self.image_name();

        let build_dir = match self.metadata.build_type {
            BuildType::Slug => self.build_slug().await?,
            BuildType::Docker => self.metadata.docker_build_dir.clone(),
        };

        let prepare_hook = self.paths.hook(PREPARE_HOOK);
        if is_executable(&prepare_hook) {
            let tag = format!(
                "{}-{}",
                self.component_name,
                self.version.as_deref().unwrap_or(naming::DEV_TAG)
            );
            let command = self
                .in_project(ShellCommand::new(prepare_hook.display().to_string()))
                .args([tag, build_dir.clone()]);
            info!("Running {}", command);
            self.runner.check(&command).await?;
        }

        info!("Building docker image {}", image);
        self.runner
            .check(
                &self.in_project(ShellCommand::new("docker"))
                    .args(["build", "-t", image.as_str(), build_dir.as_str()]),
            )
            .await?;
        info!("Image {} successfully built", image);

        let built_hook = self.paths.hook(BUILT_HOOK);
        if is_executable(&built_hook) {
            let command = self
                .in_project(ShellCommand::new(built_hook.display().to_string()))
                .arg(image.as_str());
            info!("Running {}", command);
            self.runner.check(&command).await?;
        }

        if self.version.is_some() {
            self.push(&image).await?;
        } else {
            info!("No version supplied, push skipped");
        }

        info!("Done");
        Ok(image)
    }

    fn in_project(&self, command: ShellCommand) -> ShellCommand {
        command.current_dir(&self.paths.root)
    }

    /// Build `target/slug.tgz` and its Dockerfile, returning the build dir
    async fn build_slug(&self) -> Result<String, CdflowError> {
        info!("Building slug");
        fs::create_dir_all(self.paths.target_dir()).await?;

        let script = slug_build_script(&self.metadata.slug_builder_docker_opts);
        self.runner
            .check(&self.in_project(ShellCommand::shell(script)))
            .await?;

        debug!(
            "Copying {} to {}",
            self.slug_dockerfile.display(),
            self.paths.slug_dockerfile().display()
        );
        fs::copy(&self.slug_dockerfile, self.paths.slug_dockerfile()).await?;

        Ok("target".to_string())
    }

    async fn push(&self, image: &str) -> Result<(), CdflowError> {
        let session_name = naming::role_session_name(&self.env)?;
        let role = self
            .aws
            .assume_admin_role(&self.config.dev_account_id, &session_name)
            .await?;

        self.ensure_repository(role.ecr.as_ref()).await?;

        info!("Logging into ECR");
        for auth in role.ecr.authorization().await? {
            self.runner
                .check(
                    &ShellCommand::new("docker")
                        .args([
                            "login",
                            "-u",
                            auth.username.as_str(),
                            "--password-stdin",
                            auth.proxy_endpoint.as_str(),
                        ])
                        .stdin(auth.password.clone()),
                )
                .await?;
        }

        info!("Pushing image {}", image);
        self.runner
            .check(&ShellCommand::new("docker").args(["push", image]))
            .await
    }

    /// Create the repository if missing and grant the prod account pull access
    async fn ensure_repository(&self, ecr: &dyn Ecr) -> Result<(), CdflowError> {
        info!("Checking ECR repository {}", self.component_name);

        if !ecr.repository_exists(&self.component_name).await? {
            info!("Creating ECR repository {}", self.component_name);
            ecr.create_repository(&self.component_name).await?;
        }

        ecr.set_repository_policy(
            &self.component_name,
            &repository_policy(&self.config.prod_account_id),
        )
        .await
    }
}
