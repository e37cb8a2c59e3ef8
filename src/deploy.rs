//! Deploy - roll a released image out to an environment
//!
//! Runs `terragrunt plan` and `terragrunt apply` against the project's
//! `infra/` directory, with remote state in the target account's state
//! bucket and the account's admin role credentials in the environment.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::aws::{Credentials, ObjectStore, RoleAssumer};
use crate::config::{PlatformConfig, ServiceMetadata};
use crate::paths::{INFRA_DIR, ProjectPaths, remove_generated};
use crate::shell::{CommandRunner, ShellCommand};
use crate::template::{BackendConfig, write_terragrunt_config};
use crate::{CdflowError, naming};

/// Environments deployed into the prod account
const PROD_ENVIRONMENTS: [&str; 2] = ["live", "debug"];

/// The one environment served from the production cluster and top-level zone
const LIVE: &str = "live";

/// Manages the process of deployment
pub struct Deployment {
    environment: String,
    version: String,
    component_name: String,
    leg: Option<String>,
    metadata: ServiceMetadata,
    platform: PlatformConfig,
    paths: ProjectPaths,
    runner: Arc<dyn CommandRunner>,
    aws: Arc<dyn RoleAssumer>,
    env: HashMap<String, String>,
}

impl Deployment {
    pub fn new(
        environment: impl Into<String>,
        version: impl Into<String>,
        component_name: impl Into<String>,
        metadata: ServiceMetadata,
        platform: PlatformConfig,
        runner: Arc<dyn CommandRunner>,
        aws: Arc<dyn RoleAssumer>,
    ) -> Self {
        Self {
            environment: environment.into(),
            version: version.into(),
            component_name: component_name.into(),
            leg: None,
            metadata,
            platform,
            paths: ProjectPaths::new(),
            runner,
            aws,
            env: HashMap::new(),
        }
    }

    /// Deploy a parallel copy of the service named `<component>-<leg>`
    pub fn with_leg(mut self, leg: Option<String>) -> Self {
        self.leg = leg;
        self
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

    /// Whether the prod account is used
    pub fn prod(&self) -> bool {
        PROD_ENVIRONMENTS.contains(&self.environment.as_str())
    }

    /// Account identifier, e.g. `mmgprod`
    pub fn account(&self) -> String {
        let suffix = if self.prod() { "prod" } else { "dev" };
        format!("{}{}", self.metadata.account_prefix, suffix)
    }

    /// ECS cluster the service runs in
    pub fn cluster(&self) -> &str {
        if self.environment == LIVE {
            self.metadata
                .production_cluster
                .as_deref()
                .unwrap_or("production")
        } else {
            self.metadata
                .non_production_cluster
                .as_deref()
                .unwrap_or("non-production")
        }
    }

    /// DNS zone, e.g. `dev.mmgapi.net.`
    pub fn dns_zone(&self) -> Result<String, CdflowError> {
        let domain = self
            .metadata
            .domain
            .as_deref()
            .ok_or_else(|| CdflowError::user("cannot infer dns zone when DOMAIN set to null"))?;

        let prefix = if self.environment == LIVE { "" } else { "dev." };
        Ok(format!("{}{}.", prefix, domain))
    }

    /// Hostname of the service in this environment
    pub fn hostname(&self) -> Result<String, CdflowError> {
        let zone = self.dns_zone()?;
        let dns_name = self.metadata.dns_name.as_deref().unwrap_or(&self.component_name);

        if self.environment == LIVE {
            Ok(format!("{}.{}", dns_name, zone))
        } else {
            Ok(format!("{}-{}.{}", self.environment, dns_name, zone))
        }
    }

    /// Name the service is deployed under
    pub fn service_name(&self) -> String {
        match &self.leg {
            Some(leg) => format!("{}-{}", self.component_name, leg),
            None => self.component_name.clone(),
        }
    }

    /// Released image being deployed
    pub fn image_name(&self) -> String {
        naming::container_image_name(
            &self.platform.ecr_registry(&self.metadata.region),
            &self.component_name,
            Some(self.version.as_str()),
        )
    }

    /// Run the deployment
    pub async fn run(&self) -> Result<(), CdflowError> {
        info!(
            "Deploying {} version {} to {}",
            self.service_name(),
            self.version,
            self.environment
        );
        match self.hostname() {
            Ok(hostname) => info!(
                "Target {} in cluster {} ({})",
                hostname,
                self.cluster(),
                self.account()
            ),
            Err(e) => debug!("No hostname for deployment: {}", e),
        }

        let session_name = naming::role_session_name(&self.env)?;
        let role = self
            .aws
            .assume_admin_role(self.platform.account_id(self.prod()), &session_name)
            .await?;
        let account_id = role.sts.caller_account().await?;

        let backend = BackendConfig::new(
            &account_id,
            &self.environment,
            &self.service_name(),
            &self.metadata.region,
        );

        info!("Preparing S3 bucket for terragrunt");
        self.prepare_state_bucket(role.s3.as_ref(), &backend.bucket)
            .await?;

        info!("Generating terragrunt config");
        write_terragrunt_config(&self.paths, &backend).await?;

        let result = self.apply(&role.credentials).await;
        self.cleanup().await;
        result
    }

    async fn apply(&self, credentials: &Credentials) -> Result<(), CdflowError> {
        self.runner
            .check(
                &ShellCommand::new("terraform")
                    .args(["get", INFRA_DIR])
                    .envs(credentials.env_vars())
                    .current_dir(&self.paths.root),
            )
            .await?;

        let image = self.image_name();
        for action in ["plan", "apply"] {
            info!("Running terragrunt {}", action);
            self.runner
                .check(&self.terragrunt_command(action, &image, credentials))
                .await?;
        }
        Ok(())
    }

    /// `terragrunt <action>` with the deployment variables
    pub fn terragrunt_command(
        &self,
        action: &str,
        image: &str,
        credentials: &Credentials,
    ) -> ShellCommand {
        let vars = [
            format!("aws.region={}", self.metadata.region),
            format!("component={}", self.service_name()),
            format!("env={}", self.environment),
            format!("image={}", image),
            format!("team={}", self.metadata.team),
            format!("version=\"{}\"", self.version),
        ];

        let mut command = ShellCommand::new("terragrunt").arg(action);
        for var in vars {
            command = command.arg("-var").arg(var);
        }

        if self.paths.environment_config(&self.environment).exists() {
            command = command.arg(format!(
                "-var-file={}",
                self.paths.environment_config_arg(&self.environment)
            ));
        }

        command
            .arg(INFRA_DIR)
            .envs(credentials.env_vars())
            .current_dir(&self.paths.root)
    }

    /// Ensure the state bucket exists; a failed creation is only logged
    async fn prepare_state_bucket(
        &self,
        s3: &dyn ObjectStore,
        bucket: &str,
    ) -> Result<(), CdflowError> {
        if s3.bucket_exists(bucket).await? {
            debug!("Bucket {} exists", bucket);
            return Ok(());
        }

        info!("Bucket {} doesn't exist... Trying to create...", bucket);
        if let Err(e) = s3.create_bucket(bucket, &self.metadata.region).await {
            warn!("Error while trying to create bucket {}: {}", bucket, e);
        }
        Ok(())
    }

    async fn cleanup(&self) {
        remove_generated(&self.paths.terraform_dir()).await;
        remove_generated(&self.paths.terragrunt_file()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::mock::MockAws;
    use crate::shell::mock::RecordingRunner;

    fn deployment(environment: &str, metadata_json: &str, component: &str) -> Deployment {
        let metadata = ServiceMetadata::from_json(metadata_json, component).unwrap();
        let platform: PlatformConfig = serde_json::from_str(
            r#"{"aws_config": {"dev.account_id": "111", "prod.account_id": "222"}}"#,
        )
        .unwrap();
        Deployment::new(
            environment,
            "42",
            component,
            metadata,
            platform,
            Arc::new(RecordingRunner::new()),
            Arc::new(MockAws::new()),
        )
    }

    #[test]
    fn test_prod_environments() {
        assert!(deployment("live", r#"{"TEAM": "t"}"#, "app").prod());
        assert!(deployment("debug", r#"{"TEAM": "t"}"#, "app").prod());
        assert!(!deployment("ci", r#"{"TEAM": "t"}"#, "app").prod());
        assert!(!deployment("aslive", r#"{"TEAM": "t"}"#, "app").prod());
    }

    #[test]
    fn test_account() {
        assert_eq!(deployment("live", r#"{"TEAM": "t"}"#, "app").account(), "mmgprod");
        assert_eq!(
            deployment("ci", r#"{"TEAM": "t", "ACCOUNT_PREFIX": "acme"}"#, "app").account(),
            "acmedev"
        );
    }

    #[test]
    fn test_cluster() {
        assert_eq!(deployment("live", r#"{"TEAM": "t"}"#, "app").cluster(), "production");
        assert_eq!(deployment("debug", r#"{"TEAM": "t"}"#, "app").cluster(), "non-production");

        let custom = r#"{"TEAM": "t", "PRODUCTION_CLUSTER": "blue", "NON_PRODUCTION_CLUSTER": "green"}"#;
        assert_eq!(deployment("live", custom, "app").cluster(), "blue");
        assert_eq!(deployment("ci", custom, "app").cluster(), "green");
    }

    #[test]
    fn test_dns_zone_and_hostname() {
        let live = deployment("live", r#"{"TEAM": "t"}"#, "search-service");
        assert_eq!(live.dns_zone().unwrap(), "mmgapi.net.");
        assert_eq!(live.hostname().unwrap(), "search.mmgapi.net.");

        let ci = deployment("ci", r#"{"TEAM": "t"}"#, "search-service");
        assert_eq!(ci.dns_zone().unwrap(), "dev.mmgapi.net.");
        assert_eq!(ci.hostname().unwrap(), "ci-search.dev.mmgapi.net.");
    }

    #[test]
    fn test_dns_zone_null_domain() {
        let d = deployment("ci", r#"{"TEAM": "t", "DOMAIN": null}"#, "worker");
        let err = d.dns_zone().unwrap_err();
        assert!(err.is_user_error());
        assert_eq!(err.to_string(), "cannot infer dns zone when DOMAIN set to null");
        assert!(d.hostname().is_err());
    }

    #[test]
    fn test_service_name_with_leg() {
        let d = deployment("ci", r#"{"TEAM": "t"}"#, "app");
        assert_eq!(d.service_name(), "app");
        let d = d.with_leg(Some("blue".to_string()));
        assert_eq!(d.service_name(), "app-blue");
    }

    #[test]
    fn test_image_name_uses_dev_registry() {
        let d = deployment("live", r#"{"TEAM": "t"}"#, "app");
        assert_eq!(d.image_name(), "111.dkr.ecr.eu-west-1.amazonaws.com/app:42");
    }
}
