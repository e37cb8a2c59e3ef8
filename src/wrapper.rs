//! Terragrunt and terraform pass-through wrappers
//!
//! Arguments are handed to the tool unchanged. The wrapper reads a few
//! `-var name=value` pairs out of them to set up remote state and assume
//! the admin role of the target account first.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::aws::RoleAssumer;
use crate::paths::{INFRA_DIR, ProjectPaths, remove_generated};
use crate::shell::{CommandRunner, ShellCommand};
use crate::template::{BackendConfig, write_terraform_backend, write_terragrunt_config};
use crate::CdflowError;

/// Variables every wrapped invocation must set
pub const REQUIRED_VARS: [&str; 4] = ["env", "component", "aws_region", "account_id"];

/// Tool being wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Terragrunt,
    Terraform,
}

impl Tool {
    pub fn program(&self) -> &'static str {
        match self {
            Self::Terragrunt => "terragrunt",
            Self::Terraform => "terraform",
        }
    }

    /// Session name of the assumed role
    pub fn session_name(&self) -> &'static str {
        self.program()
    }

    /// Variables read if present
    pub fn optional_vars(&self) -> &'static [&'static str] {
        match self {
            Self::Terragrunt => &[],
            Self::Terraform => &["state_aws_region"],
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Collect `name=value` arguments for the given names (last one wins)
pub fn parse_vars(
    args: &[String],
    required: &[&str],
    optional: &[&str],
) -> Result<HashMap<String, String>, CdflowError> {
    let mut found = HashMap::new();

    for name in required.iter().chain(optional) {
        for arg in args {
            if let Some(value) = arg.strip_prefix(name).and_then(|rest| rest.strip_prefix('=')) {
                found.insert(name.to_string(), value.to_string());
            }
        }
    }

    if let Some(missing) = required.iter().find(|name| !found.contains_key(**name)) {
        return Err(CdflowError::user(format!(
            "Please specify missing variable: -var {}=<value>",
            missing
        )));
    }

    Ok(found)
}

/// Variables the wrapper acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperVars {
    pub env: String,
    pub component: String,
    pub aws_region: String,
    pub account_id: String,
    pub state_aws_region: Option<String>,
}

impl WrapperVars {
    pub fn parse(tool: Tool, args: &[String]) -> Result<Self, CdflowError> {
        let mut vars = parse_vars(args, &REQUIRED_VARS, tool.optional_vars())?;
        let state_aws_region = vars.remove("state_aws_region");
        let mut take = |name: &str| vars.remove(name).unwrap_or_default();

        Ok(Self {
            env: take("env"),
            component: take("component"),
            aws_region: take("aws_region"),
            account_id: take("account_id"),
            state_aws_region,
        })
    }

    /// Region of the state bucket
    pub fn state_region(&self) -> &str {
        self.state_aws_region.as_deref().unwrap_or(&self.aws_region)
    }
}

/// A wrapped terragrunt or terraform invocation
pub struct Wrapper {
    tool: Tool,
    args: Vec<String>,
    paths: ProjectPaths,
    runner: Arc<dyn CommandRunner>,
    aws: Arc<dyn RoleAssumer>,
}

impl Wrapper {
    pub fn new(
        tool: Tool,
        args: Vec<String>,
        runner: Arc<dyn CommandRunner>,
        aws: Arc<dyn RoleAssumer>,
    ) -> Self {
        Self {
            tool,
            args,
            paths: ProjectPaths::new(),
            runner,
            aws,
        }
    }

    /// Use custom project paths
    pub fn with_paths(mut self, paths: ProjectPaths) -> Self {
        self.paths = paths;
        self
    }

    pub async fn run(&self) -> Result<(), CdflowError> {
        let vars = WrapperVars::parse(self.tool, &self.args)?;

        self.cleanup().await;

        let role = self
            .aws
            .assume_admin_role(&vars.account_id, self.tool.session_name())
            .await?;

        let mut env: Vec<(String, String)> = role
            .credentials
            .env_vars()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        env.push(("AWS_DEFAULT_REGION".to_string(), vars.aws_region.clone()));

        let backend = BackendConfig::new(
            &vars.account_id,
            &vars.env,
            &vars.component,
            vars.state_region(),
        );

        let result = match self.tool {
            Tool::Terragrunt => self.run_terragrunt(&backend, env).await,
            Tool::Terraform => self.run_terraform(&backend, env).await,
        };

        self.cleanup().await;
        result
    }

    async fn run_terragrunt(
        &self,
        backend: &BackendConfig,
        env: Vec<(String, String)>,
    ) -> Result<(), CdflowError> {
        write_terragrunt_config(&self.paths, backend).await?;

        let base = ShellCommand::new(self.tool.program())
            .envs(env)
            .current_dir(&self.paths.root);

        info!("Fetching terraform modules");
        self.runner
            .check(&base.clone().args(["get", INFRA_DIR]))
            .await?;

        info!("Running terragrunt {}", self.args.join(" "));
        self.runner
            .check(&base.args(self.args.iter().cloned()).arg(INFRA_DIR))
            .await
    }

    async fn run_terraform(
        &self,
        backend: &BackendConfig,
        env: Vec<(String, String)>,
    ) -> Result<(), CdflowError> {
        write_terraform_backend(&self.paths, backend).await?;

        let base = ShellCommand::new(self.tool.program())
            .envs(env)
            .current_dir(self.paths.infra_dir());

        info!("Initialising terraform");
        self.runner.check(&base.clone().arg("init")).await?;

        info!("Running terraform {}", self.args.join(" "));
        self.runner
            .check(&base.args(self.args.iter().cloned()))
            .await
    }

    async fn cleanup(&self) {
        match self.tool {
            Tool::Terragrunt => {
                remove_generated(&self.paths.terragrunt_file()).await;
                remove_generated(&self.paths.terraform_dir()).await;
            }
            Tool::Terraform => {
                remove_generated(&self.paths.state_tf()).await;
                remove_generated(&self.paths.infra_terraform_dir()).await;
            }
        }
    }
}
