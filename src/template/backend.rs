//! Remote state backend configuration
//!
//! State for `<env>/<component>` lives in the account's
//! `terraform-tfstate-<hash>` bucket, locked through DynamoDB.

use serde::Serialize;
use std::path::Path;
use tokio::fs;
use tracing::info;

use super::render_template;
use crate::{CdflowError, naming, paths::ProjectPaths};

const TERRAGRUNT_TEMPLATE: &str = r#"lock = {
  backend = "dynamodb"
  config {
    state_file_id = "{{ state_file_id }}"
    aws_region = "{{ region }}"
    table_name = "terragrunt_locks"
    max_lock_retries = 360
  }
}
remote_state = {
  backend = "s3"
  config {
    encrypt = "true"
    bucket = "{{ bucket }}"
    key = "{{ key }}"
    region = "{{ region }}"
  }
}
"#;

const TERRAFORM_BACKEND_TEMPLATE: &str = r#"terraform {
  backend "s3" {
    bucket = "{{ bucket }}"
    key    = "{{ key }}"
    region = "{{ region }}"
    dynamodb_table = "terraform_locks"
  }
}
"#;

/// Where the state of one environment/component lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendConfig {
    pub bucket: String,
    pub key: String,
    pub region: String,
    pub state_file_id: String,
}

impl BackendConfig {
    /// Backend in the state bucket of `account_id`
    pub fn new(account_id: &str, environment: &str, component_name: &str, region: &str) -> Self {
        Self {
            bucket: naming::state_bucket_name(account_id),
            key: naming::state_key(environment, component_name),
            region: region.to_string(),
            state_file_id: naming::state_file_id(environment, component_name),
        }
    }

    /// Contents of a `.terragrunt` file
    pub fn render_terragrunt(&self) -> Result<String, CdflowError> {
        render_template(".terragrunt", TERRAGRUNT_TEMPLATE, self)
    }

    /// Contents of a terraform `backend "s3"` block
    pub fn render_terraform(&self) -> Result<String, CdflowError> {
        render_template("state.tf", TERRAFORM_BACKEND_TEMPLATE, self)
    }
}

async fn write_config(path: &Path, content: &str) -> Result<(), CdflowError> {
    info!("Writing {}", path.display());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, content).await?;
    Ok(())
}

/// Write `.terragrunt` in the project root
pub async fn write_terragrunt_config(
    paths: &ProjectPaths,
    backend: &BackendConfig,
) -> Result<(), CdflowError> {
    write_config(&paths.terragrunt_file(), &backend.render_terragrunt()?).await
}

/// Write `infra/state.tf`
pub async fn write_terraform_backend(
    paths: &ProjectPaths,
    backend: &BackendConfig,
) -> Result<(), CdflowError> {
    write_config(&paths.state_tf(), &backend.render_terraform()?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend() -> BackendConfig {
        BackendConfig::new("123456789012", "ci", "search-service", "eu-west-1")
    }

    #[test]
    fn test_backend_config_naming() {
        let backend = backend();
        assert_eq!(backend.bucket, "terraform-tfstate-341797");
        assert_eq!(backend.key, "ci/search-service/terraform.tfstate");
        assert_eq!(backend.state_file_id, "ci-search-service");
    }

    #[test]
    fn test_render_terragrunt() {
        let rendered = backend().render_terragrunt().unwrap();

        assert!(rendered.starts_with("lock = {\n  backend = \"dynamodb\""));
        assert!(rendered.contains("state_file_id = \"ci-search-service\""));
        assert!(rendered.contains("aws_region = \"eu-west-1\""));
        assert!(rendered.contains("table_name = \"terragrunt_locks\""));
        assert!(rendered.contains("max_lock_retries = 360"));
        assert!(rendered.contains("encrypt = \"true\""));
        assert!(rendered.contains("bucket = \"terraform-tfstate-341797\""));
        assert!(rendered.contains("key = \"ci/search-service/terraform.tfstate\""));
    }

    #[test]
    fn test_render_terraform_backend() {
        let rendered = backend().render_terraform().unwrap();

        assert!(rendered.contains("backend \"s3\" {"));
        assert!(rendered.contains("bucket = \"terraform-tfstate-341797\""));
        assert!(rendered.contains("key    = \"ci/search-service/terraform.tfstate\""));
        assert!(rendered.contains("dynamodb_table = \"terraform_locks\""));
    }

    #[tokio::test]
    async fn test_write_files() {
        let temp = TempDir::new().unwrap();
        let paths = ProjectPaths::with_root(temp.path());

        write_terragrunt_config(&paths, &backend()).await.unwrap();
        write_terraform_backend(&paths, &backend()).await.unwrap();

        let terragrunt = fs::read_to_string(paths.terragrunt_file()).await.unwrap();
        assert!(terragrunt.contains("remote_state"));
        let state = fs::read_to_string(paths.state_tf()).await.unwrap();
        assert!(state.contains("terraform {"));
    }
}
