//! Standard project paths
//!
//! Defines the layout of a service repository that cdflow operates on.

use std::path::{Path, PathBuf};

/// Service metadata file name
pub const SERVICE_JSON: &str = "service.json";

/// Terraform configuration directory
pub const INFRA_DIR: &str = "infra";

/// Dockerfile used for slug-based releases
pub const SLUG_DOCKERFILE: &str = "/infra/Dockerfile_slug";

/// Standard project paths
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    /// Project root (default: current directory)
    pub root: PathBuf,
}

impl Default for ProjectPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectPaths {
    /// Paths relative to the current directory
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }

    /// Create with custom root directory (useful for testing)
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    // ==================== Metadata ====================

    /// ./service.json - Service metadata
    pub fn service_json(&self) -> PathBuf {
        self.root.join(SERVICE_JSON)
    }

    /// ./config - Project configuration directory
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    /// ./config/platform-config/<region>.json - Platform config
    pub fn platform_config(&self, region: &str) -> PathBuf {
        self.config_dir()
            .join("platform-config")
            .join(format!("{}.json", region))
    }

    /// config/<environment>.json relative to the root, as passed to terragrunt
    pub fn environment_config_arg(&self, environment: &str) -> String {
        format!("config/{}.json", environment)
    }

    /// ./config/<environment>.json - Per-environment terraform variables
    pub fn environment_config(&self, environment: &str) -> PathBuf {
        self.root.join(self.environment_config_arg(environment))
    }

    // ==================== Terraform ====================

    /// ./infra - Terraform configuration
    pub fn infra_dir(&self) -> PathBuf {
        self.root.join(INFRA_DIR)
    }

    /// ./infra/state.tf - Generated S3 backend
    pub fn state_tf(&self) -> PathBuf {
        self.infra_dir().join("state.tf")
    }

    /// ./infra/.terraform - Terraform working data when run inside infra
    pub fn infra_terraform_dir(&self) -> PathBuf {
        self.infra_dir().join(".terraform")
    }

    /// ./.terragrunt - Generated terragrunt configuration
    pub fn terragrunt_file(&self) -> PathBuf {
        self.root.join(".terragrunt")
    }

    /// ./.terraform - Terraform working data when run from the root
    pub fn terraform_dir(&self) -> PathBuf {
        self.root.join(".terraform")
    }

    // ==================== Release ====================

    /// ./target - Build output for slug releases
    pub fn target_dir(&self) -> PathBuf {
        self.root.join("target")
    }

    /// ./target/slug.tgz - Slug archive
    pub fn slug_archive(&self) -> PathBuf {
        self.target_dir().join("slug.tgz")
    }

    /// ./target/Dockerfile - Dockerfile wrapping the slug
    pub fn slug_dockerfile(&self) -> PathBuf {
        self.target_dir().join("Dockerfile")
    }

    /// ./<name> - Hook script
    pub fn hook(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// Remove a generated file or directory; missing paths and failures are ignored
pub async fn remove_generated(path: &Path) {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(_) => return,
    };

    if let Err(e) = result {
        tracing::debug!("Could not remove {}: {}", path.display(), e);
    }
}
