//! Project file loaders
//!
//! Loads `service.json` and platform config from the project directory.

use super::{PlatformConfig, ServiceMetadata};
use crate::{CdflowError, paths::ProjectPaths};
use tokio::fs;
use tracing::debug;

/// Load `service.json` and apply defaults for `component_name`
pub async fn load_service_metadata(
    paths: &ProjectPaths,
    component_name: &str,
) -> Result<ServiceMetadata, CdflowError> {
    let path = paths.service_json();

    if !path.exists() {
        return Err(CdflowError::user("service.json not found"));
    }

    let content = fs::read_to_string(&path).await?;
    debug!("Loaded service metadata from {}", path.display());

    ServiceMetadata::from_json(&content, component_name)
}

/// Load the platform config for a region
pub async fn load_platform_config(
    paths: &ProjectPaths,
    region: &str,
) -> Result<PlatformConfig, CdflowError> {
    let path = paths.platform_config(region);

    if !path.exists() {
        return Err(CdflowError::user(format!(
            "{} not found (maybe you need to pull in a platform-config repo?)",
            path.display()
        )));
    }

    let content = fs::read_to_string(&path).await?;
    debug!("Loaded platform config from {}", path.display());

    serde_json::from_str(&content)
        .map_err(|e| CdflowError::user(format!("malformed {}: {}", path.display(), e)))
}
