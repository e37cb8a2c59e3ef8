//! Service metadata and platform configuration
//!
//! `service.json` describes a single service (owning team, region, build
//! type, DNS conventions). Platform config maps a region to the dev and
//! prod AWS accounts.

pub mod loader;

pub use loader::{load_platform_config, load_service_metadata};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{CdflowError, naming};

/// Default AWS region for services
pub const DEFAULT_REGION: &str = "eu-west-1";

/// How the release image is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    /// Plain `docker build` of the build directory
    #[default]
    Docker,
    /// Heroku-style slug built by `flynn/slugbuilder`, then wrapped in an image
    Slug,
}

/// `service.json` as written by the user; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct RawServiceMetadata {
    team: Option<String>,
    region: Option<String>,
    account_prefix: Option<String>,
    #[serde(rename = "TYPE")]
    build_type: Option<BuildType>,
    /// Outer `None`: key absent. `Some(None)`: explicitly `null`.
    #[serde(default, deserialize_with = "present_or_null")]
    domain: Option<Option<String>>,
    dns_name: Option<String>,
    #[serde(rename = "ELBTYPE")]
    elb_type: Option<String>,
    healthcheck_suffix: Option<String>,
    docker_build_dir: Option<String>,
    slug_builder_docker_opts: Option<String>,
    config_handler: Option<String>,
    production_cluster: Option<String>,
    non_production_cluster: Option<String>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Service metadata with conventions applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMetadata {
    /// Owning team (required)
    pub team: String,
    pub region: String,
    pub account_prefix: String,
    pub build_type: BuildType,
    /// `None` when the service has no DNS presence
    pub domain: Option<String>,
    pub dns_name: Option<String>,
    pub elb_type: String,
    pub healthcheck_suffix: String,
    pub docker_build_dir: String,
    pub slug_builder_docker_opts: String,
    pub config_handler: String,
    pub production_cluster: Option<String>,
    pub non_production_cluster: Option<String>,
}

impl ServiceMetadata {
    /// Parse `service.json` content and apply defaults for `component_name`
    pub fn from_json(content: &str, component_name: &str) -> Result<Self, CdflowError> {
        let raw: RawServiceMetadata = serde_json::from_str(content)
            .map_err(|e| CdflowError::user(format!("malformed service.json - {}", e)))?;
        Self::with_defaults(raw, component_name)
    }

    fn with_defaults(raw: RawServiceMetadata, component_name: &str) -> Result<Self, CdflowError> {
        let team = raw
            .team
            .ok_or_else(|| CdflowError::user("TEAM missing from service metadata (service.json)"))?;

        let domain = match raw.domain {
            Some(explicit) => explicit,
            None => Some(naming::default_domain(component_name).to_string()),
        };

        let dns_name = match (raw.dns_name, &domain) {
            (Some(name), _) => Some(name),
            (None, Some(_)) => Some(naming::default_dns_name(component_name)),
            (None, None) => None,
        };

        Ok(Self {
            team,
            region: raw.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
            account_prefix: raw.account_prefix.unwrap_or_else(|| "mmg".to_string()),
            build_type: raw.build_type.unwrap_or_default(),
            domain,
            dns_name,
            elb_type: raw.elb_type.unwrap_or_else(|| "internal".to_string()),
            healthcheck_suffix: raw
                .healthcheck_suffix
                .unwrap_or_else(|| "/internal/healthcheck".to_string()),
            docker_build_dir: raw.docker_build_dir.unwrap_or_else(|| ".".to_string()),
            slug_builder_docker_opts: raw.slug_builder_docker_opts.unwrap_or_default(),
            config_handler: raw.config_handler.unwrap_or_else(|| "toml-inline".to_string()),
            production_cluster: raw.production_cluster,
            non_production_cluster: raw.non_production_cluster,
        })
    }
}

/// AWS accounts of the platform in one region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsAccounts {
    #[serde(rename = "dev.account_id")]
    pub dev_account_id: String,
    #[serde(rename = "prod.account_id")]
    pub prod_account_id: String,
}

/// Platform config (`config/platform-config/<region>.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub aws_config: AwsAccounts,
}

impl PlatformConfig {
    /// Account to use for prod or non-prod work
    pub fn account_id(&self, prod: bool) -> &str {
        if prod {
            &self.aws_config.prod_account_id
        } else {
            &self.aws_config.dev_account_id
        }
    }

    /// Images always live in the dev account's registry
    pub fn ecr_registry(&self, region: &str) -> String {
        naming::ecr_registry(&self.aws_config.dev_account_id, region)
    }
}
