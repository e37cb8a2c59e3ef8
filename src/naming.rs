//! Naming conventions
//!
//! Image names, registries, state buckets, role ARNs and session names are
//! all derived from a handful of inputs by convention.

use md5::{Digest, Md5};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::CdflowError;

/// Prefix of every remote state bucket
pub const STATE_BUCKET_PREFIX: &str = "terraform-tfstate-";

/// Tag used for unversioned (local) builds
pub const DEV_TAG: &str = "dev";

/// Component name suffixes and the domain each one lives under
const DOMAIN_CONVENTIONS: [(&str, &str); 3] = [
    ("-service", "mmgapi.net"),
    ("-subscriber", "mmgsubscriber.com"),
    ("-admin", "mmgadmin.com"),
];

/// Domain for components that match no suffix convention
const FALLBACK_DOMAIN: &str = "mergermarket.it";

static JOB_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w+=,.@/-]{2,64}$").expect("valid JOB_NAME pattern"));

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w+=,.@-]{2,64}$").expect("valid EMAIL pattern"));

/// Default domain for a component, based on its name suffix
pub fn default_domain(component_name: &str) -> &'static str {
    DOMAIN_CONVENTIONS
        .iter()
        .find(|(suffix, _)| component_name.ends_with(suffix))
        .map(|(_, domain)| *domain)
        .unwrap_or(FALLBACK_DOMAIN)
}

/// Default DNS name: the component name without its conventional suffix
pub fn default_dns_name(component_name: &str) -> String {
    DOMAIN_CONVENTIONS
        .iter()
        .find_map(|(suffix, _)| component_name.strip_suffix(suffix))
        .unwrap_or(component_name)
        .to_string()
}

/// ECR registry host for an account and region
pub fn ecr_registry(account_id: &str, region: &str) -> String {
    format!("{}.dkr.ecr.{}.amazonaws.com", account_id, region)
}

/// Fully qualified image name in the account's ECR registry
///
/// Unversioned builds are tagged `dev`.
pub fn ecr_image_name(
    account_id: &str,
    region: &str,
    component_name: &str,
    version: Option<&str>,
) -> String {
    format!(
        "{}/{}:{}",
        ecr_registry(account_id, region),
        component_name,
        version.unwrap_or(DEV_TAG)
    )
}

/// Image name for a deployment: registry-qualified when versioned,
/// otherwise the local `<component>:dev` image
pub fn container_image_name(registry: &str, component_name: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{}/{}:{}", registry, component_name, version),
        None => format!("{}:{}", component_name, DEV_TAG),
    }
}

/// Remote state bucket for an account: prefix plus 6 hex chars of MD5(account id)
pub fn state_bucket_name(account_id: &str) -> String {
    let digest = Md5::digest(account_id.as_bytes());
    let hex: String = digest[..3].iter().map(|b| format!("{b:02x}")).collect();
    format!("{}{}", STATE_BUCKET_PREFIX, hex)
}

/// Lock/state identifier for an environment and component
pub fn state_file_id(environment: &str, component_name: &str) -> String {
    format!("{}-{}", environment, component_name)
}

/// Object key of the terraform state for an environment and component
pub fn state_key(environment: &str, component_name: &str) -> String {
    format!("{}/{}/terraform.tfstate", environment, component_name)
}

/// Admin role assumed for deployments into an account
pub fn admin_role_arn(account_id: &str) -> String {
    format!("arn:aws:iam::{}:role/admin", account_id)
}

/// Root principal of an account, used in repository policies
pub fn account_root_arn(account_id: &str) -> String {
    format!("arn:aws:iam::{}:root", account_id)
}

/// Session name for an assumed role, taken from `JOB_NAME` (CI) or `EMAIL`
pub fn role_session_name(env: &HashMap<String, String>) -> Result<String, CdflowError> {
    if let Some(job_name) = env.get("JOB_NAME") {
        if !JOB_NAME_PATTERN.is_match(job_name) {
            return Err(CdflowError::user(r"JOB_NAME must match [\w+=,.@/-]{2,64}"));
        }
        return Ok(job_name.replace('/', "-"));
    }

    if let Some(email) = env.get("EMAIL") {
        if !EMAIL_PATTERN.is_match(email) {
            return Err(CdflowError::user(r"EMAIL must match [\w+=,.@-]{2,64}"));
        }
        return Ok(email.clone());
    }

    Err(CdflowError::user(
        "JOB_NAME or EMAIL environment variable must be set for session name of assumed role",
    ))
}
