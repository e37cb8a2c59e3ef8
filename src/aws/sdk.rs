//! AWS SDK implementations of the service seams

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_ecr::error::DisplayErrorContext;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use std::sync::Arc;
use tracing::{debug, info};

use super::{AssumedRole, Credentials, Ecr, ObjectStore, RegistryAuth, RoleAssumer, Sts};
use crate::{CdflowError, naming};

/// Region in which S3 rejects an explicit location constraint
const S3_DEFAULT_REGION: &str = "us-east-1";

fn aws_error<E: std::error::Error>(operation: &str, err: E) -> CdflowError {
    CdflowError::Aws(format!("{}: {}", operation, DisplayErrorContext(&err)))
}

/// Shared config from the default credential chain
pub async fn load_default_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// Shared config for fixed temporary credentials
pub async fn load_config_with_credentials(region: &str, credentials: &Credentials) -> SdkConfig {
    let provider = aws_sdk_sts::config::Credentials::new(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.clone(),
        Some(credentials.session_token.clone()),
        None,
        "cdflow-assumed-role",
    );

    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .credentials_provider(provider)
        .load()
        .await
}

/// ECR client
pub struct SdkEcr {
    client: aws_sdk_ecr::Client,
}

impl SdkEcr {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_ecr::Client::new(config),
        }
    }
}

#[async_trait]
impl Ecr for SdkEcr {
    async fn repository_exists(&self, name: &str) -> Result<bool, CdflowError> {
        match self
            .client
            .describe_repositories()
            .repository_names(name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_repository_not_found_exception()) =>
            {
                debug!("ECR repository {} not found", name);
                Ok(false)
            }
            Err(err) => Err(aws_error("describe repositories", err)),
        }
    }

    async fn create_repository(&self, name: &str) -> Result<(), CdflowError> {
        self.client
            .create_repository()
            .repository_name(name)
            .send()
            .await
            .map_err(|e| aws_error("create repository", e))?;
        Ok(())
    }

    async fn set_repository_policy(&self, name: &str, policy_text: &str) -> Result<(), CdflowError> {
        self.client
            .set_repository_policy()
            .repository_name(name)
            .policy_text(policy_text)
            .send()
            .await
            .map_err(|e| aws_error("set repository policy", e))?;
        Ok(())
    }

    async fn authorization(&self) -> Result<Vec<RegistryAuth>, CdflowError> {
        let output = self
            .client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| aws_error("get authorization token", e))?;

        output
            .authorization_data()
            .iter()
            .map(|data| {
                let token = data.authorization_token().ok_or_else(|| {
                    CdflowError::Aws("authorization data without token".to_string())
                })?;
                let endpoint = data.proxy_endpoint().ok_or_else(|| {
                    CdflowError::Aws("authorization data without proxy endpoint".to_string())
                })?;
                RegistryAuth::from_token(token, endpoint)
            })
            .collect()
    }
}

/// STS client
pub struct SdkSts {
    client: aws_sdk_sts::Client,
}

impl SdkSts {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_sts::Client::new(config),
        }
    }
}

#[async_trait]
impl Sts for SdkSts {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials, CdflowError> {
        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .send()
            .await
            .map_err(|e| aws_error("assume role", e))?;

        let credentials = output
            .credentials()
            .ok_or_else(|| CdflowError::Aws(format!("no credentials returned for {}", role_arn)))?;

        Ok(Credentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
        })
    }

    async fn caller_account(&self) -> Result<String, CdflowError> {
        let output = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| aws_error("get caller identity", e))?;

        output
            .account()
            .map(str::to_string)
            .ok_or_else(|| CdflowError::Aws("caller identity without account".to_string()))
    }
}

/// S3 client
pub struct SdkObjectStore {
    client: aws_sdk_s3::Client,
}

impl SdkObjectStore {
    pub fn new(config: &SdkConfig) -> Self {
        Self::from_client(aws_sdk_s3::Client::new(config))
    }

    /// Wrap a preconfigured client (e.g. path-style addressing)
    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for SdkObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, CdflowError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| aws_error("list buckets", e))?;

        Ok(output.buckets().iter().any(|b| b.name() == Some(bucket)))
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), CdflowError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if region != S3_DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|e| aws_error("create bucket", e))?;
        Ok(())
    }
}

/// Assumes roles with the default credential chain, then binds clients to
/// the temporary credentials
pub struct SdkRoleAssumer {
    region: String,
    base: SdkConfig,
}

impl SdkRoleAssumer {
    pub async fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            base: load_default_config(region).await,
        }
    }
}

#[async_trait]
impl RoleAssumer for SdkRoleAssumer {
    async fn assume_admin_role(
        &self,
        account_id: &str,
        session_name: &str,
    ) -> Result<AssumedRole, CdflowError> {
        info!("Assuming role in account {}", account_id);

        let credentials = SdkSts::new(&self.base)
            .assume_role(&naming::admin_role_arn(account_id), session_name)
            .await?;
        let config = load_config_with_credentials(&self.region, &credentials).await;

        Ok(AssumedRole {
            account_id: account_id.to_string(),
            credentials,
            ecr: Arc::new(SdkEcr::new(&config)),
            sts: Arc::new(SdkSts::new(&config)),
            s3: Arc::new(SdkObjectStore::new(&config)),
        })
    }
}
