//! AWS service seams
//!
//! Release and deploy flows talk to ECR, STS and S3 only through these
//! traits. [`sdk`] implements them with the AWS SDK, [`mock`] records calls
//! for tests.

pub mod mock;
pub mod sdk;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use std::fmt;
use std::sync::Arc;

use crate::CdflowError;

/// Temporary credentials of an assumed role
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl Credentials {
    /// Environment variables that hand these credentials to child processes
    pub fn env_vars(&self) -> [(&'static str, String); 3] {
        [
            ("AWS_ACCESS_KEY_ID", self.access_key_id.clone()),
            ("AWS_SECRET_ACCESS_KEY", self.secret_access_key.clone()),
            ("AWS_SESSION_TOKEN", self.session_token.clone()),
        ]
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .finish()
    }
}

/// Docker login details for one registry endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub proxy_endpoint: String,
}

impl RegistryAuth {
    /// Decode an ECR authorization token (base64 of `user:password`)
    pub fn from_token(token: &str, proxy_endpoint: &str) -> Result<Self, CdflowError> {
        let decoded = BASE64
            .decode(token)
            .map_err(|e| CdflowError::InvalidData(format!("Invalid authorization token: {}", e)))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|e| CdflowError::InvalidData(format!("Invalid UTF-8 in token: {}", e)))?;
        let (username, password) = decoded.split_once(':').ok_or_else(|| {
            CdflowError::InvalidData("Authorization token is not of the form user:password".into())
        })?;

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            proxy_endpoint: proxy_endpoint.to_string(),
        })
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"** redacted **")
            .field("proxy_endpoint", &self.proxy_endpoint)
            .finish()
    }
}

/// Container registry operations
#[async_trait]
pub trait Ecr: Send + Sync {
    /// Whether a repository exists; only "not found" maps to `false`
    async fn repository_exists(&self, name: &str) -> Result<bool, CdflowError>;

    async fn create_repository(&self, name: &str) -> Result<(), CdflowError>;

    async fn set_repository_policy(&self, name: &str, policy_text: &str) -> Result<(), CdflowError>;

    /// Login details for every registry endpoint of the account
    async fn authorization(&self) -> Result<Vec<RegistryAuth>, CdflowError>;
}

/// Security token operations
#[async_trait]
pub trait Sts: Send + Sync {
    async fn assume_role(&self, role_arn: &str, session_name: &str)
    -> Result<Credentials, CdflowError>;

    /// Account id of the current credentials
    async fn caller_account(&self) -> Result<String, CdflowError>;
}

/// Bucket operations needed for remote state
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, CdflowError>;

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), CdflowError>;
}

/// Clients bound to the credentials of an assumed role
pub struct AssumedRole {
    pub account_id: String,
    pub credentials: Credentials,
    pub ecr: Arc<dyn Ecr>,
    pub sts: Arc<dyn Sts>,
    pub s3: Arc<dyn ObjectStore>,
}

/// Assumes the admin role of an account
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_admin_role(
        &self,
        account_id: &str,
        session_name: &str,
    ) -> Result<AssumedRole, CdflowError>;
}
