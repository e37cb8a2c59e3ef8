//! Mock AWS services for testing
//!
//! A single [`MockAws`] implements every service trait and records calls in
//! order. Clones share state, so the clients handed out by
//! [`RoleAssumer::assume_admin_role`] record into the same log.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use super::{AssumedRole, Credentials, Ecr, ObjectStore, RegistryAuth, RoleAssumer, Sts};
use crate::CdflowError;

/// A recorded AWS call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwsCall {
    DescribeRepository(String),
    CreateRepository(String),
    SetRepositoryPolicy { repository: String, policy: String },
    GetAuthorization,
    AssumeRole { role_arn: String, session_name: String },
    CallerAccount,
    BucketExists(String),
    CreateBucket { bucket: String, region: String },
}

/// Mock AWS account
///
/// # Example
/// ```
/// use cdflow::aws::mock::MockAws;
///
/// let aws = MockAws::new()
///     .with_repository("existing-service")
///     .with_registry_auth("AWS", "password", "https://registry.example");
/// ```
#[derive(Clone)]
pub struct MockAws {
    calls: Arc<Mutex<Vec<AwsCall>>>,
    repositories: Arc<Mutex<BTreeSet<String>>>,
    buckets: Arc<Mutex<BTreeSet<String>>>,
    describe_error: Option<String>,
    create_bucket_error: Option<String>,
    list_buckets_error: Option<String>,
    assume_error: Option<String>,
    authorization: Vec<RegistryAuth>,
    caller_account: Option<String>,
    credentials: Credentials,
}

impl Default for MockAws {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAws {
    pub fn new() -> Self {
        Self {
            calls: Arc::default(),
            repositories: Arc::default(),
            buckets: Arc::default(),
            describe_error: None,
            create_bucket_error: None,
            list_buckets_error: None,
            assume_error: None,
            authorization: Vec::new(),
            caller_account: None,
            credentials: Credentials {
                access_key_id: "ASIAMOCKACCESSKEY".to_string(),
                secret_access_key: "mock-secret-key".to_string(),
                session_token: "mock-session-token".to_string(),
            },
        }
    }

    /// Register an existing ECR repository
    pub fn with_repository(self, name: &str) -> Self {
        self.repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        self
    }

    /// Register an existing S3 bucket
    pub fn with_bucket(self, name: &str) -> Self {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        self
    }

    /// Fail repository lookups with an error other than "not found"
    pub fn with_describe_error(mut self, code: &str) -> Self {
        self.describe_error = Some(code.to_string());
        self
    }

    /// Fail bucket creation
    pub fn with_create_bucket_error(mut self, message: &str) -> Self {
        self.create_bucket_error = Some(message.to_string());
        self
    }

    /// Fail bucket listing
    pub fn with_list_buckets_error(mut self, message: &str) -> Self {
        self.list_buckets_error = Some(message.to_string());
        self
    }

    /// Fail role assumption
    pub fn with_assume_error(mut self, message: &str) -> Self {
        self.assume_error = Some(message.to_string());
        self
    }

    /// Add a registry login returned by [`Ecr::authorization`]
    pub fn with_registry_auth(mut self, username: &str, password: &str, endpoint: &str) -> Self {
        self.authorization.push(RegistryAuth {
            username: username.to_string(),
            password: password.to_string(),
            proxy_endpoint: endpoint.to_string(),
        });
        self
    }

    /// Account reported by [`Sts::caller_account`] (default: last assumed account)
    pub fn with_caller_account(mut self, account_id: &str) -> Self {
        self.caller_account = Some(account_id.to_string());
        self
    }

    /// Credentials handed out for assumed roles
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<AwsCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Repositories that exist now
    pub fn repositories(&self) -> BTreeSet<String> {
        self.repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Buckets that exist now
    pub fn buckets(&self) -> BTreeSet<String> {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: AwsCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn last_assumed_account(&self) -> Option<String> {
        self.calls().into_iter().rev().find_map(|call| match call {
            AwsCall::AssumeRole { role_arn, .. } => role_arn
                .strip_prefix("arn:aws:iam::")
                .and_then(|rest| rest.split(':').next())
                .map(str::to_string),
            _ => None,
        })
    }
}

#[async_trait]
impl Ecr for MockAws {
    async fn repository_exists(&self, name: &str) -> Result<bool, CdflowError> {
        self.record(AwsCall::DescribeRepository(name.to_string()));
        if let Some(code) = &self.describe_error {
            return Err(CdflowError::Aws(format!("describe repositories: {}", code)));
        }
        Ok(self.repositories().contains(name))
    }

    async fn create_repository(&self, name: &str) -> Result<(), CdflowError> {
        self.record(AwsCall::CreateRepository(name.to_string()));
        self.repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        Ok(())
    }

    async fn set_repository_policy(&self, name: &str, policy_text: &str) -> Result<(), CdflowError> {
        self.record(AwsCall::SetRepositoryPolicy {
            repository: name.to_string(),
            policy: policy_text.to_string(),
        });
        Ok(())
    }

    async fn authorization(&self) -> Result<Vec<RegistryAuth>, CdflowError> {
        self.record(AwsCall::GetAuthorization);
        Ok(self.authorization.clone())
    }
}

#[async_trait]
impl Sts for MockAws {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials, CdflowError> {
        self.record(AwsCall::AssumeRole {
            role_arn: role_arn.to_string(),
            session_name: session_name.to_string(),
        });
        if let Some(message) = &self.assume_error {
            return Err(CdflowError::Aws(message.clone()));
        }
        Ok(self.credentials.clone())
    }

    async fn caller_account(&self) -> Result<String, CdflowError> {
        self.record(AwsCall::CallerAccount);
        self.caller_account
            .clone()
            .or_else(|| self.last_assumed_account())
            .ok_or_else(|| CdflowError::Aws("no caller identity".to_string()))
    }
}

#[async_trait]
impl ObjectStore for MockAws {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, CdflowError> {
        self.record(AwsCall::BucketExists(bucket.to_string()));
        if let Some(message) = &self.list_buckets_error {
            return Err(CdflowError::Aws(format!("list buckets: {}", message)));
        }
        Ok(self.buckets().contains(bucket))
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), CdflowError> {
        self.record(AwsCall::CreateBucket {
            bucket: bucket.to_string(),
            region: region.to_string(),
        });
        if let Some(message) = &self.create_bucket_error {
            return Err(CdflowError::Aws(message.clone()));
        }
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(bucket.to_string());
        Ok(())
    }
}

#[async_trait]
impl RoleAssumer for MockAws {
    async fn assume_admin_role(
        &self,
        account_id: &str,
        session_name: &str,
    ) -> Result<AssumedRole, CdflowError> {
        let credentials = self
            .assume_role(&crate::naming::admin_role_arn(account_id), session_name)
            .await?;

        Ok(AssumedRole {
            account_id: account_id.to_string(),
            credentials,
            ecr: Arc::new(self.clone()),
            sts: Arc::new(self.clone()),
            s3: Arc::new(self.clone()),
        })
    }
}
