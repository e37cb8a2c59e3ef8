//! cdflow library
//!
//! Release and deploy tooling for containerised services on AWS.
//!
//! # Flows
//!
//! - **Release**: build the service image (plain docker or slug), run the
//!   project's hooks and push it to ECR in the dev account
//! - **Deploy**: apply the project's `infra/` terraform with terragrunt,
//!   remote state in the target account's state bucket
//! - **Wrappers**: run terragrunt or terraform with state and credentials
//!   set up from `-var` arguments
//!
//! External programs run through [`shell::CommandRunner`] and AWS calls go
//! through the traits in [`aws`], so every flow can run against mocks.

pub mod aws;
pub mod component;
pub mod config;
pub mod deploy;
pub mod naming;
pub mod paths;
pub mod release;
pub mod shell;
pub mod template;
pub mod wrapper;

mod error;

pub use deploy::Deployment;
pub use error::CdflowError;
pub use release::{Release, ReleaseConfig};
pub use wrapper::{Tool, Wrapper};
