//! AWS provider for mailstack
//!
//! Implements [`mailstack_cloud::StorageAdmin`] on top of the `aws` CLI:
//! S3 buckets, customer-managed IAM policies, IAM users and their access
//! keys. Lookups go by name, so re-running converges.
//!
//! # Requirements
//!
//! - `aws` CLI v2 must be installed
//! - credentials through the usual chain (`AWS_PROFILE`, environment, SSO)

pub mod aws;
pub mod error;
pub mod provider;

pub use aws::AwsCli;
pub use error::{AwsError, Result};
pub use provider::AwsProvider;
