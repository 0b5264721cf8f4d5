//! Google Cloud provider for mailstack
//!
//! - Cloud DNS record sets via the REST API (`dns.rs`)
//! - Service accounts, keys and IAM bindings via the `gcloud` CLI
//! - Object uploads to Cloud Storage via `gcloud storage cp`
//!
//! # Requirements
//!
//! - `gcloud` CLI must be installed with an active account
//!   (`gcloud auth login`)

pub mod dns;
pub mod error;
pub mod gcloud;
pub mod provider;

pub use dns::{CloudDns, ResourceRecordSet};
pub use error::{GcpError, Result};
pub use gcloud::Gcloud;
pub use provider::GcpProvider;
