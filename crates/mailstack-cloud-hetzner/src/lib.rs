//! Hetzner Cloud provider for mailstack
//!
//! Implements [`mailstack_cloud::ComputeProvider`] on top of the `hcloud`
//! CLI: SSH keys, networks and subnets, firewalls, primary IPs with reverse
//! DNS, and the server itself. Every operation looks the resource up by
//! name first, so re-running converges instead of duplicating.
//!
//! # Requirements
//!
//! - `hcloud` CLI must be installed
//! - `HCLOUD_TOKEN` or an active hcloud context
//!
//! # Example
//!
//! ```ignore
//! use mailstack_cloud::ComputeProvider;
//! use mailstack_cloud_hetzner::HetznerProvider;
//!
//! let provider = HetznerProvider::new();
//! let auth = provider.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//! ```

pub mod error;
pub mod hcloud;
pub mod location;
pub mod provider;

pub use error::{HetznerError, Result};
pub use hcloud::Hcloud;
pub use location::{NETWORK_ZONE, to_datacenter};
pub use provider::HetznerProvider;
