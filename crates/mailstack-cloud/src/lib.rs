//! mailstack cloud layer
//!
//! Provider abstraction, persisted state and the plan/apply engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  mailstack CLI                   │
//! │              (plan / up / outputs)               │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 mailstack-cloud                  │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   Executor (plan / apply over levels)     │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────────────┐    │
//! │  │  State Mgmt  │  │  Provider traits     │    │
//! │  └──────────────┘  └──────────────────────┘    │
//! └───────┬──────────────┬──────────────┬──────────┬┘
//!         │              │              │          └───────┐
//! ┌───────▼──────┐ ┌─────▼──────┐ ┌─────▼──────┐ ┌─────────▼──┐
//! │   hetzner    │ │    gcp     │ │   vault    │ │    aws     │
//! │  (hcloud)    │ │ (dns/iam)  │ │  (kv v2)   │ │  (s3/iam)  │
//! └──────────────┘ └────────────┘ └────────────┘ └────────────┘
//! ```

pub mod action;
pub mod error;
pub mod executor;
pub mod provider;
pub mod state;

// Re-exports
pub use action::{Action, ActionType, ApplyResult, Plan, PlanSummary, TaskReport};
pub use error::{CloudError, Result};
pub use executor::{ApplyEvent, DEFAULT_PARALLELISM, Executor};
pub use provider::{
    AccessKey, AuthStatus, ComputeProvider, Connection, DatabaseAdmin, DnsProvider, DnsRecord,
    FirewallRule, FirewallSpec, IamProvider, IpFamily, Labels, NetworkSpec, ObjectStore,
    PrimaryIp, PrimaryIpSpec, RecordType, RemoteExecutor, SecretStore, ServerInfo, ServerSpec,
    StorageAdmin, SubnetSpec,
};
pub use state::{GlobalState, StateLock, StateManager, TaskState};
