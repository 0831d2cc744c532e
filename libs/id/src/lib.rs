//! # armada-id
//!
//! Typed identifiers, parsing, and validation for the armada scheduler.
//!
//! ## Design Principles
//!
//! - App ids are user-controlled labels; everything else is system- or
//!   cluster-manager-minted and treated as opaque
//! - All ids have a canonical string representation with strict parsing
//! - Ids roundtrip through serialization (parse → format → parse)
//! - Ids are typed to prevent mixing different resource kinds
//!
//! ## Formats
//!
//! - `AppId`: a validated label, e.g. `payments-api`
//! - `TaskId`: `{app_id}.{ulid}`: the prefix encodes the owning app, the
//!   suffix is a ULID, e.g. `payments-api.01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//! - `DeploymentId`: `dpl_{ulid}`, minted per upgrade run
//! - `OfferId`, `SlaveId`, `ExecutorId`, `FrameworkId`: opaque tokens from
//!   the cluster manager
//!
//! The ULID suffix gives task ids time-ordering and 80 bits of randomness,
//! so task ids are unique across the process lifetime without coordination.

mod error;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
