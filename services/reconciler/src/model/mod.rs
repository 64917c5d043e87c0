//! Reconciler data model.
//!
//! # Purpose
//! Re-exports the tenant specification (`DesiredState`), ledger rows and the
//! tenant namespace object consumed and produced by the planners.
mod billing;
mod desired;
mod namespace;

pub use billing::BillingRow;
pub use desired::{DesiredSpec, DesiredState, ORPHAN_FINALIZER, RELEASE_GRANTS_FINALIZER};
pub use namespace::TenantNamespace;
