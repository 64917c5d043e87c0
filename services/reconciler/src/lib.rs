//! Declarative tenant reconciler.
//!
//! # Purpose
//! Converges everything derived from a tenant specification (`DesiredState`):
//! the tenant's core namespace, its billing ledger rows and the RBAC grants
//! for its sudoers, developers and managers.
//!
//! # How it fits
//! [`reconcile::Reconciler`] is invoked once per key by an external scheduler
//! (the binary ships a minimal resync loop). Every external system sits behind
//! a trait in [`store`], with in-memory adapters for tests and local runs and a
//! Postgres adapter for the billing ledger.
pub mod billing;
pub mod config;
pub mod error;
pub mod manifest;
pub mod model;
pub mod namespace;
pub mod observability;
pub mod rbac;
pub mod reconcile;
pub mod store;
