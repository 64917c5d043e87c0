//! RBAC vocabulary shared by the tenancy reconciler and its store adapters.
//!
//! # Purpose
//! Centralizes the derived RBAC object model (roles, bindings, subjects), the
//! classification tag used to discover derived objects, deterministic resource
//! naming, and the owner-reference bookkeeping that lets several tenants share
//! one derived object.
//!
//! # How it fits
//! The reconciler service computes desired objects with these types and hands
//! them to a `DerivedObjectStore`. Store adapters persist them verbatim.
//!
//! # Key invariants
//! - Resource names are pure functions of identities; two tenants naming the
//!   same subject always compute the same impersonator name.
//! - Owner references are invalidated, never removed, by this crate.
//!
//! # Examples
//! ```rust
//! use tenancy_rbac::{impersonator_name, slug};
//!
//! assert_eq!(slug("jane.doe@example.com"), "jane-doe-example-com");
//! assert_eq!(
//!     impersonator_name("jane.doe@example.com"),
//!     "jane-doe-example-com-impersonator"
//! );
//! ```

mod errors;
mod naming;
mod object;
mod ownership;
mod types;

pub use errors::{RbacError, RbacResult};
pub use naming::{
    CLUSTER_ADMIN_ROLE, DEVELOPER_BINDING_NAME, DEVELOPER_ROLE, ISTIO_REVISION_LABEL,
    RBAC_API_GROUP, RBAC_TYPE_LABEL, SPEC_API_GROUP, SPEC_RESOURCE, editor_role_name,
    impersonator_name, manager_binding_name, slug, sudo_editor_binding_name, sudoers_group_name,
};
pub use object::{LabelSelector, ObjectKey, ObjectKind, RbacObject};
pub use ownership::{OwnerReference, OwnerReferences};
pub use types::{PolicyRule, RbacClass, RoleRef, Subject, SubjectKind};
