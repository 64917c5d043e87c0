//! Deterministic names for derived RBAC objects.
//!
//! # Purpose
//! Every derived object is addressed by a name computed from either a subject
//! identity (shared self-impersonator grants) or the owning tenant's name
//! (single-owner grants). Reconciles of different tenants must agree on these
//! names without coordinating, so each builder is a pure function.
//!
//! # Common pitfalls
//! - `slug` is lossy: `a.b@c` and `a_b-c` collide. Collisions merge two
//!   identities into one shared object name; the impersonate rule still names
//!   the exact identity that created it. Within one tenant the reconciler keeps
//!   the first colliding sudoer and warns about the rest.

/// Label key holding the [`crate::RbacClass`] of a derived object.
pub const RBAC_TYPE_LABEL: &str = "tenancy.dev/rbac-type";
/// Namespace label selecting the service-mesh control plane revision.
pub const ISTIO_REVISION_LABEL: &str = "istio.io/rev";
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";
/// API group and resource of the tenant specification objects themselves.
pub const SPEC_API_GROUP: &str = "tenancy.dev";
pub const SPEC_RESOURCE: &str = "tenantnamespaces";
pub const CLUSTER_ADMIN_ROLE: &str = "cluster-admin";
pub const DEVELOPER_ROLE: &str = "admin";
pub const DEVELOPER_BINDING_NAME: &str = "developer";

/// Replace characters that are invalid in object names with `-`.
///
/// # Example
/// ```rust
/// use tenancy_rbac::slug;
///
/// assert_eq!(slug("first_last@corp.example"), "first-last-corp-example");
/// ```
pub fn slug(identity: &str) -> String {
    identity
        .chars()
        .map(|c| match c {
            '_' | '@' | '.' => '-',
            other => other,
        })
        .collect()
}

/// Name of the shared role and binding granting impersonation of `identity`.
pub fn impersonator_name(identity: &str) -> String {
    format!("{}-impersonator", slug(identity))
}

/// Group every sudoer of `namespace` impersonates, and the name of the
/// objects that implement it.
pub fn sudoers_group_name(namespace: &str) -> String {
    format!("{namespace}-sudoers")
}

pub fn sudo_editor_binding_name(namespace: &str) -> String {
    format!("{namespace}-sudoeditor")
}

pub fn editor_role_name(namespace: &str) -> String {
    format!("{namespace}-editor")
}

pub fn manager_binding_name(namespace: &str) -> String {
    format!("{namespace}-manager")
}
