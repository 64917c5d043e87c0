//! Subjects, rules and role references carried by derived RBAC objects.
//!
//! # Purpose
//! Typed equivalents of the rule/subject fragments every role and binding is
//! assembled from, plus the classification tag that marks which planner owns an
//! object.
//!
//! # Key invariants
//! - `Subject::name` is the identity string used for deterministic naming; it is
//!   preserved exactly.
//! - `RbacClass::as_str` round-trips through `FromStr`.
use crate::errors::{RbacError, RbacResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    User,
    Group,
    ServiceAccount,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::User => "User",
            SubjectKind::Group => "Group",
            SubjectKind::ServiceAccount => "ServiceAccount",
        }
    }

    /// Resource name used in an `impersonate` rule for this kind of subject.
    pub fn impersonation_resource(&self) -> &'static str {
        match self {
            SubjectKind::User => "users",
            SubjectKind::Group => "groups",
            SubjectKind::ServiceAccount => "serviceaccounts",
        }
    }
}

impl FromStr for SubjectKind {
    type Err = RbacError;

    fn from_str(value: &str) -> RbacResult<Self> {
        match value {
            "User" => Ok(SubjectKind::User),
            "Group" => Ok(SubjectKind::Group),
            "ServiceAccount" => Ok(SubjectKind::ServiceAccount),
            other => Err(RbacError::UnknownSubjectKind(other.to_string())),
        }
    }
}

/// A grantee of a binding.
///
/// # Example
/// ```rust
/// use tenancy_rbac::{Subject, SubjectKind};
///
/// let user = Subject::user("jane@example.com");
/// assert_eq!(user.kind, SubjectKind::User);
/// assert!(user.namespace.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Subject {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::User,
            name: name.into(),
            namespace: None,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Group,
            name: name.into(),
            namespace: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    #[serde(default)]
    pub api_groups: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub verbs: Vec<String>,
    #[serde(default)]
    pub resource_names: Vec<String>,
}

impl PolicyRule {
    /// Rule allowing `impersonate` on exactly one named subject.
    pub fn impersonate(kind: SubjectKind, name: &str) -> Self {
        Self {
            api_groups: vec![String::new()],
            resources: vec![kind.impersonation_resource().to_string()],
            verbs: vec!["impersonate".to_string()],
            resource_names: vec![name.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

impl RoleRef {
    pub fn cluster_role(name: impl Into<String>) -> Self {
        Self {
            api_group: crate::naming::RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: name.into(),
        }
    }
}

/// Classification tag stored under [`crate::RBAC_TYPE_LABEL`].
///
/// Used to discover derived objects without scanning every role in the
/// cluster. Only `SelfImpersonator` objects are shared between tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RbacClass {
    SelfImpersonator,
    SudoerImpersonator,
    SudoerPermissions,
    ManagerPermissions,
    DeveloperPermissions,
}

impl RbacClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RbacClass::SelfImpersonator => "self-impersonator",
            RbacClass::SudoerImpersonator => "sudoer-impersonator",
            RbacClass::SudoerPermissions => "sudoer-permissions",
            RbacClass::ManagerPermissions => "manager-permissions",
            RbacClass::DeveloperPermissions => "developer-permissions",
        }
    }

    /// Whether objects of this class may be owned by more than one tenant.
    pub fn is_shared(&self) -> bool {
        matches!(self, RbacClass::SelfImpersonator)
    }
}

impl FromStr for RbacClass {
    type Err = RbacError;

    fn from_str(value: &str) -> RbacResult<Self> {
        match value {
            "self-impersonator" => Ok(RbacClass::SelfImpersonator),
            "sudoer-impersonator" => Ok(RbacClass::SudoerImpersonator),
            "sudoer-permissions" => Ok(RbacClass::SudoerPermissions),
            "manager-permissions" => Ok(RbacClass::ManagerPermissions),
            "developer-permissions" => Ok(RbacClass::DeveloperPermissions),
            other => Err(RbacError::UnknownClass(other.to_string())),
        }
    }
}

impl std::fmt::Display for RbacClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
