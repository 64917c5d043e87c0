//! Derived RBAC objects as stored by a `DerivedObjectStore`.
//!
//! # Purpose
//! A single record shape covers cluster roles, cluster role bindings and their
//! namespaced counterparts. Roles use `rules`; bindings use `role_ref` and
//! `subjects`. Fields a planner does not own (`annotations`, foreign labels)
//! are carried through patches untouched.
//!
//! # Key invariants
//! - `resource_version` is assigned by the store; `0` means "never stored".
//! - A patch is only accepted when `resource_version` matches the stored copy.
use crate::errors::{RbacError, RbacResult};
use crate::naming::RBAC_TYPE_LABEL;
use crate::ownership::OwnerReferences;
use crate::types::{PolicyRule, RbacClass, RoleRef, Subject};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    ClusterRole,
    ClusterRoleBinding,
    Role,
    RoleBinding,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::ClusterRole => "ClusterRole",
            ObjectKind::ClusterRoleBinding => "ClusterRoleBinding",
            ObjectKind::Role => "Role",
            ObjectKind::RoleBinding => "RoleBinding",
        }
    }

    pub fn is_binding(&self) -> bool {
        matches!(self, ObjectKind::ClusterRoleBinding | ObjectKind::RoleBinding)
    }

    pub fn is_namespaced(&self) -> bool {
        matches!(self, ObjectKind::Role | ObjectKind::RoleBinding)
    }
}

impl FromStr for ObjectKind {
    type Err = RbacError;

    fn from_str(value: &str) -> RbacResult<Self> {
        match value {
            "ClusterRole" => Ok(ObjectKind::ClusterRole),
            "ClusterRoleBinding" => Ok(ObjectKind::ClusterRoleBinding),
            "Role" => Ok(ObjectKind::Role),
            "RoleBinding" => Ok(ObjectKind::RoleBinding),
            other => Err(RbacError::UnknownObjectKind(other.to_string())),
        }
    }
}

/// Name-addressable identity of a derived object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: ObjectKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn cluster(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    pub fn namespaced(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind.as_str(), ns, self.name),
            None => write!(f, "{}/{}", self.kind.as_str(), self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacObject {
    pub key: ObjectKey,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    #[serde(default)]
    pub role_ref: Option<RoleRef>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub owners: OwnerReferences,
    #[serde(default)]
    pub resource_version: u64,
}

impl RbacObject {
    pub fn new(key: ObjectKey) -> Self {
        Self {
            key,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            rules: Vec::new(),
            role_ref: None,
            subjects: Vec::new(),
            owners: OwnerReferences::default(),
            resource_version: 0,
        }
    }

    pub fn class(&self) -> Option<RbacClass> {
        self.labels
            .get(RBAC_TYPE_LABEL)
            .and_then(|value| value.parse().ok())
    }

    pub fn set_class(&mut self, class: RbacClass) {
        self.labels
            .insert(RBAC_TYPE_LABEL.to_string(), class.as_str().to_string());
    }

    /// Identity whose impersonation this object grants.
    ///
    /// Roles name it in the first resource name of their first rule; bindings
    /// name it as their first subject. `None` when the object is malformed.
    pub fn impersonated_identity(&self) -> Option<&str> {
        if self.key.kind.is_binding() {
            self.subjects.first().map(|subject| subject.name.as_str())
        } else {
            self.rules
                .first()
                .and_then(|rule| rule.resource_names.first())
                .map(String::as_str)
        }
    }
}

/// Equality match on a single label, the only selector shape the stores need.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelSelector {
    pub key: String,
    pub value: String,
}

impl LabelSelector {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn class(class: RbacClass) -> Self {
        Self::new(RBAC_TYPE_LABEL, class.as_str())
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        labels.get(&self.key) == Some(&self.value)
    }
}

impl std::fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}
