//! Tenant specification objects.
//!
//! # Purpose
//! A `DesiredState` describes one tenant's wanted RBAC and billing
//! configuration. It is authored through an external API; the reconciler only
//! reads it (finalizer bookkeeping aside).
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tenancy_rbac::{Subject, sudoers_group_name};
use uuid::Uuid;

/// Finalizer asking that dependents be left in place when the owner goes away.
pub const ORPHAN_FINALIZER: &str = "orphan";
/// Finalizer holding deletion until this tenant's shared grants are released.
pub const RELEASE_GRANTS_FINALIZER: &str = "tenancy.dev/release-shared-grants";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredSpec {
    #[serde(default)]
    pub billing: BTreeMap<String, String>,
    #[serde(default)]
    pub istio_revision: String,
    #[serde(default)]
    pub namespace_label_overrides: BTreeMap<String, String>,
    #[serde(default)]
    pub sudoers: Vec<Subject>,
    #[serde(default)]
    pub developers: Vec<Subject>,
    #[serde(default)]
    pub managers: Vec<Subject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub uid: Uuid,
    pub name: String,
    #[serde(default)]
    pub finalizers: Vec<String>,
    /// Deletion has been requested; the object lingers until its finalizers clear.
    #[serde(default)]
    pub deletion_requested: bool,
    /// User that submitted the specification; becomes the sole sudoer when none are listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub spec: DesiredSpec,
}

impl DesiredState {
    pub fn new(name: impl Into<String>, spec: DesiredSpec) -> Self {
        Self {
            uid: Uuid::new_v4(),
            name: name.into(),
            finalizers: Vec::new(),
            deletion_requested: false,
            created_by: None,
            spec,
        }
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    pub fn is_orphaning(&self) -> bool {
        self.has_finalizer(ORPHAN_FINALIZER)
    }

    pub fn sudoers_group_name(&self) -> String {
        sudoers_group_name(&self.name)
    }

    /// Fill in admission-time defaults the author left out: the submitting
    /// user as sudoer, and the default mesh revision.
    pub fn apply_defaults(&mut self, default_istio_revision: Option<&str>) {
        if self.spec.sudoers.is_empty() {
            if let Some(user) = self.created_by.as_deref().filter(|u| !u.is_empty()) {
                self.spec.sudoers = vec![Subject::user(user)];
            }
        }
        if self.spec.istio_revision.is_empty() {
            if let Some(revision) = default_istio_revision {
                self.spec.istio_revision = revision.to_string();
            }
        }
    }
}
