use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tenancy_rbac::OwnerReferences;

/// The cluster namespace a tenant's workloads and namespaced bindings live in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantNamespace {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub owners: OwnerReferences,
    #[serde(default)]
    pub resource_version: u64,
}

impl TenantNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            owners: OwnerReferences::default(),
            resource_version: 0,
        }
    }
}
