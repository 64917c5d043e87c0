//! Core namespace stage.
//!
//! Each tenant owns a namespace of the same name. The stage stamps the mesh
//! revision label, mirrors billing entries as annotations and applies label
//! overrides last so they win over the revision label. Keys it does not
//! manage are left alone.
use crate::model::{DesiredState, TenantNamespace};
use crate::store::{NamespaceStore, StoreError, StoreResult};
use std::sync::Arc;
use tenancy_rbac::{ISTIO_REVISION_LABEL, OwnerReference};

#[derive(Clone)]
pub struct NamespacePlanner {
    store: Arc<dyn NamespaceStore>,
}

impl NamespacePlanner {
    pub fn new(store: Arc<dyn NamespaceStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(&self, state: &DesiredState) -> StoreResult<TenantNamespace> {
        let current = match self.store.get(&state.name).await {
            Ok(namespace) => Some(namespace),
            Err(StoreError::NotFound(_)) => None,
            Err(err) => return Err(err),
        };

        let mut desired = current
            .clone()
            .unwrap_or_else(|| TenantNamespace::new(&state.name));
        apply(&mut desired, state);

        match current {
            Some(current) if current == desired => Ok(current),
            Some(_) => {
                let patched = self.store.patch(desired).await?;
                tracing::info!(namespace = %state.name, "updated namespace");
                Ok(patched)
            }
            None => {
                let created = self.store.create(desired).await?;
                tracing::info!(namespace = %state.name, "created namespace");
                Ok(created)
            }
        }
    }
}

fn apply(namespace: &mut TenantNamespace, state: &DesiredState) {
    namespace.labels.insert(
        ISTIO_REVISION_LABEL.to_string(),
        state.spec.istio_revision.clone(),
    );
    for (key, value) in &state.spec.billing {
        namespace.annotations.insert(key.clone(), value.clone());
    }
    for (key, value) in &state.spec.namespace_label_overrides {
        namespace.labels.insert(key.clone(), value.clone());
    }
    namespace
        .owners
        .set_controller(OwnerReference::controller(state.uid, &state.name));
}
