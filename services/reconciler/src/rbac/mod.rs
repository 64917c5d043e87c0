//! RBAC planning for one tenant.
//!
//! Stages run in a fixed order and stop at the first failure:
//! self impersonators (upsert, then cluster-wide release), sudoer group,
//! sudoer permissions, developer permissions, manager permissions.
use crate::error::{ReconcileError, Stage, StageContext};
use crate::model::DesiredState;
use crate::store::DerivedObjectStore;
use std::collections::HashSet;
use std::sync::Arc;

mod apply;
pub mod impersonators;
pub mod permissions;
pub mod sudoers;

pub use apply::{WriteOutcome, create_or_patch};

#[derive(Clone)]
pub struct RbacPlanner {
    store: Arc<dyn DerivedObjectStore>,
}

impl RbacPlanner {
    pub fn new(store: Arc<dyn DerivedObjectStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(&self, state: &DesiredState) -> Result<(), ReconcileError> {
        let store = self.store.as_ref();

        impersonators::upsert(store, state)
            .await
            .stage(Stage::SelfImpersonators)?;
        let released = impersonators::cleanup(store, state)
            .await
            .stage(Stage::SelfImpersonators)?;
        if released > 0 {
            tracing::info!(namespace = %state.name, released, "released stale impersonator grants");
        }

        sudoers::upsert(store, state)
            .await
            .stage(Stage::SudoerGroup)?;
        permissions::upsert_sudoer_permissions(store, state)
            .await
            .stage(Stage::SudoerPermissions)?;
        permissions::upsert_developer_permissions(store, state)
            .await
            .stage(Stage::DeveloperPermissions)?;
        permissions::upsert_manager_permissions(store, state)
            .await
            .stage(Stage::ManagerPermissions)?;
        Ok(())
    }

    /// Drop this tenant's entry from every shared grant it still holds.
    pub async fn release_all(&self, state: &DesiredState) -> Result<usize, ReconcileError> {
        impersonators::release(self.store.as_ref(), state.uid, &HashSet::new())
            .await
            .stage(Stage::SelfImpersonators)
    }
}
