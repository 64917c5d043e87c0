//! Per-tenant sudoer group grants.
//!
//! The role allows impersonating the tenant's sudoer group; the binding hands
//! it to every listed sudoer. Both are owned by the tenant alone and go away
//! with it through ordinary owner cascade, so there is nothing to clean up.
use super::apply::create_or_patch;
use crate::model::DesiredState;
use crate::store::{DerivedObjectStore, StoreResult};
use tenancy_rbac::{
    ObjectKey, ObjectKind, OwnerReference, PolicyRule, RbacClass, RoleRef, SubjectKind,
};

pub async fn upsert(store: &dyn DerivedObjectStore, state: &DesiredState) -> StoreResult<()> {
    let group = state.sudoers_group_name();
    let owner = OwnerReference::controller(state.uid, &state.name);

    create_or_patch(
        store,
        ObjectKey::cluster(ObjectKind::ClusterRole, &group),
        |role| {
            role.rules = vec![PolicyRule::impersonate(SubjectKind::Group, &group)];
            role.set_class(RbacClass::SudoerImpersonator);
            role.owners.set_controller(owner.clone());
        },
    )
    .await?;

    create_or_patch(
        store,
        ObjectKey::cluster(ObjectKind::ClusterRoleBinding, &group),
        |binding| {
            binding.role_ref = Some(RoleRef::cluster_role(&group));
            binding.subjects = state.spec.sudoers.clone();
            binding.set_class(RbacClass::SudoerImpersonator);
            binding.owners.set_controller(owner);
        },
    )
    .await?;
    Ok(())
}
