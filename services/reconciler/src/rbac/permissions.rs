//! Permission grants owned by a single tenant.
//!
//! - sudo editor: the sudoer group may edit the tenant's own specification
//! - namespace admin: the sudoer group is `cluster-admin` inside the namespace
//! - developers: `admin` inside the namespace
//! - managers: update, patch or delete exactly this tenant's specification
use super::apply::create_or_patch;
use crate::model::DesiredState;
use crate::store::{DerivedObjectStore, StoreResult};
use tenancy_rbac::{
    CLUSTER_ADMIN_ROLE, DEVELOPER_BINDING_NAME, DEVELOPER_ROLE, ObjectKey, ObjectKind,
    OwnerReference, PolicyRule, RbacClass, RoleRef, SPEC_API_GROUP, SPEC_RESOURCE, Subject,
    editor_role_name, manager_binding_name, sudo_editor_binding_name,
};

pub async fn upsert_sudoer_permissions(
    store: &dyn DerivedObjectStore,
    state: &DesiredState,
) -> StoreResult<()> {
    let group = Subject::group(state.sudoers_group_name());
    let owner = OwnerReference::controller(state.uid, &state.name);

    create_or_patch(
        store,
        ObjectKey::cluster(
            ObjectKind::ClusterRoleBinding,
            sudo_editor_binding_name(&state.name),
        ),
        |binding| {
            binding.set_class(RbacClass::SudoerPermissions);
            binding.role_ref = Some(RoleRef::cluster_role(editor_role_name(&state.name)));
            binding.subjects = vec![group.clone()];
            binding.owners.set_controller(owner.clone());
        },
    )
    .await?;

    create_or_patch(
        store,
        ObjectKey::namespaced(
            ObjectKind::RoleBinding,
            &state.name,
            state.sudoers_group_name(),
        ),
        |binding| {
            binding.set_class(RbacClass::SudoerPermissions);
            binding.role_ref = Some(RoleRef::cluster_role(CLUSTER_ADMIN_ROLE));
            binding.subjects = vec![group];
            binding.owners.set_controller(owner);
        },
    )
    .await?;
    Ok(())
}

pub async fn upsert_developer_permissions(
    store: &dyn DerivedObjectStore,
    state: &DesiredState,
) -> StoreResult<()> {
    create_or_patch(
        store,
        ObjectKey::namespaced(ObjectKind::RoleBinding, &state.name, DEVELOPER_BINDING_NAME),
        |binding| {
            binding.set_class(RbacClass::DeveloperPermissions);
            binding.role_ref = Some(RoleRef::cluster_role(DEVELOPER_ROLE));
            binding.subjects = state.spec.developers.clone();
            binding
                .owners
                .set_controller(OwnerReference::controller(state.uid, &state.name));
        },
    )
    .await?;
    Ok(())
}

pub async fn upsert_manager_permissions(
    store: &dyn DerivedObjectStore,
    state: &DesiredState,
) -> StoreResult<()> {
    let editor = editor_role_name(&state.name);
    let owner = OwnerReference::controller(state.uid, &state.name);

    create_or_patch(
        store,
        ObjectKey::cluster(ObjectKind::ClusterRole, &editor),
        |role| {
            role.set_class(RbacClass::ManagerPermissions);
            role.rules = vec![PolicyRule {
                api_groups: vec![SPEC_API_GROUP.to_string()],
                resources: vec![SPEC_RESOURCE.to_string()],
                verbs: ["update", "patch", "delete"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                resource_names: vec![state.name.clone()],
            }];
            role.owners.set_controller(owner.clone());
        },
    )
    .await?;

    create_or_patch(
        store,
        ObjectKey::cluster(
            ObjectKind::ClusterRoleBinding,
            manager_binding_name(&state.name),
        ),
        |binding| {
            binding.set_class(RbacClass::ManagerPermissions);
            binding.subjects = state.spec.managers.clone();
            binding.role_ref = Some(RoleRef::cluster_role(&editor));
            binding.owners.set_controller(owner);
        },
    )
    .await?;
    Ok(())
}
