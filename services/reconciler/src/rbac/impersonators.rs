//! Shared self-impersonation grants.
//!
//! # Purpose
//! Every sudoer of a tenant gets a cluster role allowing impersonation of
//! their own identity, plus a binding granting that role to them. The pair is
//! named after the identity alone, so tenants that list the same sudoer share
//! one pair, each tenant holding its own owner reference on it.
//!
//! # Release
//! [`release`] is the only cluster-wide operation of the reconciler: it lists
//! every object tagged `self-impersonator` and invalidates this tenant's entry
//! on each one whose identity the tenant no longer lists. Other tenants'
//! entries are never touched, so a grant survives while any owner still needs
//! it. Deleting grants with no valid owner left is an external collector's job.
use super::apply::create_or_patch;
use crate::model::DesiredState;
use crate::store::{DerivedObjectStore, StoreResult};
use std::collections::{HashMap, HashSet};
use tenancy_rbac::{
    LabelSelector, ObjectKey, ObjectKind, OwnerReference, PolicyRule, RbacClass, RoleRef,
    Subject, impersonator_name,
};
use uuid::Uuid;

/// Sudoers paired with their impersonator object name, one per name.
///
/// When two identities slug to the same name the first listed one keeps the
/// object; the later one is skipped with a warning so the pair is not rewritten
/// back and forth within a single pass.
fn targets(state: &DesiredState) -> Vec<(String, &Subject)> {
    let mut claimed: HashMap<String, &str> = HashMap::new();
    let mut targets = Vec::new();
    for subject in &state.spec.sudoers {
        let name = impersonator_name(&subject.name);
        match claimed.get(&name) {
            Some(first) if *first == subject.name => {}
            Some(first) => {
                tracing::warn!(
                    namespace = %state.name,
                    name = %name,
                    kept = %first,
                    skipped = %subject.name,
                    "sudoers collide on impersonator name"
                );
            }
            None => {
                claimed.insert(name.clone(), &subject.name);
                targets.push((name, subject));
            }
        }
    }
    targets
}

/// Create or refresh the impersonator role and binding of every sudoer.
pub async fn upsert(store: &dyn DerivedObjectStore, state: &DesiredState) -> StoreResult<()> {
    for (name, subject) in targets(state) {
        let owner = OwnerReference::new(state.uid, &state.name);

        tracing::info!(namespace = %state.name, name = %name, "updating impersonator role");
        create_or_patch(
            store,
            ObjectKey::cluster(ObjectKind::ClusterRole, &name),
            |role| {
                role.rules = vec![PolicyRule::impersonate(subject.kind, &subject.name)];
                role.set_class(RbacClass::SelfImpersonator);
                role.owners.upsert(owner.clone());
            },
        )
        .await?;

        tracing::info!(namespace = %state.name, name = %name, "updating impersonator binding");
        create_or_patch(
            store,
            ObjectKey::cluster(ObjectKind::ClusterRoleBinding, &name),
            |binding| {
                binding.role_ref = Some(RoleRef::cluster_role(&name));
                binding.subjects = vec![subject.clone()];
                binding.set_class(RbacClass::SelfImpersonator);
                binding.owners.upsert(owner);
            },
        )
        .await?;
    }
    Ok(())
}

/// Invalidate `owner_id`'s entry on every self-impersonator object whose
/// identity is not in `retained`. Returns the number of entries invalidated.
pub async fn release(
    store: &dyn DerivedObjectStore,
    owner_id: Uuid,
    retained: &HashSet<&str>,
) -> StoreResult<usize> {
    let selector = LabelSelector::class(RbacClass::SelfImpersonator);
    let mut released = 0;
    for kind in [ObjectKind::ClusterRole, ObjectKind::ClusterRoleBinding] {
        for object in store.list(kind, &selector).await? {
            match object.owners.find(owner_id) {
                Some(entry) if entry.valid => {}
                _ => continue,
            }
            match object.impersonated_identity() {
                Some(identity) if retained.contains(identity) => continue,
                Some(_) => {}
                None => {
                    tracing::warn!(object = %object.key, "impersonator grants no identity; releasing");
                }
            }

            tracing::info!(object = %object.key, owner = %owner_id, "marking for disinheriting");
            let mut updated = object;
            updated.owners.invalidate(owner_id);
            store.patch(updated).await?;
            released += 1;
        }
    }
    if released > 0 {
        metrics::counter!("tenancy_owner_refs_invalidated_total").increment(released as u64);
    }
    Ok(released)
}

/// Release every grant `state` no longer lists as a sudoer.
pub async fn cleanup(store: &dyn DerivedObjectStore, state: &DesiredState) -> StoreResult<usize> {
    let retained: HashSet<&str> = state
        .spec
        .sudoers
        .iter()
        .map(|subject| subject.name.as_str())
        .collect();
    release(store, state.uid, &retained).await
}
