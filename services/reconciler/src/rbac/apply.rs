//! Read-modify-write helper shared by every RBAC stage.
use crate::store::{DerivedObjectStore, StoreError, StoreResult};
use tenancy_rbac::{ObjectKey, RbacObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Patched,
    Unchanged,
}

impl WriteOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            WriteOutcome::Created => "created",
            WriteOutcome::Patched => "patched",
            WriteOutcome::Unchanged => "unchanged",
        }
    }
}

/// Fetch `key`, apply `mutate`, and write the result back.
///
/// `mutate` only sets the fields its caller owns; everything else on a stored
/// object is preserved. A missing object is created from a blank record. No
/// write happens when `mutate` leaves a stored object unchanged, and a patch
/// carries the fetched `resource_version` so concurrent writers conflict
/// instead of overwriting each other.
pub async fn create_or_patch<F>(
    store: &dyn DerivedObjectStore,
    key: ObjectKey,
    mutate: F,
) -> StoreResult<(RbacObject, WriteOutcome)>
where
    F: FnOnce(&mut RbacObject),
{
    let (object, outcome) = match store.get(&key).await {
        Ok(current) => {
            let mut desired = current.clone();
            mutate(&mut desired);
            if desired == current {
                return Ok((current, WriteOutcome::Unchanged));
            }
            (store.patch(desired).await?, WriteOutcome::Patched)
        }
        Err(StoreError::NotFound(_)) => {
            let mut fresh = RbacObject::new(key);
            mutate(&mut fresh);
            (store.create(fresh).await?, WriteOutcome::Created)
        }
        Err(err) => return Err(err),
    };
    metrics::counter!("tenancy_rbac_writes_total", "op" => outcome.as_str()).increment(1);
    tracing::debug!(object = %object.key, outcome = outcome.as_str(), "rbac object written");
    Ok((object, outcome))
}
