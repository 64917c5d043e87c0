//! Owner-reference bookkeeping for derived objects.
//!
//! # Purpose
//! A derived object records which tenants currently justify its existence as a
//! flat list of `(owner_id, valid)` entries. Shared objects carry one entry per
//! tenant; single-owner objects carry exactly one controller entry.
//!
//! # Key invariants
//! - At most one entry per `owner_id`.
//! - Entries are invalidated in place, never removed. Deleting an object whose
//!   entries are all invalid is left to an external collector.
//! - Mutating one owner's entry never touches another owner's entry, so tenants
//!   can update a shared object independently and in any order.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub owner_id: Uuid,
    pub owner_name: String,
    /// Set for the single managing owner of a non-shared object.
    #[serde(default)]
    pub controller: bool,
    pub valid: bool,
}

impl OwnerReference {
    pub fn new(owner_id: Uuid, owner_name: impl Into<String>) -> Self {
        Self {
            owner_id,
            owner_name: owner_name.into(),
            controller: false,
            valid: true,
        }
    }

    pub fn controller(owner_id: Uuid, owner_name: impl Into<String>) -> Self {
        Self {
            controller: true,
            ..Self::new(owner_id, owner_name)
        }
    }
}

/// Ordered list of owner references attached to one object.
///
/// # Example
/// ```rust
/// use tenancy_rbac::{OwnerReference, OwnerReferences};
/// use uuid::Uuid;
///
/// let a = Uuid::new_v4();
/// let b = Uuid::new_v4();
/// let mut owners = OwnerReferences::default();
/// owners.upsert(OwnerReference::new(a, "team-a"));
/// owners.upsert(OwnerReference::new(b, "team-b"));
///
/// owners.invalidate(a);
/// assert!(owners.has_valid_owner());
/// owners.invalidate(b);
/// assert!(owners.is_orphaned());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerReferences(Vec<OwnerReference>);

impl OwnerReferences {
    pub fn new(entries: Vec<OwnerReference>) -> Self {
        Self(entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OwnerReference> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn find(&self, owner_id: Uuid) -> Option<&OwnerReference> {
        self.0.iter().find(|entry| entry.owner_id == owner_id)
    }

    /// Add `owner`, or refresh the existing entry for the same owner id to
    /// match it. Returns `true` when the list changed.
    pub fn upsert(&mut self, owner: OwnerReference) -> bool {
        match self.0.iter_mut().find(|entry| entry.owner_id == owner.owner_id) {
            Some(entry) if *entry == owner => false,
            Some(entry) => {
                *entry = owner;
                true
            }
            None => {
                self.0.push(owner);
                true
            }
        }
    }

    /// Mark the entry for `owner_id` invalid. Other entries are untouched.
    /// Returns `true` when an entry flipped from valid to invalid.
    pub fn invalidate(&mut self, owner_id: Uuid) -> bool {
        let mut changed = false;
        for entry in self.0.iter_mut().filter(|entry| entry.owner_id == owner_id) {
            if entry.valid {
                entry.valid = false;
                changed = true;
            }
        }
        changed
    }

    /// Make `owner` the one valid controller of a single-owner object.
    ///
    /// Any other controller entry loses its controller flag and validity;
    /// plain (non-controller) entries are preserved.
    pub fn set_controller(&mut self, owner: OwnerReference) -> bool {
        let owner = OwnerReference {
            controller: true,
            valid: true,
            ..owner
        };
        let mut changed = false;
        for entry in self
            .0
            .iter_mut()
            .filter(|entry| entry.controller && entry.owner_id != owner.owner_id)
        {
            entry.controller = false;
            entry.valid = false;
            changed = true;
        }
        self.upsert(owner) || changed
    }

    pub fn valid_owners(&self) -> impl Iterator<Item = &OwnerReference> {
        self.0.iter().filter(|entry| entry.valid)
    }

    pub fn has_valid_owner(&self) -> bool {
        self.valid_owners().next().is_some()
    }

    /// No valid entry remains; the object may be collected.
    pub fn is_orphaned(&self) -> bool {
        !self.has_valid_owner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_adds_then_refreshes() {
        let owner = Uuid::new_v4();
        let mut owners = OwnerReferences::default();
        assert!(owners.upsert(OwnerReference::new(owner, "team-a")));
        assert!(!owners.upsert(OwnerReference::new(owner, "team-a")));
        assert_eq!(owners.len(), 1);

        assert!(owners.invalidate(owner));
        assert!(owners.upsert(OwnerReference::new(owner, "team-a")));
        assert_eq!(owners.len(), 1);
        assert!(owners.find(owner).expect("entry").valid);
    }

    #[test]
    fn invalidate_leaves_other_owners_untouched() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut owners = OwnerReferences::new(vec![
            OwnerReference::new(a, "team-a"),
            OwnerReference::new(b, "team-b"),
        ]);

        assert!(owners.invalidate(a));
        assert!(!owners.invalidate(a));
        assert!(!owners.find(a).expect("a").valid);
        assert!(owners.find(b).expect("b").valid);
        assert_eq!(owners.len(), 2);
        assert!(owners.has_valid_owner());
    }

    #[test]
    fn invalidate_unknown_owner_is_noop() {
        let mut owners = OwnerReferences::new(vec![OwnerReference::new(Uuid::new_v4(), "a")]);
        assert!(!owners.invalidate(Uuid::new_v4()));
        assert!(owners.has_valid_owner());
    }

    #[test]
    fn set_controller_replaces_previous_controller() {
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        let mut owners = OwnerReferences::default();
        assert!(owners.set_controller(OwnerReference::new(old, "old")));
        assert!(!owners.set_controller(OwnerReference::new(old, "old")));

        assert!(owners.set_controller(OwnerReference::new(new, "new")));
        let controllers: Vec<_> = owners.valid_owners().collect();
        assert_eq!(controllers.len(), 1);
        assert_eq!(controllers[0].owner_id, new);
        assert!(controllers[0].controller);
    }

    #[test]
    fn empty_list_is_orphaned() {
        assert!(OwnerReferences::default().is_orphaned());
    }

    #[test]
    fn serializes_as_plain_list() {
        let owner = Uuid::nil();
        let owners = OwnerReferences::new(vec![OwnerReference::new(owner, "a")]);
        let value = serde_json::to_value(&owners).expect("json");
        assert!(value.is_array());
        assert_eq!(value[0]["valid"], serde_json::json!(true));
    }
}
