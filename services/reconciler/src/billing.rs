//! Billing ledger convergence.
//!
//! # Purpose
//! Diffs a tenant's desired billing map against the rows currently stored in
//! the ledger and applies the difference as at most one batched upsert and one
//! batched delete.
//!
//! # Key invariants
//! - [`plan`] is a pure function of its inputs; re-planning after a successful
//!   apply yields an empty plan.
//! - A name is never both upserted and deleted in the same plan.
//! - Output order is deterministic (sorted by entry name).
//!
//! # Failure handling
//! A failed batch aborts the reconcile. Nothing is rolled back: the next
//! reconcile re-reads the ledger and plans again from whatever was committed.
use crate::model::{BillingRow, DesiredState};
use crate::store::{LedgerStatement, LedgerStore, StoreResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillingPlan {
    pub upserts: Vec<BillingRow>,
    pub deletes: Vec<BillingRow>,
}

impl BillingPlan {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// Compute the rows to upsert and delete so that `current` matches `desired`.
///
/// # Example
/// ```rust
/// use reconciler::billing::plan;
/// use reconciler::model::BillingRow;
/// use std::collections::BTreeMap;
///
/// let desired = BTreeMap::from([("budget".to_string(), "2.0".to_string())]);
/// let current = vec![BillingRow::new("payments", "budget", "1.0")];
/// let diff = plan("payments", &desired, &current);
/// assert_eq!(diff.upserts, vec![BillingRow::new("payments", "budget", "2.0")]);
/// assert!(diff.deletes.is_empty());
/// ```
pub fn plan(
    ns_name: &str,
    desired: &BTreeMap<String, String>,
    current: &[BillingRow],
) -> BillingPlan {
    let stored: HashMap<&str, &str> = current
        .iter()
        .map(|row| (row.name.as_str(), row.value.as_str()))
        .collect();
    let mut to_delete: BTreeSet<&str> = stored.keys().copied().collect();

    let mut upserts = Vec::new();
    for (name, value) in desired {
        if stored.get(name.as_str()) != Some(&value.as_str()) {
            upserts.push(BillingRow::new(ns_name, name, value));
        }
        to_delete.remove(name.as_str());
    }

    let deletes = to_delete
        .into_iter()
        .map(|name| BillingRow::key_only(ns_name, name))
        .collect();
    BillingPlan { upserts, deletes }
}

/// Applies [`plan`] results to a [`LedgerStore`].
#[derive(Clone)]
pub struct BillingPlanner {
    ledger: Arc<dyn LedgerStore>,
}

impl BillingPlanner {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Converge the ledger rows of `state` and return the applied plan.
    pub async fn reconcile(&self, state: &DesiredState) -> StoreResult<BillingPlan> {
        let select = LedgerStatement::Select {
            ns_name: state.name.clone(),
        };
        let current = self.ledger.run_query(&select, &[]).await?;
        let diff = plan(&state.name, &state.spec.billing, &current);

        if !diff.upserts.is_empty() {
            self.ledger
                .run_query(&LedgerStatement::Upsert, &diff.upserts)
                .await?;
            metrics::counter!("tenancy_ledger_rows_total", "op" => "upsert")
                .increment(diff.upserts.len() as u64);
        }
        if !diff.deletes.is_empty() {
            self.ledger
                .run_query(&LedgerStatement::Delete, &diff.deletes)
                .await?;
            metrics::counter!("tenancy_ledger_rows_total", "op" => "delete")
                .increment(diff.deletes.len() as u64);
        }
        tracing::debug!(
            namespace = %state.name,
            upserts = diff.upserts.len(),
            deletes = diff.deletes.len(),
            backend = self.ledger.backend_name(),
            "billing rows converged"
        );
        Ok(diff)
    }
}
